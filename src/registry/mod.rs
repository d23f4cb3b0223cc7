//! # Extension Resolution
//!
//! Content handler contract and the registry that maps update types to
//! handler implementations.

pub mod content_handler;
pub mod handler_registry;

pub use content_handler::{ContentHandler, PhaseContext};
pub use handler_registry::{
    ContentHandlerRegistry, HandlerCacheStats, HandlerFactory, RegistryError,
    SharedContentHandler,
};
