//! # Content Handler Registry
//!
//! Resolves an update type string to a [`ContentHandler`]. Factories are
//! registered up front; the first lookup of a type instantiates the handler
//! and every later lookup returns the cached instance.
//!
//! ## Resolution
//!
//! `microsoft/apt:1` is looked up exactly first, then by its unversioned
//! name `microsoft/apt`, so a single factory can serve every version.

use super::content_handler::ContentHandler;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub type SharedContentHandler = Arc<dyn ContentHandler>;

/// Builds a handler instance on first use
pub type HandlerFactory = Arc<dyn Fn() -> Result<SharedContentHandler, String> + Send + Sync>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("No content handler registered for update type '{update_type}'")]
    HandlerNotFound { update_type: String },

    #[error("Content handler for '{update_type}' failed to load: {reason}")]
    LoadFailed { update_type: String, reason: String },

    #[error("Invalid update type '{update_type}'")]
    InvalidUpdateType { update_type: String },
}

/// Statistics about the loaded-handler cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerCacheStats {
    pub registered_factories: usize,
    pub cached_handlers: usize,
    pub cache_keys: Vec<String>,
}

#[derive(Default)]
pub struct ContentHandlerRegistry {
    factories: DashMap<String, HandlerFactory>,
    loaded: DashMap<String, SharedContentHandler>,
}

impl fmt::Debug for ContentHandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentHandlerRegistry")
            .field("factories", &self.factories.len())
            .field("loaded", &self.loaded.len())
            .finish()
    }
}

impl ContentHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for an update type (versioned or unversioned)
    pub fn register_factory<F>(&self, update_type: &str, factory: F)
    where
        F: Fn() -> Result<SharedContentHandler, String> + Send + Sync + 'static,
    {
        info!(update_type = %update_type, "🧩 REGISTRY: Factory registered");
        self.factories
            .insert(update_type.to_string(), Arc::new(factory));
    }

    /// Register an already constructed handler under its own update type
    pub fn register_handler(&self, handler: SharedContentHandler) {
        let update_type = handler.update_type().to_string();
        let instance = Arc::clone(&handler);
        self.register_factory(&update_type, move || Ok(Arc::clone(&instance)));
    }

    /// Resolve the handler for `update_type`, instantiating it once
    pub fn load_handler(&self, update_type: &str) -> Result<SharedContentHandler, RegistryError> {
        let update_type = update_type.trim();
        if update_type.is_empty() {
            return Err(RegistryError::InvalidUpdateType {
                update_type: update_type.to_string(),
            });
        }

        if let Some(handler) = self.loaded.get(update_type) {
            debug!(update_type = %update_type, "🧩 REGISTRY: Returning cached handler");
            return Ok(Arc::clone(handler.value()));
        }

        let factory = self
            .factory_for(update_type)
            .ok_or_else(|| RegistryError::HandlerNotFound {
                update_type: update_type.to_string(),
            })?;

        let handler = factory().map_err(|reason| {
            warn!(
                update_type = %update_type,
                reason = %reason,
                "🧩 REGISTRY: Handler failed to load"
            );
            RegistryError::LoadFailed {
                update_type: update_type.to_string(),
                reason,
            }
        })?;

        // A concurrent loader may have won; keep whichever instance landed first.
        let cached = self
            .loaded
            .entry(update_type.to_string())
            .or_insert(handler)
            .value()
            .clone();

        info!(update_type = %update_type, "🧩 REGISTRY: Handler loaded");
        Ok(cached)
    }

    pub fn is_registered(&self, update_type: &str) -> bool {
        self.factory_for(update_type.trim()).is_some()
    }

    pub fn cache_stats(&self) -> HandlerCacheStats {
        let mut cache_keys: Vec<String> = self.loaded.iter().map(|e| e.key().clone()).collect();
        cache_keys.sort();
        HandlerCacheStats {
            registered_factories: self.factories.len(),
            cached_handlers: cache_keys.len(),
            cache_keys,
        }
    }

    pub fn clear_cache(&self) {
        self.loaded.clear();
        info!("🧩 REGISTRY: Handler cache cleared");
    }

    fn factory_for(&self, update_type: &str) -> Option<HandlerFactory> {
        if let Some(factory) = self.factories.get(update_type) {
            return Some(Arc::clone(factory.value()));
        }
        let (name, _version) = update_type.rsplit_once(':')?;
        self.factories.get(name).map(|f| Arc::clone(f.value()))
    }
}
