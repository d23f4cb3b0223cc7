//! # Reporting and Lifecycle Events
//!
//! [`StateReporter`] is the boundary through which the workflow engine
//! reports state transitions to the cloud. [`WorkflowEventPublisher`] is a
//! purely local broadcast of the same lifecycle, named by
//! [`crate::constants::events`].

pub mod publisher;
pub mod reporter;

pub use publisher::{PublishedEvent, WorkflowEventPublisher};
pub use reporter::{StateReport, StateReporter};
