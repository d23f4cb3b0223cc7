//! # Execution Primitives
//!
//! Building blocks for running phases without blocking the polling thread:
//! a cooperative [`CancellationFlag`], the [`WorkCompletionQueue`] through
//! which asynchronously finished phases report back, and the single
//! [`BackgroundWorker`].

pub mod background_worker;
pub mod cancellation;
pub mod completion;

pub use background_worker::{BackgroundWorker, BackgroundWorkerError};
pub use cancellation::CancellationFlag;
pub use completion::{WorkCompletion, WorkCompletionQueue, WorkCompletionSender};
