//! Shared utilities: time source, atomic file writes and serde helpers.

pub mod clock;
pub mod fs_atomic;
pub mod serde;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
