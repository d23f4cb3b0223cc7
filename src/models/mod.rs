pub mod content_data;
pub mod result;
pub mod workflow_handle;

// Re-export core models for easy access
pub use content_data::{ContentData, UpdateId};
pub use result::{erc, AducResult, ExtendedResultCode, Facility, ResultCode};
pub use workflow_handle::WorkflowHandle;
