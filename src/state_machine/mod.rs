// State machine module for the update workflow
//
// Drives one deployment at a time through ProcessDeployment, Download,
// Backup, Install and Apply (Restore on failure), reporting state to the
// cloud as it goes.

pub mod errors;
pub mod guards;
pub mod handler_map;
pub mod persistence;
pub mod states;
pub mod workflow_data;
pub mod workflow_engine;

// Re-export main types for convenient access
pub use errors::{PersistenceError, WorkflowError};
pub use states::{CancellationType, RestartState, UpdateAction, UpdateState, WorkflowStep};
pub use workflow_data::{WorkflowData, WorkflowIdGenerator, WorkflowSnapshot};
pub use workflow_engine::{WorkflowEngine, WorkflowEngineParts, WorkflowSettings};

// Common traits and utilities
pub use handler_map::{entry_for, HandlerMapEntry};
pub use persistence::{InMemoryPersistence, JsonFilePersistence, WorkflowStatePersistence};
