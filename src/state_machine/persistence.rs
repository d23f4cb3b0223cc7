//! Workflow state persistence.
//!
//! Enough of [`WorkflowData`](super::workflow_data::WorkflowData) is stored
//! to resume correct reporting after a restart: workflow id, last reported
//! state, the deployment, the last completed deployment and pending
//! reboot/restart flags.

use super::errors::{PersistenceError, PersistenceResult};
use super::workflow_data::WorkflowSnapshot;
use crate::utils::fs_atomic::write_atomic;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub trait WorkflowStatePersistence: Send + Debug {
    fn load(&self) -> PersistenceResult<Option<WorkflowSnapshot>>;
    fn save(&self, snapshot: &WorkflowSnapshot) -> PersistenceResult<()>;
    fn clear(&self) -> PersistenceResult<()>;
}

/// JSON file written through a temp file and an atomic rename
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WorkflowStatePersistence for JsonFilePersistence {
    fn load(&self) -> PersistenceResult<Option<WorkflowSnapshot>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let snapshot = serde_json::from_str(&raw)?;
        debug!(path = %self.path.display(), "💾 PERSISTENCE: Workflow state loaded");
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &WorkflowSnapshot) -> PersistenceResult<()> {
        let content = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&self.path, &content)
            .map_err(|source| PersistenceError::Write {
                path: self.path.clone(),
                source,
            })
    }

    fn clear(&self) -> PersistenceResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistenceError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Process-local persistence for tests and hosts without storage
///
/// Clones share the stored snapshot.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPersistence {
    snapshot: Arc<Mutex<Option<WorkflowSnapshot>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkflowStatePersistence for InMemoryPersistence {
    fn load(&self) -> PersistenceResult<Option<WorkflowSnapshot>> {
        Ok(self.snapshot.lock().clone())
    }

    fn save(&self, snapshot: &WorkflowSnapshot) -> PersistenceResult<()> {
        *self.snapshot.lock() = Some(snapshot.clone());
        Ok(())
    }

    fn clear(&self) -> PersistenceResult<()> {
        *self.snapshot.lock() = None;
        Ok(())
    }
}
