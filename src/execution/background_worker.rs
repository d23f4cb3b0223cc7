//! Single outstanding background worker.
//!
//! Self-contained work (log upload, a long phase) may run off the polling
//! thread. At most one such worker exists at a time: starting a new one
//! first joins the previous one. Inputs must be owned copies; results go
//! back through a completion channel, never through shared workflow data.

use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
pub enum BackgroundWorkerError {
    #[error("Failed to spawn background worker '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub struct BackgroundWorker {
    name: String,
    handle: Option<JoinHandle<()>>,
    spawned: u64,
}

impl BackgroundWorker {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            handle: None,
            spawned: 0,
        }
    }

    /// Run `work` on a fresh thread after joining the previous worker
    pub fn spawn<F>(&mut self, work: F) -> Result<(), BackgroundWorkerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.join();

        let thread_name = format!("{}-{}", self.name, self.spawned);
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(work)
            .map_err(|source| BackgroundWorkerError::Spawn {
                name: thread_name.clone(),
                source,
            })?;

        self.spawned += 1;
        self.handle = Some(handle);
        info!(worker = %thread_name, "🧵 WORKER: Background worker started");
        Ok(())
    }

    /// Wait for the outstanding worker, if any
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!(worker = %self.name, "🧵 WORKER: Joining previous worker");
            if handle.join().is_err() {
                error!(worker = %self.name, "🧵 WORKER: Background worker panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn spawned_count(&self) -> u64 {
        self.spawned
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        self.join();
    }
}
