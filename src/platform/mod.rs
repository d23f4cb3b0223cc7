//! # Platform Layer
//!
//! Device-side effects the workflow engine needs but does not own: the
//! per-workflow sandbox directory, system reboot and agent restart.
//!
//! [`FileSystemPlatform`] keeps sandboxes under a downloads folder and runs
//! configured commands for reboot/restart. Tests use
//! [`crate::test_helpers::InMemoryPlatform`].

use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Sandbox operation failed for '{path}': {source}")]
    Sandbox {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid sandbox name '{name}'")]
    InvalidSandboxName { name: String },

    #[error("Command '{command}' failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("No {action} command configured")]
    NotConfigured { action: String },
}

pub type PlatformResult<T> = Result<T, PlatformError>;

pub trait PlatformLayer: Send + Debug {
    /// Create (or reuse) the sandbox for `workflow_id` and return its path
    fn create_sandbox(&mut self, workflow_id: &str) -> PlatformResult<PathBuf>;

    fn destroy_sandbox(&mut self, workflow_id: &str) -> PlatformResult<()>;

    /// Remove every sandbox except `keep`; returns how many were removed
    fn cleanup_stale_sandboxes(&mut self, keep: Option<&str>) -> PlatformResult<usize>;

    /// Initiate a system reboot; completion is signalled on next start
    fn reboot_system(&mut self) -> PlatformResult<()>;

    /// Initiate an agent restart; completion is signalled on next start
    fn restart_agent(&mut self) -> PlatformResult<()>;
}

#[derive(Debug, Clone)]
pub struct FileSystemPlatform {
    downloads_folder: PathBuf,
    reboot_command: Vec<String>,
    agent_restart_command: Vec<String>,
}

impl FileSystemPlatform {
    pub fn new<P: Into<PathBuf>>(downloads_folder: P) -> Self {
        Self {
            downloads_folder: downloads_folder.into(),
            reboot_command: Vec::new(),
            agent_restart_command: Vec::new(),
        }
    }

    pub fn with_reboot_command(mut self, command: Vec<String>) -> Self {
        self.reboot_command = command;
        self
    }

    pub fn with_agent_restart_command(mut self, command: Vec<String>) -> Self {
        self.agent_restart_command = command;
        self
    }

    pub fn downloads_folder(&self) -> &Path {
        &self.downloads_folder
    }

    fn sandbox_path(&self, workflow_id: &str) -> PlatformResult<PathBuf> {
        let valid = !workflow_id.is_empty()
            && workflow_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(PlatformError::InvalidSandboxName {
                name: workflow_id.to_string(),
            });
        }
        Ok(self.downloads_folder.join(workflow_id))
    }

    fn run(action: &str, command: &[String]) -> PlatformResult<()> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| PlatformError::NotConfigured {
                action: action.to_string(),
            })?;

        let rendered = command.join(" ");
        info!(command = %rendered, "🖥️ PLATFORM: Running {} command", action);

        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| PlatformError::CommandFailed {
                command: rendered.clone(),
                reason: e.to_string(),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(PlatformError::CommandFailed {
                command: rendered,
                reason: format!("exit status {status}"),
            })
        }
    }
}

impl PlatformLayer for FileSystemPlatform {
    fn create_sandbox(&mut self, workflow_id: &str) -> PlatformResult<PathBuf> {
        let path = self.sandbox_path(workflow_id)?;
        fs::create_dir_all(&path).map_err(|source| PlatformError::Sandbox {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "📁 PLATFORM: Sandbox ready");
        Ok(path)
    }

    fn destroy_sandbox(&mut self, workflow_id: &str) -> PlatformResult<()> {
        let path = self.sandbox_path(workflow_id)?;
        match fs::remove_dir_all(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "📁 PLATFORM: Sandbox removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PlatformError::Sandbox { path, source }),
        }
    }

    fn cleanup_stale_sandboxes(&mut self, keep: Option<&str>) -> PlatformResult<usize> {
        let entries = match fs::read_dir(&self.downloads_folder) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(PlatformError::Sandbox {
                    path: self.downloads_folder.clone(),
                    source,
                })
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if keep.is_some_and(|k| name.to_str() == Some(k)) {
                continue;
            }
            match fs::remove_dir_all(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "📁 PLATFORM: Could not remove stale sandbox"
                ),
            }
        }

        if removed > 0 {
            info!(removed = removed, "📁 PLATFORM: Stale sandboxes removed");
        }
        Ok(removed)
    }

    fn reboot_system(&mut self) -> PlatformResult<()> {
        Self::run("reboot", &self.reboot_command)
    }

    fn restart_agent(&mut self) -> PlatformResult<()> {
        Self::run("agent restart", &self.agent_restart_command)
    }
}
