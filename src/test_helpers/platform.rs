use crate::platform::{PlatformError, PlatformLayer, PlatformResult};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Default)]
struct PlatformState {
    sandboxes: BTreeSet<String>,
    reboots: u32,
    agent_restarts: u32,
    fail_sandbox: bool,
    fail_reboot: bool,
    fail_agent_restart: bool,
}

/// Platform double that tracks sandboxes by name and counts restarts
#[derive(Debug, Clone, Default)]
pub struct InMemoryPlatform {
    state: Arc<Mutex<PlatformState>>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sandboxes(&self) -> Vec<String> {
        self.state.lock().sandboxes.iter().cloned().collect()
    }

    pub fn reboot_count(&self) -> u32 {
        self.state.lock().reboots
    }

    pub fn agent_restart_count(&self) -> u32 {
        self.state.lock().agent_restarts
    }

    pub fn fail_sandbox_creation(&self, fail: bool) {
        self.state.lock().fail_sandbox = fail;
    }

    pub fn fail_reboot(&self, fail: bool) {
        self.state.lock().fail_reboot = fail;
    }

    pub fn fail_agent_restart(&self, fail: bool) {
        self.state.lock().fail_agent_restart = fail;
    }
}

impl PlatformLayer for InMemoryPlatform {
    fn create_sandbox(&mut self, workflow_id: &str) -> PlatformResult<PathBuf> {
        let mut state = self.state.lock();
        let path = PathBuf::from("/tmp/update-agent-test").join(workflow_id);
        if state.fail_sandbox {
            return Err(PlatformError::Sandbox {
                path,
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "scripted"),
            });
        }
        state.sandboxes.insert(workflow_id.to_string());
        Ok(path)
    }

    fn destroy_sandbox(&mut self, workflow_id: &str) -> PlatformResult<()> {
        self.state.lock().sandboxes.remove(workflow_id);
        Ok(())
    }

    fn cleanup_stale_sandboxes(&mut self, keep: Option<&str>) -> PlatformResult<usize> {
        let mut state = self.state.lock();
        let before = state.sandboxes.len();
        state.sandboxes.retain(|name| Some(name.as_str()) == keep);
        Ok(before - state.sandboxes.len())
    }

    fn reboot_system(&mut self) -> PlatformResult<()> {
        let mut state = self.state.lock();
        if state.fail_reboot {
            return Err(PlatformError::CommandFailed {
                command: "reboot".to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        state.reboots += 1;
        Ok(())
    }

    fn restart_agent(&mut self) -> PlatformResult<()> {
        let mut state = self.state.lock();
        if state.fail_agent_restart {
            return Err(PlatformError::CommandFailed {
                command: "restart-agent".to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        state.agent_restarts += 1;
        Ok(())
    }
}
