// Test Helpers Module - In-process doubles for the engine boundaries
//
// Shared by the unit tests in src/ and the integration tests under tests/.
// Every double is cheap to clone: clones share state, so a test keeps one
// copy for assertions and hands the other to the engine.

pub mod channel;
pub mod content_handler;
pub mod platform;
pub mod reporter;

pub use channel::FakeChannel;
pub use content_handler::ScriptedContentHandler;
pub use platform::InMemoryPlatform;
pub use reporter::RecordingReporter;

use crate::registry::{ContentHandlerRegistry, SharedContentHandler};
use crate::state_machine::persistence::InMemoryPersistence;
use crate::state_machine::workflow_engine::{WorkflowEngine, WorkflowEngineParts, WorkflowSettings};
use crate::utils::clock::{ManualClock, SharedClock};
use serde_json::json;
use std::sync::Arc;

/// Update type used by [`deployment_payload`]
pub const TEST_UPDATE_TYPE: &str = "microsoft/script:1";

/// Engine wired to recording doubles
#[derive(Debug)]
pub struct TestEngine {
    pub engine: WorkflowEngine,
    pub handler: Arc<ScriptedContentHandler>,
    pub reporter: RecordingReporter,
    pub platform: InMemoryPlatform,
    pub clock: ManualClock,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_handler(ScriptedContentHandler::new(TEST_UPDATE_TYPE))
    }

    pub fn with_handler(handler: ScriptedContentHandler) -> Self {
        let handler = Arc::new(handler);
        let registry = Arc::new(ContentHandlerRegistry::new());
        registry.register_handler(Arc::clone(&handler) as SharedContentHandler);

        let reporter = RecordingReporter::new();
        let platform = InMemoryPlatform::new();
        let clock = ManualClock::default();

        let engine = WorkflowEngine::new(WorkflowEngineParts {
            registry,
            reporter: Box::new(reporter.clone()),
            platform: Box::new(platform.clone()),
            clock: Arc::new(clock.clone()) as SharedClock,
            settings: WorkflowSettings::default(),
        });

        Self {
            engine,
            handler,
            reporter,
            platform,
            clock,
        }
    }

    pub fn with_persistence(mut self, persistence: InMemoryPersistence) -> Self {
        self.engine = self.engine.with_persistence(Box::new(persistence));
        self
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// ProcessDeployment property update for `deployment_id`
pub fn deployment_payload(deployment_id: &str, retry_token: Option<&str>) -> String {
    json!({
        "workflow": {
            "action": 3,
            "id": deployment_id,
            "retryTimestamp": retry_token,
        },
        "updateManifest": json!({
            "updateId": { "provider": "contoso", "name": "toaster", "version": "1.0" },
            "updateType": TEST_UPDATE_TYPE,
            "installedCriteria": "1.0",
        })
        .to_string(),
    })
    .to_string()
}

/// Cancel property update for `deployment_id`
pub fn cancel_payload(deployment_id: &str) -> String {
    json!({ "workflow": { "action": 255, "id": deployment_id } }).to_string()
}
