use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::broadcast;
use update_agent_core::agent::{AgentCollaborators, AgentContext};
use update_agent_core::config::ConfigManager;
use update_agent_core::constants::events::OPERATION_FAILED;
use update_agent_core::events::PublishedEvent;
use update_agent_core::operations::RootKeyPackageSource;
use update_agent_core::orchestration::TransportError;
use update_agent_core::registry::{ContentHandlerRegistry, SharedContentHandler};
use update_agent_core::resilience::OperationState;
use update_agent_core::state_machine::UpdateState;
use update_agent_core::test_helpers::{
    deployment_payload, FakeChannel, RecordingReporter, ScriptedContentHandler, TEST_UPDATE_TYPE,
};
use update_agent_core::utils::clock::ManualClock;

const PACKAGE: &str = r#"{"protected":{"version":3,"published":1704067200}}"#;

/// Serves the same package on every fetch
#[derive(Debug)]
struct StaticPackageSource {
    package: Result<String, TransportError>,
}

impl RootKeyPackageSource for StaticPackageSource {
    fn fetch_package(&mut self, _correlation_id: &str) -> Result<String, TransportError> {
        self.package.clone()
    }
}

struct Harness {
    _dir: TempDir,
    state_dir: PathBuf,
    context: AgentContext,
    channel: FakeChannel,
    reporter: RecordingReporter,
    clock: ManualClock,
}

fn write_config(dir: &Path, state_dir: &Path) {
    let yaml = format!(
        r#"
agent:
  name: test-agent
  downloads_folder: {state}/downloads
operations:
  request_timeout_secs: 30
  root_key_refresh:
    operation_interval_secs: 600
  root_key_store_path: {state}/rootkeys.json
workflow:
  persist_path: {state}/workflow.json
retry:
  server_transient:
    max_retries: 2
"#,
        state = state_dir.display()
    );
    fs::write(dir.join("update-agent.yaml"), yaml).unwrap();
}

fn harness(package: Result<String, TransportError>) -> Harness {
    let dir = TempDir::new().unwrap();
    let state_dir = dir.path().join("state");
    write_config(dir.path(), &state_dir);
    let manager =
        ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
            .unwrap();

    let registry = Arc::new(ContentHandlerRegistry::new());
    registry.register_handler(
        Arc::new(ScriptedContentHandler::new(TEST_UPDATE_TYPE)) as SharedContentHandler
    );
    let channel = FakeChannel::connected();
    let reporter = RecordingReporter::new();
    let clock = ManualClock::default();

    let context = AgentContext::from_config(
        manager.config(),
        AgentCollaborators {
            registry,
            reporter: Box::new(reporter.clone()),
            channel: channel.shared(),
            root_key_source: Box::new(StaticPackageSource { package }),
            topics: vec!["adu/oto/test/a".to_string(), "adu/oto/test/s".to_string()],
            clock: Arc::new(clock.clone()),
        },
    );

    Harness {
        _dir: dir,
        state_dir,
        context,
        channel,
        reporter,
        clock,
    }
}

#[test]
fn test_standard_operations_are_registered() {
    let h = harness(Ok(PACKAGE.to_string()));
    assert_eq!(h.context.name(), "test-agent");

    let names: Vec<String> = h
        .context
        .operation_states()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(names, vec!["enrollment", "topic_subscribe", "root_key_refresh"]);
}

#[test]
fn test_start_sends_idle_report() {
    let mut h = harness(Ok(PACKAGE.to_string()));
    h.context.start().unwrap();
    assert_eq!(h.reporter.states(), vec![UpdateState::Idle]);
}

#[test]
fn test_operations_run_to_completion() {
    let mut h = harness(Ok(PACKAGE.to_string()));
    h.context.start().unwrap();

    h.context.do_work().unwrap();
    let request = h.channel.published().pop().expect("enrollment request");
    assert_eq!(request.message_type, "enr_req");
    assert_eq!(h.channel.subscribe_requests().len(), 2);

    h.channel.respond(
        &request.correlation_id,
        Ok(json!({ "IsEnrolled": true, "ScopeId": "scope-1" })),
    );
    h.context.do_work().unwrap();

    // One-shot operations are released; the key refresh waits for its next round
    let states = h.context.operation_states();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].0, "root_key_refresh");
    assert_eq!(states[0].1, OperationState::NotStarted);

    let stored = fs::read_to_string(h.state_dir.join("rootkeys.json")).unwrap();
    assert_eq!(stored, PACKAGE);
}

fn drain_failures(events: &mut broadcast::Receiver<PublishedEvent>) -> usize {
    let mut failures = 0;
    while let Ok(event) = events.try_recv() {
        if event.name == OPERATION_FAILED {
            failures += 1;
        }
    }
    failures
}

#[test]
fn test_root_key_refresh_recurs_on_interval() {
    let mut h = harness(Err(TransportError::rejected("revoked")));
    let mut events = h.context.event_publisher().subscribe();
    h.context.start().unwrap();

    h.context.do_work().unwrap();
    assert_eq!(
        h.context
            .operation_states()
            .iter()
            .find(|(name, _)| name == "root_key_refresh")
            .map(|(_, state)| *state),
        Some(OperationState::NotStarted)
    );
    assert!(!h.state_dir.join("rootkeys.json").exists());

    assert_eq!(drain_failures(&mut events), 1);

    h.clock.advance(600);
    h.context.do_work().unwrap();
    assert_eq!(drain_failures(&mut events), 1);
}

#[test]
fn test_deployment_state_is_persisted_at_configured_path() {
    let mut h = harness(Ok(PACKAGE.to_string()));
    h.context.start().unwrap();
    h.context
        .handle_property_update(&deployment_payload("d1", None), false)
        .unwrap();

    assert_eq!(h.reporter.last().unwrap().state, UpdateState::Idle);
    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(h.state_dir.join("workflow.json")).unwrap())
            .unwrap();
    assert_eq!(raw["last_completed_workflow_id"], "d1");
}
