use std::fs;
use tempfile::TempDir;
use update_agent_core::models::{AducResult, ResultCode};
use update_agent_core::state_machine::{
    JsonFilePersistence, PersistenceError, RestartState, UpdateState, WorkflowStatePersistence,
    WorkflowStep,
};
use update_agent_core::test_helpers::{
    deployment_payload, ScriptedContentHandler, TestEngine, TEST_UPDATE_TYPE,
};

fn with_store(mut te: TestEngine, store: &JsonFilePersistence) -> TestEngine {
    te.engine = te.engine.with_persistence(Box::new(store.clone()));
    te
}

#[test]
fn test_in_flight_deployment_resumes_in_new_engine() {
    let dir = TempDir::new().unwrap();
    let store = JsonFilePersistence::new(dir.path().join("workflow.json"));

    let mut first = with_store(
        TestEngine::with_handler(ScriptedContentHandler::new(TEST_UPDATE_TYPE).with_result(
            WorkflowStep::Download,
            AducResult::success(ResultCode::DOWNLOAD_IN_PROGRESS),
        )),
        &store,
    );
    first
        .engine
        .handle_property_update(&deployment_payload("d1", None), false)
        .unwrap();
    let workflow_id = first.engine.workflow_id().unwrap().to_string();
    drop(first);

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
    assert_eq!(raw["workflow_id"], workflow_id.as_str());
    assert_eq!(raw["handle"]["deployment_id"], "d1");

    let mut second = with_store(TestEngine::new(), &store);
    assert!(second.engine.restore_persisted_state().unwrap());
    assert!(!second.engine.is_operation_in_progress());

    second.engine.handle_startup_workflow_data();
    // Resumes from the start without an Idle report first
    assert_eq!(
        second.reporter.states(),
        vec![UpdateState::DeploymentInProgress, UpdateState::Idle]
    );
    assert_eq!(second.reporter.last().unwrap().deployment_id, "d1");
    assert!(second.engine.data().handle.is_none());
}

#[test]
fn test_completed_deployment_is_not_replayed_after_restart() {
    let dir = TempDir::new().unwrap();
    let store = JsonFilePersistence::new(dir.path().join("workflow.json"));

    let mut first = with_store(TestEngine::new(), &store);
    first
        .engine
        .handle_property_update(&deployment_payload("d1", None), false)
        .unwrap();
    drop(first);

    let mut second = with_store(TestEngine::new(), &store);
    assert!(second.engine.restore_persisted_state().unwrap());
    assert_eq!(
        second.engine.data().last_completed_workflow_id.as_deref(),
        Some("d1")
    );

    second.engine.handle_startup_workflow_data();
    second
        .engine
        .handle_property_update(&deployment_payload("d1", None), false)
        .unwrap();

    assert_eq!(second.reporter.states(), vec![UpdateState::Idle]);
    assert!(second.handler.calls().is_empty());
}

#[test]
fn test_missing_state_file_starts_fresh() {
    let dir = TempDir::new().unwrap();
    let store = JsonFilePersistence::new(dir.path().join("nested/workflow.json"));
    let mut te = with_store(TestEngine::new(), &store);

    assert!(!te.engine.restore_persisted_state().unwrap());
    assert_eq!(te.engine.data().system_reboot_state, RestartState::None);
    assert!(te.engine.workflow_id().is_none());
}

#[test]
fn test_corrupt_state_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("workflow.json");
    fs::write(&path, "{\"workflow_id\": 42").unwrap();
    let store = JsonFilePersistence::new(&path);
    let mut te = with_store(TestEngine::new(), &store);

    assert!(matches!(
        te.engine.restore_persisted_state(),
        Err(PersistenceError::Corrupt(_))
    ));
    assert!(te.engine.workflow_id().is_none());
}

#[test]
fn test_going_idle_persists_cleared_workflow() {
    let dir = TempDir::new().unwrap();
    let store = JsonFilePersistence::new(dir.path().join("workflow.json"));
    let mut te = with_store(TestEngine::new(), &store);
    te.engine
        .handle_property_update(&deployment_payload("d1", None), false)
        .unwrap();

    let snapshot = store.load().unwrap().unwrap();
    assert!(snapshot.workflow_id.is_none());
    assert!(snapshot.handle.is_none());
    assert_eq!(snapshot.last_reported_state, UpdateState::Idle);
    assert_eq!(snapshot.last_completed_workflow_id.as_deref(), Some("d1"));
}
