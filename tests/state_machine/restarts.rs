use tempfile::TempDir;
use update_agent_core::models::{erc, AducResult, ResultCode};
use update_agent_core::state_machine::{
    InMemoryPersistence, JsonFilePersistence, RestartState, UpdateState, WorkflowStep,
};
use update_agent_core::test_helpers::{
    deployment_payload, ScriptedContentHandler, TestEngine, TEST_UPDATE_TYPE,
};

fn scripted(step: WorkflowStep, code: ResultCode) -> TestEngine {
    TestEngine::with_handler(
        ScriptedContentHandler::new(TEST_UPDATE_TYPE).with_result(step, AducResult::success(code)),
    )
}

#[test]
fn test_install_reboot_redrives_deployment() {
    let mut te = scripted(WorkflowStep::Install, ResultCode::INSTALL_REQUIRED_REBOOT);
    te.engine
        .handle_property_update(&deployment_payload("d1", None), false)
        .unwrap();

    assert_eq!(te.platform.reboot_count(), 1);
    assert_eq!(te.engine.data().system_reboot_state, RestartState::InProgress);
    assert_eq!(te.handler.call_count(WorkflowStep::Apply), 0);
    assert_eq!(te.reporter.states(), vec![UpdateState::DeploymentInProgress]);

    te.engine.on_system_restarted();

    assert_eq!(te.handler.call_count(WorkflowStep::Install), 2);
    assert_eq!(te.handler.call_count(WorkflowStep::Apply), 1);
    let last = te.reporter.last().unwrap();
    assert_eq!(last.state, UpdateState::Idle);
    assert!(last.installed_update_id.is_some());
    assert_eq!(te.engine.data().system_reboot_state, RestartState::None);
}

#[test]
fn test_immediate_reboot_code_also_reboots() {
    let mut te = scripted(WorkflowStep::Apply, ResultCode::APPLY_REQUIRED_IMMEDIATE_REBOOT);
    te.engine
        .handle_property_update(&deployment_payload("d1", None), false)
        .unwrap();

    assert_eq!(te.platform.reboot_count(), 1);
    assert_eq!(te.platform.agent_restart_count(), 0);
}

#[test]
fn test_agent_restart_completes_from_state_file() {
    let dir = TempDir::new().unwrap();
    let store = JsonFilePersistence::new(dir.path().join("workflow.json"));

    let mut before = scripted(WorkflowStep::Apply, ResultCode::APPLY_REQUIRED_AGENT_RESTART);
    before.engine = before.engine.with_persistence(Box::new(store.clone()));
    before
        .engine
        .handle_property_update(&deployment_payload("d1", None), false)
        .unwrap();
    assert_eq!(before.platform.agent_restart_count(), 1);
    drop(before);

    let mut after = TestEngine::new();
    after.engine = after.engine.with_persistence(Box::new(store));
    after.handler.set_installed(true);
    assert!(after.engine.restore_persisted_state().unwrap());
    assert_eq!(after.engine.data().agent_restart_state, RestartState::InProgress);

    after.engine.on_agent_restarted();

    let report = after.reporter.last().unwrap();
    assert_eq!(report.state, UpdateState::Idle);
    assert_eq!(report.deployment_id, "d1");
    assert_eq!(report.result.result_code, ResultCode::APPLY_SUCCESS);
    assert_eq!(after.engine.data().agent_restart_state, RestartState::None);
    assert_eq!(after.engine.data().last_completed_workflow_id.as_deref(), Some("d1"));
}

#[test]
fn test_update_missing_after_reboot_is_not_recoverable() {
    let persistence = InMemoryPersistence::new();
    let mut before = scripted(WorkflowStep::Apply, ResultCode::APPLY_REQUIRED_REBOOT)
        .with_persistence(persistence.clone());
    before
        .engine
        .handle_property_update(&deployment_payload("d1", None), false)
        .unwrap();

    let mut after = TestEngine::new().with_persistence(persistence);
    after.engine.restore_persisted_state().unwrap();
    after.engine.on_system_restarted();

    let report = after.reporter.last().unwrap();
    assert_eq!(report.state, UpdateState::Idle);
    assert_eq!(report.result.extended_result_code, erc::NOT_RECOVERABLE);
    assert!(report.installed_update_id.is_none());
    assert!(after.engine.data().handle.is_none());
}

#[test]
fn test_failed_agent_restart_reports_restart_failure() {
    let mut te = scripted(WorkflowStep::Apply, ResultCode::APPLY_REQUIRED_AGENT_RESTART);
    te.platform.fail_agent_restart(true);
    te.engine
        .handle_property_update(&deployment_payload("d1", None), false)
        .unwrap();

    let report = te.reporter.last().unwrap();
    assert_eq!(report.state, UpdateState::Idle);
    assert_eq!(report.result.extended_result_code, erc::AGENT_RESTART_FAILED);
    assert_eq!(te.engine.data().agent_restart_state, RestartState::None);
}

#[test]
fn test_install_reboot_that_cannot_start_still_ends_the_deployment() {
    let mut te = scripted(WorkflowStep::Install, ResultCode::INSTALL_REQUIRED_REBOOT);
    te.platform.fail_reboot(true);
    te.engine
        .handle_property_update(&deployment_payload("d1", None), false)
        .unwrap();
    te.engine.do_work();

    assert_eq!(te.handler.call_count(WorkflowStep::Apply), 1);
    assert_eq!(
        te.reporter.states(),
        vec![UpdateState::DeploymentInProgress, UpdateState::Idle]
    );
    let report = te.reporter.last().unwrap();
    assert_eq!(report.result.extended_result_code, erc::REBOOT_FAILED);
    assert!(report.installed_update_id.is_none());
    assert_eq!(te.engine.data().system_reboot_state, RestartState::None);
    assert!(te.engine.data().handle.is_none());
}

#[test]
fn test_install_agent_restart_that_cannot_start_still_ends_the_deployment() {
    let mut te = scripted(WorkflowStep::Install, ResultCode::INSTALL_REQUIRED_AGENT_RESTART);
    te.platform.fail_agent_restart(true);
    te.engine
        .handle_property_update(&deployment_payload("d1", None), false)
        .unwrap();
    te.engine.do_work();

    assert_eq!(te.handler.call_count(WorkflowStep::Apply), 1);
    let report = te.reporter.last().unwrap();
    assert_eq!(report.state, UpdateState::Idle);
    assert_eq!(report.result.extended_result_code, erc::AGENT_RESTART_FAILED);
    assert_eq!(te.engine.data().agent_restart_state, RestartState::None);

    // The engine is free for the next deployment
    te.platform.fail_agent_restart(false);
    te.handler.set_installed(false);
    te.engine
        .handle_property_update(&deployment_payload("d2", None), false)
        .unwrap();
    assert_eq!(te.reporter.last().unwrap().deployment_id, "d2");
}

#[test]
fn test_restart_notification_without_pending_restart_is_ignored() {
    let mut te = TestEngine::new();
    te.engine.on_system_restarted();
    te.engine.on_agent_restarted();

    assert!(te.reporter.reports().is_empty());
    assert_eq!(te.platform.reboot_count(), 0);
}
