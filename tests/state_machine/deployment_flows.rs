use std::sync::Arc;
use update_agent_core::models::{erc, AducResult, ResultCode};
use update_agent_core::registry::{ContentHandlerRegistry, SharedContentHandler};
use update_agent_core::state_machine::{
    UpdateState, WorkflowEngine, WorkflowEngineParts, WorkflowSettings, WorkflowStep,
};
use update_agent_core::test_helpers::{
    deployment_payload, InMemoryPlatform, RecordingReporter, ScriptedContentHandler, TestEngine,
    TEST_UPDATE_TYPE,
};
use update_agent_core::utils::clock::ManualClock;

fn engine_with_settings(
    settings: WorkflowSettings,
) -> (WorkflowEngine, Arc<ScriptedContentHandler>, RecordingReporter) {
    let handler = Arc::new(ScriptedContentHandler::new(TEST_UPDATE_TYPE));
    let registry = Arc::new(ContentHandlerRegistry::new());
    registry.register_handler(Arc::clone(&handler) as SharedContentHandler);
    let reporter = RecordingReporter::new();

    let engine = WorkflowEngine::new(WorkflowEngineParts {
        registry,
        reporter: Box::new(reporter.clone()),
        platform: Box::new(InMemoryPlatform::new()),
        clock: Arc::new(ManualClock::default()),
        settings,
    });
    (engine, handler, reporter)
}

#[test]
fn test_force_update_reruns_completed_deployment() {
    let mut te = TestEngine::new();
    let payload = deployment_payload("d1", None);
    te.engine.handle_property_update(&payload, false).unwrap();
    assert_eq!(te.handler.call_count(WorkflowStep::Download), 1);

    te.handler.set_installed(false);
    te.engine.handle_property_update(&payload, true).unwrap();

    assert_eq!(te.handler.call_count(WorkflowStep::Download), 2);
    assert_eq!(
        te.reporter.states(),
        vec![
            UpdateState::DeploymentInProgress,
            UpdateState::Idle,
            UpdateState::DeploymentInProgress,
            UpdateState::Idle,
        ]
    );
}

#[test]
fn test_force_update_ignored_when_not_honored() {
    let (mut engine, handler, reporter) = engine_with_settings(WorkflowSettings {
        honor_force_update: false,
        ..WorkflowSettings::default()
    });
    let payload = deployment_payload("d1", None);
    engine.handle_property_update(&payload, false).unwrap();

    handler.set_installed(false);
    engine.handle_property_update(&payload, true).unwrap();

    assert_eq!(handler.call_count(WorkflowStep::Download), 1);
    assert_eq!(reporter.reports().len(), 2);
}

#[test]
fn test_backup_failure_ends_without_restore() {
    let mut te = TestEngine::with_handler(
        ScriptedContentHandler::new(TEST_UPDATE_TYPE)
            .with_result(WorkflowStep::Backup, AducResult::failure(erc::NO_MEMORY)),
    );
    te.engine
        .handle_property_update(&deployment_payload("d1", None), false)
        .unwrap();

    assert_eq!(
        te.handler.calls(),
        vec![WorkflowStep::Download, WorkflowStep::Backup]
    );
    assert_eq!(te.engine.last_reported_state(), UpdateState::Failed);
    assert!(te.engine.data().last_completed_workflow_id.is_none());
}

#[test]
fn test_apply_failure_restores_and_keeps_failed_report() {
    let mut te = TestEngine::with_handler(
        ScriptedContentHandler::new(TEST_UPDATE_TYPE)
            .with_result(WorkflowStep::Apply, AducResult::failure(erc::NOT_PERMITTED)),
    );
    te.engine
        .handle_property_update(&deployment_payload("d1", None), false)
        .unwrap();

    assert_eq!(te.handler.calls().last(), Some(&WorkflowStep::Restore));
    let last = te.reporter.last().unwrap();
    assert_eq!(last.state, UpdateState::Failed);
    assert_eq!(last.result.extended_result_code, erc::NOT_PERMITTED);
    assert_eq!(te.engine.data().current_step(), WorkflowStep::Undefined);
    assert!(!te.engine.is_operation_in_progress());
}

#[test]
fn test_internal_states_are_tracked_but_not_reported() {
    let mut te = TestEngine::with_handler(
        ScriptedContentHandler::new(TEST_UPDATE_TYPE).with_result(
            WorkflowStep::Install,
            AducResult::success(ResultCode::INSTALL_IN_PROGRESS),
        ),
    );
    te.engine
        .handle_property_update(&deployment_payload("d1", None), false)
        .unwrap();

    assert_eq!(te.engine.last_reported_state(), UpdateState::InstallStarted);
    assert_eq!(te.reporter.states(), vec![UpdateState::DeploymentInProgress]);

    assert!(te.handler.complete_pending(AducResult::success(ResultCode::INSTALL_SUCCESS)));
    te.engine.do_work();
    assert_eq!(
        te.reporter.states(),
        vec![UpdateState::DeploymentInProgress, UpdateState::Idle]
    );
}

#[test]
fn test_retry_during_async_phase_restarts_deployment() {
    let mut te = TestEngine::with_handler(
        ScriptedContentHandler::new(TEST_UPDATE_TYPE).with_result(
            WorkflowStep::Download,
            AducResult::success(ResultCode::DOWNLOAD_IN_PROGRESS),
        ),
    );
    te.engine
        .handle_property_update(&deployment_payload("d1", None), false)
        .unwrap();
    let workflow_id = te.engine.workflow_id().unwrap().to_string();

    te.engine
        .handle_property_update(&deployment_payload("d1", Some("t1")), false)
        .unwrap();
    assert_eq!(te.handler.cancel_count(), 1);
    te.engine.do_work();

    assert_eq!(
        te.reporter.states(),
        vec![
            UpdateState::DeploymentInProgress,
            UpdateState::DeploymentInProgress,
            UpdateState::Idle,
        ]
    );
    assert_eq!(te.handler.call_count(WorkflowStep::Download), 2);
    // A retry keeps the workflow
    assert!(te.reporter.reports().iter().all(|r| r.workflow_id == workflow_id));
}

#[test]
fn test_redelivery_during_async_phase_starts_nothing() {
    let mut te = TestEngine::with_handler(
        ScriptedContentHandler::new(TEST_UPDATE_TYPE).with_result(
            WorkflowStep::Download,
            AducResult::success(ResultCode::DOWNLOAD_IN_PROGRESS),
        ),
    );
    let payload = deployment_payload("d1", None);
    te.engine.handle_property_update(&payload, false).unwrap();
    te.engine.handle_property_update(&payload, false).unwrap();

    assert!(te.engine.is_operation_in_progress());
    assert_eq!(te.handler.call_count(WorkflowStep::Download), 1);
    assert_eq!(te.handler.cancel_count(), 0);
    assert_eq!(te.reporter.states(), vec![UpdateState::DeploymentInProgress]);
}

#[test]
fn test_tick_without_completion_keeps_phase_running() {
    let mut te = TestEngine::with_handler(
        ScriptedContentHandler::new(TEST_UPDATE_TYPE).with_result(
            WorkflowStep::Download,
            AducResult::success(ResultCode::DOWNLOAD_IN_PROGRESS),
        ),
    );
    te.engine
        .handle_property_update(&deployment_payload("d1", None), false)
        .unwrap();
    te.engine.do_work();
    assert_eq!(te.reporter.states(), vec![UpdateState::DeploymentInProgress]);

    // A second tick without a completion changes nothing
    te.engine.do_work();
    assert!(te.engine.is_operation_in_progress());
    assert!(te.handler.has_pending());
}

#[test]
fn test_rejected_report_fails_the_deployment() {
    let mut te = TestEngine::new();
    te.reporter.set_accepting(false);
    te.engine
        .handle_property_update(&deployment_payload("d1", None), false)
        .unwrap();

    let last = te.reporter.last().unwrap();
    assert_eq!(last.state, UpdateState::Failed);
    assert_eq!(last.result.extended_result_code, erc::UNEXPECTED_STATE);
    assert!(te.handler.calls().is_empty());
}

#[test]
fn test_unregistered_update_type_fails_download() {
    let mut te = TestEngine::with_handler(ScriptedContentHandler::new("contoso/other:1"));
    te.engine
        .handle_property_update(&deployment_payload("d1", None), false)
        .unwrap();

    let last = te.reporter.last().unwrap();
    assert_eq!(last.state, UpdateState::Failed);
    assert_eq!(last.result.extended_result_code, erc::HANDLER_LOAD_FAILED);
}

#[test]
fn test_each_deployment_gets_a_newer_workflow_id() {
    let mut te = TestEngine::new();
    let mut ids = Vec::new();
    for deployment in ["d1", "d2", "d3"] {
        te.engine
            .handle_property_update(&deployment_payload(deployment, None), false)
            .unwrap();
        ids.push(te.reporter.last().unwrap().workflow_id);
    }

    let numeric: Vec<u64> = ids.iter().map(|id| id.parse().unwrap()).collect();
    assert!(numeric.windows(2).all(|pair| pair[0] < pair[1]));
    assert!(ids.iter().all(|id| id.len() == 15));
}
