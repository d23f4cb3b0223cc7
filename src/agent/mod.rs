//! # Agent Context
//!
//! [`AgentContext`] owns everything the agent process keeps alive between
//! polling ticks: the [`WorkflowEngine`], the live retriable operations and
//! the single [`BackgroundWorker`]. It is built once at process start,
//! driven by one polling thread, and torn down at process stop.
//!
//! ## Polling tick
//!
//! [`AgentContext::do_work`] runs, in order:
//!
//! 1. asynchronous phase completions of the workflow engine
//! 2. completion callbacks of finished background work
//! 3. one `poll` of every live retriable operation
//!
//! Terminal operations are released, except recurring ones, which are
//! rescheduled one interval later.
//!
//! The tokio loop that calls `do_work` lives in [`runner`].

pub mod runner;

pub use runner::{AgentCommand, AgentHandle, AgentRunner};

use crate::config::AgentConfig;
use crate::constants::events;
use crate::error::{AgentError, Result};
use crate::events::{StateReporter, WorkflowEventPublisher};
use crate::execution::BackgroundWorker;
use crate::logging::log_retriable_operation;
use crate::models::AducResult;
use crate::operations::{
    EnrollmentOperation, FileRootKeyStore, RootKeyPackageSource, RootKeyRefreshOperation,
    SharedChannel, TopicSubscribeOperation,
};
use crate::platform::FileSystemPlatform;
use crate::registry::ContentHandlerRegistry;
use crate::resilience::{
    OperationState, PolledOperation, RetriableOperation, RetriableOperationContext,
};
use crate::state_machine::{
    JsonFilePersistence, RestartState, WorkflowEngine, WorkflowEngineParts,
};
use crate::utils::clock::SharedClock;
use crossbeam::channel::{self, Receiver, Sender};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Callback run on the polling thread once background work has finished
pub type BackgroundCallback = Box<dyn FnOnce(&mut WorkflowEngine, AducResult) + Send>;

struct BackgroundCompletion {
    task: String,
    result: AducResult,
    on_complete: BackgroundCallback,
}

struct ScheduledOperation {
    operation: Box<dyn PolledOperation>,
    recurring: bool,
    last_state: OperationState,
}

/// Host-provided collaborators for [`AgentContext::from_config`]
#[derive(Debug)]
pub struct AgentCollaborators {
    pub registry: Arc<ContentHandlerRegistry>,
    pub reporter: Box<dyn StateReporter>,
    pub channel: SharedChannel,
    pub root_key_source: Box<dyn RootKeyPackageSource>,
    /// Topics the agent subscribes to at start
    pub topics: Vec<String>,
    pub clock: SharedClock,
}

pub struct AgentContext {
    name: String,
    engine: WorkflowEngine,
    operations: Vec<ScheduledOperation>,
    background: BackgroundWorker,
    background_tx: Sender<BackgroundCompletion>,
    background_rx: Receiver<BackgroundCompletion>,
    running: bool,
}

impl fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentContext")
            .field("name", &self.name)
            .field("engine", &self.engine)
            .field("operations", &self.operation_states())
            .field("background", &self.background)
            .field("running", &self.running)
            .finish()
    }
}

impl AgentContext {
    pub fn new<S: Into<String>>(name: S, engine: WorkflowEngine) -> Self {
        let name = name.into();
        let (background_tx, background_rx) = channel::unbounded();
        Self {
            background: BackgroundWorker::new(format!("{name}-worker")),
            name,
            engine,
            operations: Vec::new(),
            background_tx,
            background_rx,
            running: false,
        }
    }

    /// Wire the engine and the standard operations from configuration
    ///
    /// Enrollment and topic subscription start immediately and run once;
    /// the root key refresh recurs at its configured interval.
    pub fn from_config(config: &AgentConfig, collaborators: AgentCollaborators) -> Self {
        let platform = FileSystemPlatform::new(&config.agent.downloads_folder)
            .with_reboot_command(config.workflow.reboot_command.clone())
            .with_agent_restart_command(config.workflow.agent_restart_command.clone());

        let engine = WorkflowEngine::new(WorkflowEngineParts {
            registry: collaborators.registry,
            reporter: collaborators.reporter,
            platform: Box::new(platform),
            clock: Arc::clone(&collaborators.clock),
            settings: config.workflow_settings(),
        })
        .with_persistence(Box::new(JsonFilePersistence::new(
            &config.workflow.persist_path,
        )));

        let mut context = Self::new(&config.agent.name, engine);
        let request_timeout = config.operations.request_timeout_secs;

        let enrollment = EnrollmentOperation::new(Arc::clone(&collaborators.channel))
            .with_request_timeout(request_timeout);
        context.add_operation(
            RetriableOperationContext::new(
                enrollment,
                config.operations.enrollment,
                config.retry,
                Arc::clone(&collaborators.clock),
            ),
            true,
            false,
        );

        let topics = TopicSubscribeOperation::new(collaborators.channel, collaborators.topics)
            .with_request_timeout(request_timeout);
        context.add_operation(
            RetriableOperationContext::new(
                topics,
                config.operations.topic_subscribe,
                config.retry,
                Arc::clone(&collaborators.clock),
            ),
            true,
            false,
        );

        let root_keys = RootKeyRefreshOperation::new(
            collaborators.root_key_source,
            Box::new(FileRootKeyStore::new(&config.operations.root_key_store_path)),
        );
        context.add_operation(
            RetriableOperationContext::new(
                root_keys,
                config.operations.root_key_refresh,
                config.retry,
                collaborators.clock,
            ),
            true,
            true,
        );

        context
    }

    /// Initialize `context` and add it to the polled operations
    pub fn add_operation<O>(
        &mut self,
        mut context: RetriableOperationContext<O>,
        start_now: bool,
        recurring: bool,
    ) where
        O: RetriableOperation + 'static,
    {
        context.init(start_now);
        self.add_polled_operation(Box::new(context), recurring);
    }

    /// Add an already initialized operation
    pub fn add_polled_operation(&mut self, operation: Box<dyn PolledOperation>, recurring: bool) {
        info!(
            agent = %self.name,
            operation = %operation.name(),
            recurring = recurring,
            "🤖 AGENT: Operation registered"
        );
        let last_state = operation.current_state();
        self.operations.push(ScheduledOperation {
            operation,
            recurring,
            last_state,
        });
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut WorkflowEngine {
        &mut self.engine
    }

    pub fn event_publisher(&self) -> &WorkflowEventPublisher {
        self.engine.event_publisher()
    }

    /// Name and state of every live operation, in registration order
    pub fn operation_states(&self) -> Vec<(String, OperationState)> {
        self.operations
            .iter()
            .map(|entry| {
                (
                    entry.operation.name().to_string(),
                    entry.operation.current_state(),
                )
            })
            .collect()
    }

    /// Restore persisted workflow state and send the startup report
    ///
    /// A reboot or agent restart recorded before the process stopped is
    /// treated as having happened.
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            debug!(agent = %self.name, "🤖 AGENT: Already running");
            return Ok(());
        }
        info!(agent = %self.name, "🤖 AGENT: Starting");

        if self.engine.restore_persisted_state()? {
            if self.engine.data().system_reboot_state != RestartState::None {
                self.engine.on_system_restarted();
            }
            if self.engine.data().agent_restart_state != RestartState::None {
                self.engine.on_agent_restarted();
            }
        }
        self.engine.handle_startup_workflow_data();

        self.running = true;
        info!(
            agent = %self.name,
            operations = self.operations.len(),
            "🤖 AGENT: Started"
        );
        Ok(())
    }

    /// Forward a property update to the workflow engine
    pub fn handle_property_update(&mut self, payload: &str, force_update: bool) -> Result<()> {
        self.ensure_running()?;
        self.engine.handle_property_update(payload, force_update)?;
        Ok(())
    }

    /// One polling tick
    pub fn do_work(&mut self) -> Result<()> {
        self.ensure_running()?;

        self.engine.do_work();

        for completion in self.background_rx.try_iter() {
            debug!(
                task = %completion.task,
                result_code = %completion.result.result_code,
                "🧵 AGENT: Background work finished"
            );
            (completion.on_complete)(&mut self.engine, completion.result);
        }

        let publisher = self.engine.event_publisher().clone();
        self.operations.retain_mut(|entry| {
            let state = entry.operation.poll();
            if state != entry.last_state {
                record_transition(&publisher, entry.operation.as_ref(), state);
                entry.last_state = state;
            }
            if !state.is_terminal() {
                return true;
            }
            if entry.recurring && state != OperationState::Destroyed {
                entry.operation.reschedule();
                entry.last_state = entry.operation.current_state();
                debug!(
                    operation = %entry.operation.name(),
                    next_execution_time = entry.operation.current_status().next_execution_time,
                    "🤖 AGENT: Recurring operation rescheduled"
                );
                return true;
            }
            entry.operation.release();
            false
        });

        Ok(())
    }

    /// Run self-contained work on the background worker
    ///
    /// `work` receives nothing from the workflow data; anything it needs
    /// must be moved in. `on_complete` runs on the polling thread during
    /// the next [`Self::do_work`] after `work` returns. A previous worker is
    /// joined first.
    pub fn spawn_background<W, C>(&mut self, task: &str, work: W, on_complete: C) -> Result<()>
    where
        W: FnOnce() -> AducResult + Send + 'static,
        C: FnOnce(&mut WorkflowEngine, AducResult) + Send + 'static,
    {
        let sender = self.background_tx.clone();
        let task_name = task.to_string();
        self.background.spawn(move || {
            let result = work();
            let completion = BackgroundCompletion {
                task: task_name,
                result,
                on_complete: Box::new(on_complete),
            };
            if sender.send(completion).is_err() {
                warn!("🧵 AGENT: Agent stopped, background result discarded");
            }
        })?;
        Ok(())
    }

    pub fn is_background_work_running(&self) -> bool {
        self.background.is_running()
    }

    /// Cancel and release every operation and join the background worker
    pub fn shutdown(&mut self) {
        info!(agent = %self.name, "🛑 AGENT: Shutting down");
        for entry in &mut self.operations {
            if entry.operation.request_cancel() {
                debug!(operation = %entry.operation.name(), "🛑 AGENT: Operation cancelled");
            }
            entry.operation.release();
        }
        self.operations.clear();

        self.background.join();
        let discarded = self.background_rx.try_iter().count();
        if discarded > 0 {
            warn!(discarded = discarded, "🛑 AGENT: Background results dropped at shutdown");
        }

        self.running = false;
        info!(agent = %self.name, "🛑 AGENT: Stopped");
    }

    fn ensure_running(&self) -> Result<()> {
        if self.running {
            Ok(())
        } else {
            Err(AgentError::NotRunning(self.name.clone()))
        }
    }
}

fn record_transition(
    publisher: &WorkflowEventPublisher,
    operation: &dyn PolledOperation,
    state: OperationState,
) {
    let status = operation.current_status();
    log_retriable_operation(
        operation.name(),
        &state.to_string(),
        status.attempt_count,
        state.is_scheduled().then_some(status.next_execution_time),
        None,
    );

    let event = match state {
        OperationState::FailureRetriable => events::OPERATION_RETRY_SCHEDULED,
        OperationState::Completed => events::OPERATION_SUCCEEDED,
        OperationState::Failure | OperationState::TimedOut => events::OPERATION_FAILED,
        OperationState::Expired => events::OPERATION_EXPIRED,
        _ => return,
    };
    publisher.publish(
        event,
        json!({
            "operation": operation.name(),
            "state": state,
            "attempt_count": status.attempt_count,
            "failure_class": status.last_failure_class,
            "next_execution_time": status.next_execution_time,
        }),
    );
}
