//! Tokio polling loop for an [`AgentContext`].
//!
//! The runner owns the context and is the only code that touches it while
//! running. Hosts talk to it through a cloneable [`AgentHandle`]: inbound
//! property updates and restart notifications are queued and applied on
//! the polling task, between ticks.

use super::AgentContext;
use crate::error::{AgentError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Input from the host, applied on the polling task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCommand {
    PropertyUpdate { payload: String, force_update: bool },
    SystemRestarted,
    AgentRestarted,
}

/// Cloneable host-side handle to a running [`AgentRunner`]
#[derive(Debug, Clone)]
pub struct AgentHandle {
    commands: mpsc::UnboundedSender<AgentCommand>,
    shutdown: Arc<Notify>,
}

impl AgentHandle {
    pub fn send(&self, command: AgentCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| AgentError::NotRunning("agent runner has stopped".to_string()))
    }

    pub fn property_update(&self, payload: impl Into<String>, force_update: bool) -> Result<()> {
        self.send(AgentCommand::PropertyUpdate {
            payload: payload.into(),
            force_update,
        })
    }

    /// Stop the loop after the current tick
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

#[derive(Debug)]
pub struct AgentRunner {
    context: AgentContext,
    poll_interval: Duration,
    commands: mpsc::UnboundedReceiver<AgentCommand>,
    shutdown: Arc<Notify>,
}

impl AgentRunner {
    pub fn new(context: AgentContext, poll_interval: Duration) -> (Self, AgentHandle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let shutdown = Arc::new(Notify::new());
        let handle = AgentHandle {
            commands: sender,
            shutdown: Arc::clone(&shutdown),
        };
        let runner = Self {
            context,
            poll_interval,
            commands: receiver,
            shutdown,
        };
        (runner, handle)
    }

    /// Start the context and poll it until shutdown
    ///
    /// Returns the stopped context. The loop also ends once every
    /// [`AgentHandle`] has been dropped.
    pub async fn run(mut self) -> Result<AgentContext> {
        self.context.start()?;

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            agent = %self.context.name(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "🔄 RUNNER: Polling loop started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.context.do_work() {
                        error!(error = %e, "🔄 RUNNER: Polling tick failed");
                    }
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => {
                        debug!("🔄 RUNNER: All handles dropped");
                        break;
                    }
                },
                _ = self.shutdown.notified() => {
                    debug!("🔄 RUNNER: Shutdown notification received");
                    break;
                }
            }
        }

        self.context.shutdown();
        info!(agent = %self.context.name(), "🔄 RUNNER: Polling loop ended");
        Ok(self.context)
    }

    fn apply(&mut self, command: AgentCommand) {
        match command {
            AgentCommand::PropertyUpdate {
                payload,
                force_update,
            } => {
                if let Err(e) = self.context.handle_property_update(&payload, force_update) {
                    warn!(error = %e, "📨 RUNNER: Property update rejected");
                }
            }
            AgentCommand::SystemRestarted => self.context.engine_mut().on_system_restarted(),
            AgentCommand::AgentRestarted => self.context.engine_mut().on_agent_restarted(),
        }
    }
}
