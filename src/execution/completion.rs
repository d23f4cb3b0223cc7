//! Phase completion channel.
//!
//! A phase that returns an in-progress result finishes later, possibly on
//! another thread. It reports through a [`WorkCompletionSender`]; the state
//! machine drains the matching [`WorkCompletionQueue`] on its next tick, so
//! workflow data is only ever mutated by the polling thread.

use crate::models::AducResult;
use crate::state_machine::states::WorkflowStep;
use crossbeam::channel::{self, Receiver, Sender};
use tracing::warn;

/// Result of an asynchronously finished phase
#[derive(Debug, Clone, PartialEq)]
pub struct WorkCompletion {
    pub workflow_id: String,
    pub step: WorkflowStep,
    pub result: AducResult,
}

/// Sending half bound to one phase of one workflow
#[derive(Debug, Clone)]
pub struct WorkCompletionSender {
    workflow_id: String,
    step: WorkflowStep,
    sender: Sender<WorkCompletion>,
}

impl WorkCompletionSender {
    /// Report the phase result; returns `false` if the agent has shut down
    pub fn complete(&self, result: AducResult) -> bool {
        let completion = WorkCompletion {
            workflow_id: self.workflow_id.clone(),
            step: self.step,
            result,
        };
        match self.sender.send(completion) {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    workflow_id = %self.workflow_id,
                    step = %self.step,
                    "📭 COMPLETION: Receiver dropped, phase result discarded"
                );
                false
            }
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn step(&self) -> WorkflowStep {
        self.step
    }
}

/// Receiving side owned by the state machine
#[derive(Debug)]
pub struct WorkCompletionQueue {
    sender: Sender<WorkCompletion>,
    receiver: Receiver<WorkCompletion>,
}

impl WorkCompletionQueue {
    pub fn new() -> Self {
        let (sender, receiver) = channel::unbounded();
        Self { sender, receiver }
    }

    pub fn sender_for(&self, workflow_id: &str, step: WorkflowStep) -> WorkCompletionSender {
        WorkCompletionSender {
            workflow_id: workflow_id.to_string(),
            step,
            sender: self.sender.clone(),
        }
    }

    /// Every completion received since the last drain, in arrival order
    pub fn drain(&self) -> Vec<WorkCompletion> {
        self.receiver.try_iter().collect()
    }
}

impl Default for WorkCompletionQueue {
    fn default() -> Self {
        Self::new()
    }
}
