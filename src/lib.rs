#![allow(clippy::doc_markdown)] // Allow technical terms like ContentHandler, ERC in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Update Agent Core
//!
//! Workflow orchestration core of an on-device update agent.
//!
//! ## Overview
//!
//! The agent receives deployments from a management service, drives each one
//! through its phases (download, backup, install, apply, restore) using a
//! pluggable content handler per update type, and reports progress back.
//! Every network-backed sub-operation (enrollment, root key refresh, topic
//! subscription) runs inside a retriable operation with bounded
//! exponential backoff.
//!
//! ## Architecture
//!
//! Everything is driven by a single polling loop. Nothing in the core blocks
//! waiting for I/O: a phase either finishes inside its call or returns an
//! in-progress result and reports back through a completion channel that
//! the next tick drains.
//!
//! ## Module Organization
//!
//! - [`state_machine`] - Workflow state machine, handler map and persistence
//! - [`orchestration`] - Step mapping, deduplication, report filtering, failure classification
//! - [`resilience`] - Backoff calculator and the retriable operation framework
//! - [`operations`] - Enrollment, root key refresh and topic subscription
//! - [`registry`] - Content handler contract and per-update-type registry
//! - [`events`] - State reporting boundary and local lifecycle events
//! - [`platform`] - Sandboxes, reboot and agent restart
//! - [`execution`] - Cancellation flag, completion channel, background worker
//! - [`agent`] - `AgentContext` and the tokio polling runner
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use update_agent_core::agent::{AgentContext, AgentRunner};
//! use update_agent_core::config::ConfigManager;
//! # fn collaborators() -> update_agent_core::agent::AgentCollaborators { unimplemented!() }
//!
//! # async fn example() -> update_agent_core::Result<()> {
//! update_agent_core::logging::init_structured_logging();
//!
//! let manager = ConfigManager::load()?;
//! let config = manager.config();
//! let context = AgentContext::from_config(config, collaborators());
//!
//! let (runner, handle) = AgentRunner::new(context, config.agent.poll_interval());
//! let task = tokio::spawn(runner.run());
//!
//! handle.property_update(r#"{"workflow":{"action":3,"id":"d1"}}"#, false)?;
//! handle.shutdown();
//! task.await.expect("runner task")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod agent;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod execution;
pub mod logging;
pub mod models;
pub mod operations;
pub mod orchestration;
pub mod platform;
pub mod registry;
pub mod resilience;
pub mod state_machine;
pub mod test_helpers;
pub mod utils;

pub use agent::{AgentContext, AgentRunner};
pub use config::{AgentConfig, ConfigManager};
pub use error::{AgentError, Result};
pub use models::{AducResult, ResultCode};
pub use resilience::{BackoffCalculator, FailureClass, RetriableOperationContext, RetryParams};
pub use state_machine::{UpdateAction, UpdateState, WorkflowEngine, WorkflowStep};
