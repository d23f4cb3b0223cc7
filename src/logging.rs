//! # Structured Logging Module
//!
//! Environment-aware structured logging that outputs to both console and a
//! JSON log file, for following workflows and retriable operations across
//! polling ticks.

use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Default directory for log files
pub const DEFAULT_LOG_DIR: &str = "log";

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    init_structured_logging_in(PathBuf::from(DEFAULT_LOG_DIR));
}

/// Initialize structured logging, writing the JSON log under `log_dir`
///
/// Only the first call has any effect. If the log directory cannot be
/// created, logging continues on the console alone.
pub fn init_structured_logging_in(log_dir: PathBuf) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let console = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(EnvFilter::new(log_level.clone()));

        let pid = process::id();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_filename = format!("{environment}.{pid}.{timestamp}.log");

        if let Err(e) = fs::create_dir_all(&log_dir) {
            let _ = tracing_subscriber::registry().with(console).try_init();
            tracing::warn!(
                log_dir = %log_dir.display(),
                error = %e,
                "🔧 STRUCTURED LOGGING: Log directory unavailable, console only"
            );
            return;
        }

        let file_appender = tracing_appender::rolling::never(&log_dir, &log_filename);
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

        let subscriber = tracing_subscriber::registry().with(console).with(
            fmt::layer()
                .with_writer(file_writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(EnvFilter::new(log_level)),
        );

        // A host may already have installed a global subscriber
        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already installed, keeping it");
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            log_file = %log_dir.join(&log_filename).display(),
            "🔧 STRUCTURED LOGGING: Initialized with file output"
        );

        // The writer must live as long as the process
        std::mem::forget(guard);
    });
}

/// Current environment from `UPDATE_AGENT_ENV` or `APP_ENV`
pub fn get_environment() -> String {
    std::env::var("UPDATE_AGENT_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Filter directive: `UPDATE_AGENT_LOG`, then `RUST_LOG`, then a per-environment default
fn get_log_level(environment: &str) -> String {
    if let Ok(directive) =
        std::env::var("UPDATE_AGENT_LOG").or_else(|_| std::env::var("RUST_LOG"))
    {
        return directive;
    }
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for workflow operations
pub fn log_workflow_operation(
    operation: &str,
    workflow_id: Option<&str>,
    deployment_id: Option<&str>,
    step: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        workflow_id = workflow_id,
        deployment_id = deployment_id,
        step = step,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 WORKFLOW_OPERATION"
    );
}

/// Log structured data for retriable operations
pub fn log_retriable_operation(
    operation: &str,
    state: &str,
    attempt_count: u32,
    next_execution_time: Option<i64>,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        state = %state,
        attempt_count = attempt_count,
        next_execution_time = next_execution_time,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔁 RETRIABLE_OPERATION"
    );
}
