//! # Structured Logging Module
//!
//! Environment-aware structured logging to the console and, when the log
//! directory is writable, to a JSON log file per process.
//!
//! `RUST_LOG` overrides the environment's default level when set.

use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let log_dir = get_log_directory();

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(build_filter(&log_level));

        // File output is best effort; a read-only working directory still gets console logs
        let file_output = fs::create_dir_all(&log_dir).ok().map(|_| {
            let log_filename = format!(
                "{}.{}.{}.log",
                environment,
                process::id(),
                Utc::now().format("%Y%m%d_%H%M%S")
            );
            let file_appender = tracing_appender::rolling::never(&log_dir, &log_filename);
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            (log_dir.join(log_filename), file_writer, guard)
        });

        let (log_path, file_layer, guard) = match file_output {
            Some((path, writer, guard)) => {
                let layer = fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(build_filter(&log_level));
                (Some(path), Some(layer), Some(guard))
            }
            None => (None, None, None),
        };

        let init_result = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init();

        if init_result.is_err() {
            // Another subscriber (test harness, embedding application) won
            tracing::debug!("Global tracing subscriber already initialized");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            log_file = ?log_path,
            "🔧 STRUCTURED LOGGING: Initialized"
        );

        guard
    });
}

fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("CONDUCTOR_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_directory() -> PathBuf {
    std::env::var("CONDUCTOR_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("log"))
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        "test" | "development" => "debug".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log an operator action against a conductor
pub fn log_conductor_operation(
    operation: &str,
    conductor: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        conductor = %conductor,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🎼 CONDUCTOR_OPERATION"
    );
}

/// Log a catch-up activation or deactivation
pub fn log_catch_up_operation(operation: &str, prior_to: Option<&str>, status: &str) {
    tracing::info!(
        operation = %operation,
        prior_to = prior_to,
        status = %status,
        timestamp = %Utc::now().to_rfc3339(),
        "🔁 CATCH_UP_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
