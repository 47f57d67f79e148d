//! Tracing setup for the simulation runner
//!
//! Environment:
//! - `RUST_LOG` (through [`crate::config::RunConfig`]): a bare level such as
//!   `debug` applies to this crate only, dependencies stay at `warn`; a full
//!   filter expression is used as given
//! - `ENABLE_FILE_LOGS`: `true`/`1` adds a daily rolling file
//! - `LOG_DIR`, `LOG_FILE`: where that file goes (`./logs`, `simulation.log`)

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CRATE_TARGET: &str = "practice_sim";

/// Keeps the non-blocking file writer flushing until dropped.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

pub fn file_logging_enabled() -> bool {
    std::env::var("ENABLE_FILE_LOGS")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

/// Filter directives for `log_level`.
pub fn filter_directives(log_level: &str) -> String {
    let log_level = log_level.trim();
    if log_level.is_empty() {
        format!("warn,{CRATE_TARGET}=info")
    } else if log_level.contains(|c: char| c == '=' || c == ',') {
        log_level.to_string()
    } else {
        format!("warn,{CRATE_TARGET}={log_level}")
    }
}

fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(filter_directives(log_level))
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,{CRATE_TARGET}=info")))
}

/// Installs the global subscriber: stdout always, a daily rolling file under
/// `LOG_DIR` when file logs are enabled.
pub fn init_tracing(log_level: &str) -> Option<FileLogGuard> {
    let stdout_layer = fmt::layer().with_target(false);
    let file_writer = file_logging_enabled().then(rolling_file).flatten();

    match file_writer {
        Some((writer, guard)) => {
            tracing_subscriber::registry()
                .with(env_filter(log_level))
                .with(stdout_layer)
                .with(
                    fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(true),
                )
                .init();
            Some(FileLogGuard { _guard: guard })
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter(log_level))
                .with(stdout_layer)
                .init();
            None
        }
    }
}

fn rolling_file() -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
    let file_name = std::env::var("LOG_FILE").unwrap_or_else(|_| "simulation.log".to_string());
    if let Err(err) = std::fs::create_dir_all(&log_dir) {
        eprintln!("cannot create log directory {log_dir}: {err}");
        return None;
    }
    let appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, file_name);
    Some(tracing_appender::non_blocking(appender))
}
