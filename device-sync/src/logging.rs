//! Logging setup for gymsync processes
//!
//! Device sync reports failures through `tracing` rather than to its caller, so
//! something has to install a subscriber for an operator to see them. Library
//! code never does this on its own; binaries and tests call [`init_logging`].

use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Env var overriding the log filter (error, warn, info, debug, trace, or a directive list)
pub const ENV_LOG_LEVEL: &str = "GYMSYNC_LOG_LEVEL";

/// Env var selecting the mode for [`init_logging_from_env`]
pub const ENV_LOG_MODE: &str = "GYMSYNC_LOG_MODE";

/// Logging mode for different use cases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No subscriber; events are dropped
    Silent,
    /// Compact stderr output
    Development,
    /// Verbose output with source locations
    Debug,
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid log filter {value:?}: {reason}")]
    InvalidFilter { value: String, reason: String },
}

/// Initialize logging with the specified mode
///
/// # Environment Variables
///
/// - `GYMSYNC_LOG_LEVEL`: filter override, checked first
/// - `RUST_LOG`: used when `GYMSYNC_LOG_LEVEL` is unset
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => {
            let filter = create_env_filter("info")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false)
                        .compact(),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Debug => {
            let filter = create_env_filter("debug")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .pretty()
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
    }
}

/// Initialize logging from `GYMSYNC_LOG_MODE` (silent, development, debug)
///
/// Defaults to development so sync failures reach stderr.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    let mode = std::env::var(ENV_LOG_MODE)
        .ok()
        .and_then(|value| parse_mode(&value))
        .unwrap_or(LoggingMode::Development);

    init_logging(mode)
}

fn parse_mode(value: &str) -> Option<LoggingMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "silent" | "off" => Some(LoggingMode::Silent),
        "development" | "dev" => Some(LoggingMode::Development),
        "debug" => Some(LoggingMode::Debug),
        _ => None,
    }
}

fn create_env_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    let directives = std::env::var(ENV_LOG_LEVEL)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_level.to_string());

    EnvFilter::try_new(&directives).map_err(|e| LoggingError::InvalidFilter {
        value: directives.clone(),
        reason: e.to_string(),
    })
}

/// Whether a global subscriber is already installed
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}
