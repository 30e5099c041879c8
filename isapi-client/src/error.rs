//! Error types for the ISAPI client

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Why a request reached no usable answer from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnreachableCause {
    /// The request was sent but nothing came back within the configured timeout
    TimedOut(Duration),
    /// The connection failed or dropped before a response arrived
    NoResponse(String),
}

impl fmt::Display for UnreachableCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnreachableCause::TimedOut(timeout) => {
                write!(f, "request timed out after {} ms", timeout.as_millis())
            }
            UnreachableCause::NoResponse(cause) => write!(f, "no response ({cause})"),
        }
    }
}

/// Errors that can occur while talking to the access-control terminal.
///
/// The variants keep three causes apart so an operator can tell a switched-off
/// terminal from one that refused the request:
///
/// - [`IsapiError::Rejected`]: the device answered with a non-2xx status
/// - [`IsapiError::Unreachable`]: the request went out but no answer came back
/// - [`IsapiError::Request`]: the request could not be built or sent at all
///
/// Every message starts with the name of the operation that failed.
#[derive(Debug, Error)]
pub enum IsapiError {
    /// The device responded with an error status
    #[error("{operation}: device rejected the request (HTTP {status}){}", detail_suffix(.detail))]
    Rejected {
        operation: &'static str,
        status: u16,
        /// Vendor status text (`statusString` / `subStatusCode`) when the body carried one
        detail: Option<String>,
    },

    /// Timeout, refused connection, reset, DNS failure
    #[error("{operation}: device unreachable, {cause}")]
    Unreachable {
        operation: &'static str,
        cause: UnreachableCause,
    },

    /// The request could not be constructed or dispatched
    #[error("{operation}: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },

    /// The payload failed validation; nothing was sent
    #[error("{operation}: invalid payload: {message}")]
    InvalidPayload {
        operation: &'static str,
        message: String,
    },

    /// A successful response whose body could not be read
    #[error("{operation}: unreadable response: {message}")]
    Parse {
        operation: &'static str,
        message: String,
    },
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(text) => format!(": {text}"),
        None => String::new(),
    }
}

impl IsapiError {
    /// Name of the operation that produced this error
    pub fn operation(&self) -> &'static str {
        match self {
            IsapiError::Rejected { operation, .. }
            | IsapiError::Unreachable { operation, .. }
            | IsapiError::Request { operation, .. }
            | IsapiError::InvalidPayload { operation, .. }
            | IsapiError::Parse { operation, .. } => operation,
        }
    }

    /// HTTP status of a rejected request
    pub fn status(&self) -> Option<u16> {
        match self {
            IsapiError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether trying again later could plausibly succeed.
    ///
    /// Only network-level failures qualify. A device that rejected the request
    /// will reject it again.
    pub fn is_transient(&self) -> bool {
        matches!(self, IsapiError::Unreachable { .. })
    }

    /// Classify a transport failure reported by the HTTP stack.
    pub(crate) fn from_transport(
        operation: &'static str,
        timeout: Duration,
        error: reqwest::Error,
    ) -> Self {
        if error.is_builder() {
            return IsapiError::Request {
                operation,
                message: root_cause(&error),
            };
        }

        if error.is_timeout() {
            return IsapiError::Unreachable {
                operation,
                cause: UnreachableCause::TimedOut(timeout),
            };
        }

        let cause = if error.is_connect() {
            format!("connection failed: {}", root_cause(&error))
        } else {
            root_cause(&error)
        };

        IsapiError::Unreachable {
            operation,
            cause: UnreachableCause::NoResponse(cause),
        }
    }
}

/// Innermost message of an error chain ("Connection refused (os error 111)")
fn root_cause(error: &(dyn std::error::Error + 'static)) -> String {
    let mut current = error;
    while let Some(next) = current.source() {
        current = next;
    }
    current.to_string()
}

/// Errors raised while reading device configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A recognised key carried a value that could not be parsed
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    /// A setting is out of its allowed range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Type alias for results returned by the ISAPI client
pub type Result<T> = std::result::Result<T, IsapiError>;
