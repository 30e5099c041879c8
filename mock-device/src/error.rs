//! Error types for the mock device

use std::net::SocketAddr;

use thiserror::Error;
use warp::http::StatusCode;

/// Errors raised while starting the mock device
#[derive(Debug, Error)]
pub enum MockError {
    #[error("failed to bind mock device on {addr}: {message}")]
    Bind { addr: SocketAddr, message: String },
}

/// A request the mock device refuses, mirroring the terminal's error answers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// Malformed body or missing required field
    #[error("{0}")]
    BadRequest(String),

    /// Unknown user, door or endpoint
    #[error("{0}")]
    NotFound(String),

    /// Credentials missing or wrong
    #[error("Unauthorized")]
    Unauthorized,
}

impl Fault {
    pub fn status(&self) -> StatusCode {
        match self {
            Fault::BadRequest(_) => StatusCode::BAD_REQUEST,
            Fault::NotFound(_) => StatusCode::NOT_FOUND,
            Fault::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    /// Vendor `statusCode` (4 = invalid operation, 6 = invalid content)
    pub fn status_code(&self) -> u32 {
        match self {
            Fault::BadRequest(_) => 6,
            Fault::NotFound(_) | Fault::Unauthorized => 4,
        }
    }

    /// Vendor `subStatusCode`
    pub fn sub_status(&self) -> &'static str {
        match self {
            Fault::BadRequest(_) => "badParameters",
            Fault::NotFound(_) => "notFound",
            Fault::Unauthorized => "unauthorized",
        }
    }
}
