//! Structured result of a device sync attempt

use std::fmt;

use isapi_client::{DeviceInfo, EventPage, IsapiError, StatusReply};
use serde::{Serialize, Serializer};

/// Reason reported when sync is administratively disabled
pub const SYNC_DISABLED_REASON: &str = "DISABLE_DEVICE_SYNC";

/// What the device answered on success
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DeviceResponse {
    Status(StatusReply),
    DeviceInfo(DeviceInfo),
    Events(EventPage),
}

impl From<StatusReply> for DeviceResponse {
    fn from(reply: StatusReply) -> Self {
        DeviceResponse::Status(reply)
    }
}

impl From<DeviceInfo> for DeviceResponse {
    fn from(info: DeviceInfo) -> Self {
        DeviceResponse::DeviceInfo(info)
    }
}

impl From<EventPage> for DeviceResponse {
    fn from(page: EventPage) -> Self {
        DeviceResponse::Events(page)
    }
}

/// Why a sync attempt did not reach the device, or did and failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Payload unusable; nothing was sent
    InvalidPayload,
    /// The membership record does not exist
    MemberNotFound,
    /// The membership store could not be read
    Store,
    /// Device unreachable or request not sendable
    Transport,
    /// Device answered with an error or an unreadable body
    Protocol,
    /// The device call panicked
    Internal,
}

impl FailureKind {
    /// Machine-readable reason for the UI
    pub fn reason(&self) -> &'static str {
        match self {
            FailureKind::InvalidPayload => "invalid-payload",
            FailureKind::MemberNotFound => "member-not-found",
            FailureKind::Store => "store-error",
            FailureKind::Transport => "transport",
            FailureKind::Protocol => "protocol",
            FailureKind::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl SyncFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&IsapiError> for SyncFailure {
    fn from(error: &IsapiError) -> Self {
        let kind = match error {
            IsapiError::Rejected { .. } | IsapiError::Parse { .. } => FailureKind::Protocol,
            IsapiError::Unreachable { .. } | IsapiError::Request { .. } => FailureKind::Transport,
            IsapiError::InvalidPayload { .. } => FailureKind::InvalidPayload,
        };
        Self::new(kind, error.to_string())
    }
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

/// Outcome of one sync attempt. Never an error: every device failure ends up here.
///
/// Exactly one of synced, skipped or failed holds, by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced(DeviceResponse),
    Skipped { reason: &'static str },
    Failed(SyncFailure),
}

impl SyncOutcome {
    pub fn skipped_disabled() -> Self {
        SyncOutcome::Skipped {
            reason: SYNC_DISABLED_REASON,
        }
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        SyncOutcome::Failed(SyncFailure::new(kind, message))
    }

    pub fn synced(&self) -> bool {
        matches!(self, SyncOutcome::Synced(_))
    }

    pub fn skipped(&self) -> bool {
        matches!(self, SyncOutcome::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SyncOutcome::Failed(_))
    }

    /// Error message, present exactly when the attempt failed
    pub fn error(&self) -> Option<&str> {
        match self {
            SyncOutcome::Failed(failure) => Some(&failure.message),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            SyncOutcome::Skipped { reason } => Some(reason),
            SyncOutcome::Failed(failure) => Some(failure.kind.reason()),
            SyncOutcome::Synced(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&SyncFailure> {
        match self {
            SyncOutcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn response(&self) -> Option<&DeviceResponse> {
        match self {
            SyncOutcome::Synced(response) => Some(response),
            _ => None,
        }
    }
}

impl From<&IsapiError> for SyncOutcome {
    fn from(error: &IsapiError) -> Self {
        SyncOutcome::Failed(error.into())
    }
}

/// Flat UI shape: `{synced, skipped, error?, reason?, ...responseFields}`
#[derive(Serialize)]
struct FlatOutcome<'a> {
    synced: bool,
    skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
    #[serde(flatten)]
    response: Option<&'a DeviceResponse>,
}

impl Serialize for SyncOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        FlatOutcome {
            synced: self.synced(),
            skipped: self.skipped(),
            error: self.error(),
            reason: self.reason(),
            response: self.response(),
        }
        .serialize(serializer)
    }
}
