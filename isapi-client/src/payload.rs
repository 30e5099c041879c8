//! Device-facing user payload
//!
//! A [`DeviceUserPayload`] is built fresh for every call from the membership
//! record and never stored. Its [`Validity`] window can only be created from a
//! start date and an expiry date, so renewing a member is a matter of building
//! a payload with the new expiry and pushing it through the same upsert.

use std::fmt;

use chrono::NaiveDate;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// Date format used inside device timestamps
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Timestamp format used by the device (`beginTime`, event `time`)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Identifier shared by the local member record and the device user record
///
/// On the terminal this is the `employeeNo`; locally it is the member id
/// rendered as a decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(String);

impl ExternalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ExternalId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ExternalId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ExternalId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Time range during which the device lets a user through
///
/// `not_before` is the first second of the start date and `not_after` the last
/// second of the expiry date. Neither bound can be set on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validity {
    enabled: bool,
    start_date: NaiveDate,
    expiry_date: NaiveDate,
}

impl Validity {
    /// Window covering `start_date` 00:00:00 through `expiry_date` 23:59:59
    pub fn for_window(start_date: NaiveDate, expiry_date: NaiveDate) -> Self {
        Self {
            enabled: true,
            start_date,
            expiry_date,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn expiry_date(&self) -> NaiveDate {
        self.expiry_date
    }

    /// `YYYY-MM-DDT00:00:00` of the start date
    pub fn not_before(&self) -> String {
        format!("{}T00:00:00", self.start_date.format(DATE_FORMAT))
    }

    /// `YYYY-MM-DDT23:59:59` of the expiry date
    pub fn not_after(&self) -> String {
        format!("{}T23:59:59", self.expiry_date.format(DATE_FORMAT))
    }
}

impl Serialize for Validity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Validity", 3)?;
        state.serialize_field("enabled", &self.enabled)?;
        state.serialize_field("notBefore", &self.not_before())?;
        state.serialize_field("notAfter", &self.not_after())?;
        state.end()
    }
}

/// User record as the device should hold it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceUserPayload {
    pub external_id: ExternalId,
    pub display_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub validity: Validity,
}

impl DeviceUserPayload {
    pub fn new(external_id: impl Into<ExternalId>, display_name: impl Into<String>, validity: Validity) -> Self {
        Self {
            external_id: external_id.into(),
            display_name: display_name.into(),
            phone: None,
            address: None,
            validity,
        }
    }

    pub fn with_phone(mut self, phone: Option<String>) -> Self {
        self.phone = phone.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn with_address(mut self, address: Option<String>) -> Self {
        self.address = address.filter(|a| !a.trim().is_empty());
        self
    }
}
