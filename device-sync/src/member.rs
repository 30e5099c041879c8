//! Membership record as handed over by the membership store

use std::fmt;
use std::str::FromStr;

use chrono::{Months, NaiveDate};
use isapi_client::{DeviceUserPayload, ExternalId, Validity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Numeric member id, which is also the terminal's `employeeNo`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(i64);

impl MemberId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn external_id(&self) -> ExternalId {
        ExternalId::from(self.0)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MemberId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Plan length, which sets the validity window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipType {
    /// One month
    #[serde(alias = "1_month")]
    Short,
    /// Three months
    #[serde(alias = "3_months")]
    Medium,
    /// One year
    #[serde(alias = "1_year")]
    Long,
}

impl MembershipType {
    pub fn months(&self) -> u32 {
        match self {
            MembershipType::Short => 1,
            MembershipType::Medium => 3,
            MembershipType::Long => 12,
        }
    }

    /// Expiry date of a plan starting on `start`, clamped to the end of shorter months
    pub fn expiry_from(&self, start: NaiveDate) -> NaiveDate {
        start
            .checked_add_months(Months::new(self.months()))
            .unwrap_or(NaiveDate::MAX)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown membership type {0:?} (expected short, medium or long)")]
pub struct UnknownMembershipType(String);

impl FromStr for MembershipType {
    type Err = UnknownMembershipType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" | "1_month" => Ok(MembershipType::Short),
            "medium" | "3_months" => Ok(MembershipType::Medium),
            "long" | "1_year" => Ok(MembershipType::Long),
            other => Err(UnknownMembershipType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    #[default]
    Active,
    Inactive,
}

/// Why a record cannot be turned into a device payload
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("member record has no id yet")]
    MissingId,
}

/// A member as stored locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRecord {
    /// `None` until the store has persisted the record
    pub id: Option<MemberId>,
    pub full_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub membership_type: MembershipType,
    pub start_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub status: MemberStatus,
}

impl MembershipRecord {
    /// A new active member whose expiry follows from the plan
    pub fn new(
        id: Option<MemberId>,
        full_name: impl Into<String>,
        membership_type: MembershipType,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            id,
            full_name: full_name.into(),
            phone: None,
            address: None,
            membership_type,
            start_date,
            expiry_date: membership_type.expiry_from(start_date),
            status: MemberStatus::Active,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_expiry(mut self, expiry_date: NaiveDate) -> Self {
        self.expiry_date = expiry_date;
        self
    }

    pub fn with_status(mut self, status: MemberStatus) -> Self {
        self.status = status;
        self
    }

    /// The record after renewing onto `membership_type` from `start_date`
    ///
    /// Identity and profile are kept, the window moves and the member is active again.
    pub fn renewed(&self, membership_type: MembershipType, start_date: NaiveDate) -> Self {
        Self {
            membership_type,
            start_date,
            expiry_date: membership_type.expiry_from(start_date),
            status: MemberStatus::Active,
            ..self.clone()
        }
    }

    /// Device-facing payload, built fresh for every call
    pub fn to_payload(&self) -> Result<DeviceUserPayload, PayloadError> {
        let id = self.id.ok_or(PayloadError::MissingId)?;
        Ok(
            DeviceUserPayload::new(
                id.external_id(),
                self.full_name.clone(),
                Validity::for_window(self.start_date, self.expiry_date),
            )
            .with_phone(self.phone.clone())
            .with_address(self.address.clone()),
        )
    }
}
