//! In-memory device state shared by the HTTP handlers and tests

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use isapi_client::wire::{AcsEvent, AcsEventCond, AcsEventInfo, UserInfo, Valid};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Fault;

/// A user record held by the mock terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredUser {
    pub employee_no: String,
    pub name: Option<String>,
    pub user_type: Option<String>,
    pub valid: Option<Valid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StoredUser {
    /// `endTime` of the validity block, if any
    pub fn end_time(&self) -> Option<&str> {
        self.valid.as_ref().map(|v| v.end_time.as_str())
    }
}

/// One request as seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    pub method: String,
    pub path: String,
}

/// Identity reported by `/System/deviceInfo`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    pub device_name: String,
    #[serde(rename = "deviceID")]
    pub device_id: String,
    pub model: String,
    pub serial_number: String,
    pub firmware_version: String,
    pub device_type: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            device_name: "MockGymDevice".to_string(),
            device_id: "MOCK-001".to_string(),
            model: "DS-K1T8003EF".to_string(),
            serial_number: "MOCK-SN-20260101".to_string(),
            firmware_version: "V2.0.0_mock".to_string(),
            device_type: "AccessControlTerminal".to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    identity: DeviceIdentity,
    users: BTreeMap<String, StoredUser>,
    events: Vec<AcsEventInfo>,
    door_opens: Vec<u32>,
    requests: Vec<RequestRecord>,
    latency: Duration,
    expected_authorization: Option<String>,
    next_serial: u64,
}

/// Handle to the mock terminal's state
///
/// Cloning shares the same state. Tests hold one clone while the server holds
/// another, so everything the server does is observable from the test.
#[derive(Debug, Clone, Default)]
pub struct MockState {
    inner: Arc<RwLock<Inner>>,
}

impl MockState {
    pub fn new() -> Self {
        Self::default()
    }

    // Test hooks

    /// Number of requests received so far, including rejected ones
    pub fn request_count(&self) -> usize {
        self.inner.read().requests.len()
    }

    pub fn requests(&self) -> Vec<RequestRecord> {
        self.inner.read().requests.clone()
    }

    /// Count of received requests with the given method and path
    pub fn count_of(&self, method: &str, path: &str) -> usize {
        self.inner
            .read()
            .requests
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn users(&self) -> Vec<StoredUser> {
        self.inner.read().users.values().cloned().collect()
    }

    pub fn user(&self, employee_no: &str) -> Option<StoredUser> {
        self.inner.read().users.get(employee_no).cloned()
    }

    pub fn user_count(&self) -> usize {
        self.inner.read().users.len()
    }

    /// Door numbers opened so far, in order
    pub fn door_opens(&self) -> Vec<u32> {
        self.inner.read().door_opens.clone()
    }

    pub fn events(&self) -> Vec<AcsEventInfo> {
        self.inner.read().events.clone()
    }

    /// Delay every response by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.inner.write().latency = latency;
    }

    pub fn latency(&self) -> Duration {
        self.inner.read().latency
    }

    /// Require HTTP Basic credentials on every ISAPI request
    pub fn require_credentials(&self, username: &str, password: &str) {
        let token = STANDARD.encode(format!("{username}:{password}"));
        self.inner.write().expected_authorization = Some(format!("Basic {token}"));
    }

    pub fn set_identity(&self, identity: DeviceIdentity) {
        self.inner.write().identity = identity;
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.inner.read().identity.clone()
    }

    /// Forget users, events and the request log; keep latency and credentials
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.users.clear();
        inner.events.clear();
        inner.door_opens.clear();
        inner.requests.clear();
        inner.next_serial = 0;
    }

    // Handler side

    pub(crate) fn record_request(&self, method: &str, path: &str) {
        self.inner.write().requests.push(RequestRecord {
            method: method.to_string(),
            path: path.to_string(),
        });
    }

    pub(crate) fn authorize(&self, authorization: Option<&str>) -> Result<(), Fault> {
        match &self.inner.read().expected_authorization {
            None => Ok(()),
            Some(expected) if authorization == Some(expected.as_str()) => Ok(()),
            Some(_) => Err(Fault::Unauthorized),
        }
    }

    /// Create the user, or overwrite it when `employeeNo` already exists
    pub fn upsert_user(&self, info: UserInfo) -> Result<StoredUser, Fault> {
        let employee_no = required_employee_no(&info)?;
        let now = Utc::now();

        let mut inner = self.inner.write();
        let created_at = inner
            .users
            .get(&employee_no)
            .map(|existing| existing.created_at)
            .unwrap_or(now);
        let updated_at = inner.users.contains_key(&employee_no).then_some(now);

        let user = StoredUser {
            employee_no: employee_no.clone(),
            name: info.name,
            user_type: info.user_type,
            valid: info.valid,
            created_at,
            updated_at,
        };
        inner.users.insert(employee_no, user.clone());
        Ok(user)
    }

    /// Merge the given fields into an existing user
    pub fn modify_user(&self, info: UserInfo) -> Result<StoredUser, Fault> {
        let employee_no = required_employee_no(&info)?;

        let mut inner = self.inner.write();
        let user = inner
            .users
            .get_mut(&employee_no)
            .ok_or_else(|| Fault::NotFound("User not found".to_string()))?;

        if let Some(name) = info.name {
            user.name = Some(name);
        }
        if let Some(user_type) = info.user_type {
            user.user_type = Some(user_type);
        }
        if let Some(valid) = info.valid {
            user.valid = Some(valid);
        }
        user.updated_at = Some(Utc::now());
        Ok(user.clone())
    }

    /// Remove the user. Unlike the real terminal there are no templates to lose.
    pub fn delete_user(&self, employee_no: &str) -> Result<StoredUser, Fault> {
        let employee_no = employee_no.trim();
        if employee_no.is_empty() {
            return Err(Fault::BadRequest("Missing employeeNo".to_string()));
        }

        self.inner
            .write()
            .users
            .remove(employee_no)
            .ok_or_else(|| Fault::NotFound("User not found".to_string()))
    }

    pub fn open_door(&self, door_no: u32) -> Result<(), Fault> {
        if door_no == 0 {
            return Err(Fault::NotFound("Door not found".to_string()));
        }
        self.inner.write().door_opens.push(door_no);
        Ok(())
    }

    /// Append an access event as if `employee_no` presented a finger
    pub fn record_scan(
        &self,
        employee_no: &str,
        time: Option<NaiveDateTime>,
    ) -> Result<AcsEventInfo, Fault> {
        let employee_no = employee_no.trim();
        if employee_no.is_empty() {
            return Err(Fault::BadRequest("employeeNo is required".to_string()));
        }

        let mut inner = self.inner.write();
        let name = inner
            .users
            .get(employee_no)
            .ok_or_else(|| Fault::NotFound("User not found".to_string()))?
            .name
            .clone()
            .unwrap_or_else(|| "Unknown".to_string());

        inner.next_serial += 1;
        let now = Utc::now().naive_utc();
        let event = AcsEventInfo {
            serial_no: inner.next_serial.to_string(),
            employee_no_string: employee_no.to_string(),
            name: Some(name),
            time: time.unwrap_or_else(|| now.with_nanosecond(0).unwrap_or(now)),
            door_no: 1,
            current_verify_mode: Some("fingerPrint".to_string()),
        };
        inner.events.push(event.clone());
        Ok(event)
    }

    /// Events within the inclusive time range, keeping the most recent `maxResults`
    pub fn search_events(&self, cond: &AcsEventCond) -> AcsEvent {
        let inner = self.inner.read();
        let mut matching: Vec<AcsEventInfo> = inner
            .events
            .iter()
            .filter(|e| cond.start_time.map_or(true, |start| e.time >= start))
            .filter(|e| cond.end_time.map_or(true, |end| e.time <= end))
            .cloned()
            .collect();
        let total_matches = matching.len() as u32;

        let limit = cond.max_results as usize;
        if limit > 0 && matching.len() > limit {
            matching.drain(..matching.len() - limit);
        }

        let search_id = if cond.search_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            cond.search_id.clone()
        };

        AcsEvent {
            search_id,
            total_matches,
            num_of_matches: matching.len() as u32,
            info_list: matching,
        }
    }
}

fn required_employee_no(info: &UserInfo) -> Result<String, Fault> {
    info.employee_no
        .as_deref()
        .map(str::trim)
        .filter(|no| !no.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Fault::BadRequest("UserInfo.employeeNo is required".to_string()))
}
