//! Attendance log read back from the terminal
//!
//! The terminal records an access event every time a member presents a finger;
//! software only ever reads the log.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::payload::ExternalId;
use crate::wire::{AcsEvent, AcsEventCond, AcsEventInfo};

/// Default page size for attendance searches
pub const DEFAULT_MAX_RESULTS: u32 = 100;

/// Attendance search window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    /// Earliest event time, inclusive
    pub start: Option<NaiveDateTime>,
    /// Latest event time, inclusive
    pub end: Option<NaiveDateTime>,
    /// Keep only the most recent N matches
    pub max_results: u32,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl EventQuery {
    pub fn between(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    pub(crate) fn to_condition(&self) -> AcsEventCond {
        AcsEventCond {
            search_id: uuid::Uuid::new_v4().to_string(),
            search_result_position: 0,
            max_results: self.max_results,
            start_time: self.start,
            end_time: self.end,
        }
    }
}

/// One access attempt recorded by the terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessEvent {
    pub serial_no: String,
    pub external_id: ExternalId,
    pub name: Option<String>,
    pub time: NaiveDateTime,
    pub door_no: u32,
    pub verify_mode: Option<String>,
}

impl From<AcsEventInfo> for AccessEvent {
    fn from(info: AcsEventInfo) -> Self {
        Self {
            serial_no: info.serial_no,
            external_id: ExternalId::new(info.employee_no_string),
            name: info.name,
            time: info.time,
            door_no: info.door_no,
            verify_mode: info.current_verify_mode,
        }
    }
}

/// A page of attendance search results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    pub total_matches: u32,
    pub events: Vec<AccessEvent>,
}

impl From<AcsEvent> for EventPage {
    fn from(result: AcsEvent) -> Self {
        Self {
            total_matches: result.total_matches,
            events: result.info_list.into_iter().map(AccessEvent::from).collect(),
        }
    }
}
