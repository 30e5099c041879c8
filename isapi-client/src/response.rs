//! Typed results of device calls

use serde::{Deserialize, Serialize};
use xmltree::Element;

use crate::wire::{self, DEVICE_INFO};

/// Result of a write call the device acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReply {
    pub status_code: u16,
}

/// Identity of the terminal, as reported by `/System/deviceInfo`
///
/// Every field is optional: firmware versions differ in what they report and a
/// missing field is not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_name: Option<String>,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub model: Option<String>,
    pub device_type: Option<String>,
}

impl DeviceInfo {
    /// Pull the identifying fields out of a response body
    pub fn from_body(body: &str) -> Self {
        if let Ok(xml) = Element::parse(body.trim().as_bytes()) {
            return Self {
                device_name: wire::find_text(&xml, "deviceName"),
                serial_number: wire::find_text(&xml, "serialNumber"),
                firmware_version: wire::find_text(&xml, "firmwareVersion"),
                model: wire::find_text(&xml, "model"),
                device_type: wire::find_text(&xml, "deviceType"),
            };
        }

        serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|mut value| value.get_mut(DEVICE_INFO).map(serde_json::Value::take))
            .and_then(|inner| serde_json::from_value(inner).ok())
            .unwrap_or_default()
    }
}
