//! Wire shapes of the vendor ISAPI bodies
//!
//! The same serde structs are used to encode requests (client) and decode them
//! (mock device), in XML through `quick-xml` and in JSON wrapped in the root
//! element name (`{"UserInfo": {...}}`).

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use xmltree::Element;

use crate::config::WireFormat;
use crate::payload::DeviceUserPayload;

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

pub const USER_INFO: &str = "UserInfo";
pub const REMOTE_CONTROL_DOOR: &str = "RemoteControlDoor";
pub const RESPONSE_STATUS: &str = "ResponseStatus";
pub const DEVICE_INFO: &str = "DeviceInfo";
pub const ACS_EVENT_COND: &str = "AcsEventCond";
pub const ACS_EVENT: &str = "AcsEvent";

/// `<UserInfo>` record
///
/// Every field is optional so the mock device can decode incomplete requests
/// and answer them with a client error instead of failing to parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
    #[serde(rename = "Valid", default, skip_serializing_if = "Option::is_none")]
    pub valid: Option<Valid>,
}

/// `<Valid>` block of a user record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Valid {
    pub enable: bool,
    pub begin_time: String,
    pub end_time: String,
}

impl From<&DeviceUserPayload> for UserInfo {
    fn from(payload: &DeviceUserPayload) -> Self {
        Self {
            employee_no: Some(payload.external_id.to_string()),
            name: Some(payload.display_name.clone()),
            user_type: Some("normal".to_string()),
            valid: Some(Valid {
                enable: payload.validity.enabled(),
                begin_time: payload.validity.not_before(),
                end_time: payload.validity.not_after(),
            }),
        }
    }
}

/// `<RemoteControlDoor>` command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteControlDoor {
    pub cmd: String,
}

impl RemoteControlDoor {
    pub fn open() -> Self {
        Self { cmd: "open".to_string() }
    }
}

/// `<ResponseStatus>` returned by most write endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseStatus {
    #[serde(rename = "requestURL", default, skip_serializing_if = "Option::is_none")]
    pub request_url: Option<String>,
    pub status_code: u32,
    pub status_string: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_status_code: Option<String>,
}

impl ResponseStatus {
    pub fn ok() -> Self {
        Self {
            request_url: None,
            status_code: 1,
            status_string: "OK".to_string(),
            sub_status_code: Some("ok".to_string()),
        }
    }

    pub fn error(status_code: u32, status_string: impl Into<String>, sub_status_code: impl Into<String>) -> Self {
        Self {
            request_url: None,
            status_code,
            status_string: status_string.into(),
            sub_status_code: Some(sub_status_code.into()),
        }
    }

    pub fn with_request_url(mut self, url: impl Into<String>) -> Self {
        self.request_url = Some(url.into());
        self
    }
}

/// Attendance search condition (`AcsEventCond`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcsEventCond {
    #[serde(rename = "searchID", default)]
    pub search_id: String,
    #[serde(default)]
    pub search_result_position: u32,
    #[serde(default)]
    pub max_results: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveDateTime>,
}

/// Attendance search result (`AcsEvent`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcsEvent {
    #[serde(rename = "searchID", default)]
    pub search_id: String,
    #[serde(default)]
    pub total_matches: u32,
    #[serde(default)]
    pub num_of_matches: u32,
    #[serde(rename = "InfoList", default)]
    pub info_list: Vec<AcsEventInfo>,
}

/// One entry of an attendance search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcsEventInfo {
    #[serde(rename = "serialNo", default)]
    pub serial_no: String,
    pub employee_no_string: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub time: NaiveDateTime,
    #[serde(default = "default_door")]
    pub door_no: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_verify_mode: Option<String>,
}

fn default_door() -> u32 {
    1
}

/// Encode `value` as a body whose root element is `root`
pub fn encode<T: Serialize>(format: WireFormat, root: &str, value: &T) -> Result<String, String> {
    match format {
        WireFormat::Xml => {
            let xml = quick_xml::se::to_string_with_root(root, value).map_err(|e| e.to_string())?;
            Ok(format!("{XML_DECLARATION}\n{xml}"))
        }
        WireFormat::Json => {
            let mut object = serde_json::Map::new();
            object.insert(
                root.to_string(),
                serde_json::to_value(value).map_err(|e| e.to_string())?,
            );
            serde_json::to_string(&serde_json::Value::Object(object)).map_err(|e| e.to_string())
        }
    }
}

/// Decode a body whose root element is `root`
///
/// Returns `Ok(None)` when a JSON body has no `root` member.
pub fn decode<T: DeserializeOwned>(format: WireFormat, root: &str, body: &str) -> Result<Option<T>, String> {
    match format {
        WireFormat::Xml => quick_xml::de::from_str(body)
            .map(Some)
            .map_err(|e| format!("invalid {root} XML: {e}")),
        WireFormat::Json => {
            let mut value: serde_json::Value =
                serde_json::from_str(body).map_err(|e| format!("invalid {root} JSON: {e}"))?;
            match value.get_mut(root).map(serde_json::Value::take) {
                Some(inner) => serde_json::from_value(inner)
                    .map(Some)
                    .map_err(|e| format!("invalid {root} JSON: {e}")),
                None => Ok(None),
            }
        }
    }
}

/// Vendor status text from an error body (`statusString`, else `subStatusCode`)
///
/// Accepts both XML and JSON bodies; returns `None` for anything else.
pub fn status_detail(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    if let Ok(xml) = Element::parse(body.as_bytes()) {
        return find_text(&xml, "statusString").or_else(|| find_text(&xml, "subStatusCode"));
    }

    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    ["statusString", "subStatusCode"].iter().find_map(|key| {
        json.get(key)
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    })
}

/// Text of the first element named `tag`, searching depth-first
pub fn find_text(element: &Element, tag: &str) -> Option<String> {
    if element.name == tag {
        return element
            .get_text()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
    }

    element
        .children
        .iter()
        .filter_map(|node| node.as_element())
        .find_map(|child| find_text(child, tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Validity;
    use chrono::NaiveDate;

    fn payload() -> DeviceUserPayload {
        DeviceUserPayload::new(
            42,
            "Jane <Doe> & Co",
            Validity::for_window(
                NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            ),
        )
    }

    #[test]
    fn test_user_info_xml_shape() {
        let xml = encode(WireFormat::Xml, USER_INFO, &UserInfo::from(&payload())).unwrap();

        assert!(xml.starts_with(XML_DECLARATION));
        assert!(xml.contains("<UserInfo>"));
        assert!(xml.contains("<employeeNo>42</employeeNo>"));
        assert!(xml.contains("<userType>normal</userType>"));
        assert!(xml.contains("<Valid><enable>true</enable>"));
        assert!(xml.contains("<beginTime>2025-01-10T00:00:00</beginTime>"));
        assert!(xml.contains("<endTime>2025-03-01T23:59:59</endTime>"));
        // user-supplied text is escaped
        assert!(xml.contains("Jane &lt;Doe&gt; &amp; Co"));
    }

    #[test]
    fn test_user_info_json_shape() {
        let json = encode(WireFormat::Json, USER_INFO, &UserInfo::from(&payload())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["UserInfo"]["employeeNo"], "42");
        assert_eq!(value["UserInfo"]["userType"], "normal");
        assert_eq!(value["UserInfo"]["Valid"]["enable"], true);
        assert_eq!(value["UserInfo"]["Valid"]["endTime"], "2025-03-01T23:59:59");
    }

    #[test]
    fn test_decode_user_info_from_xml() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<UserInfo>
  <employeeNo>7</employeeNo>
  <name>Sam</name>
  <userType>normal</userType>
  <Valid>
    <enable>true</enable>
    <beginTime>2025-01-01T00:00:00</beginTime>
    <endTime>2025-12-31T23:59:59</endTime>
  </Valid>
</UserInfo>"#;

        let user: UserInfo = decode(WireFormat::Xml, USER_INFO, body).unwrap().unwrap();
        assert_eq!(user.employee_no.as_deref(), Some("7"));
        assert_eq!(user.name.as_deref(), Some("Sam"));
        assert_eq!(user.valid.unwrap().end_time, "2025-12-31T23:59:59");
    }

    #[test]
    fn test_decode_json_without_root_is_none() {
        let decoded: Option<UserInfo> = decode(WireFormat::Json, USER_INFO, r#"{"Other":{}}"#).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_status_detail_from_xml() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<ResponseStatus version="2.0" xmlns="http://www.isapi.org/ver20/XMLSchema">
  <requestURL>/ISAPI/AccessControl/UserInfo/Record</requestURL>
  <statusCode>4</statusCode>
  <statusString>Invalid Operation</statusString>
  <subStatusCode>notSupport</subStatusCode>
</ResponseStatus>"#;
        assert_eq!(status_detail(body).as_deref(), Some("Invalid Operation"));
    }

    #[test]
    fn test_status_detail_falls_back_to_sub_status() {
        let body = "<ResponseStatus><statusString> </statusString><subStatusCode>employeeNoNotExist</subStatusCode></ResponseStatus>";
        assert_eq!(status_detail(body).as_deref(), Some("employeeNoNotExist"));
    }

    #[test]
    fn test_status_detail_from_json() {
        let body = r#"{"statusCode":4,"statusString":"User not found","subStatusCode":"employeeNoNotExist"}"#;
        assert_eq!(status_detail(body).as_deref(), Some("User not found"));
    }

    #[test]
    fn test_status_detail_from_plain_text() {
        assert_eq!(status_detail("Bad Gateway"), None);
        assert_eq!(status_detail(""), None);
    }
}
