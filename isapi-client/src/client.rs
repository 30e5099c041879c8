use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, info};

use crate::config::{DeviceConfig, SharedConfig, WireFormat};
use crate::error::{IsapiError, Result};
use crate::events::{EventPage, EventQuery};
use crate::payload::{DeviceUserPayload, ExternalId};
use crate::response::{DeviceInfo, StatusReply};
use crate::wire::{
    self, AcsEvent, RemoteControlDoor, UserInfo, ACS_EVENT, ACS_EVENT_COND, REMOTE_CONTROL_DOOR,
    USER_INFO,
};

/// The ISAPI endpoints this client speaks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Upsert a user record keyed by `employeeNo`
    CreateOrUpdateUser,
    /// Remove a user record together with its enrolled fingerprints
    DeleteUser,
    /// Momentarily release a door relay
    OpenDoor,
    /// Identity and firmware probe
    DeviceInfo,
    /// Attendance log search
    SearchEvents,
}

impl Operation {
    /// Name used as the prefix of every error message
    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreateOrUpdateUser => "create_or_update_user",
            Operation::DeleteUser => "delete_user",
            Operation::OpenDoor => "open_door",
            Operation::DeviceInfo => "device_info",
            Operation::SearchEvents => "search_events",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Operation::CreateOrUpdateUser | Operation::SearchEvents => Method::POST,
            Operation::DeleteUser => Method::DELETE,
            Operation::OpenDoor => Method::PUT,
            Operation::DeviceInfo => Method::GET,
        }
    }

    /// Path relative to the ISAPI root; the door number is appended for `OpenDoor`
    pub fn endpoint(&self) -> &'static str {
        match self {
            Operation::CreateOrUpdateUser | Operation::DeleteUser => "/AccessControl/UserInfo/Record",
            Operation::OpenDoor => "/AccessControl/RemoteControl/door",
            Operation::DeviceInfo => "/System/deviceInfo",
            Operation::SearchEvents => "/AccessControl/AcsEvent",
        }
    }
}

/// Device calls behind the adapter
///
/// [`IsapiClient`] is the production implementation. The trait is the seam
/// where tests substitute transports that fail, stall or count calls.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Create the user, or overwrite it if `external_id` already exists
    async fn create_or_update_user(&self, payload: &DeviceUserPayload) -> Result<StatusReply>;

    /// Delete the user and every biometric template bound to it. Irreversible.
    async fn delete_user(&self, external_id: &ExternalId) -> Result<StatusReply>;

    /// Release a door; `None` uses the configured default door
    async fn open_door(&self, door_no: Option<u32>) -> Result<StatusReply>;

    /// Identity probe, doubles as a health check
    async fn device_info(&self) -> Result<DeviceInfo>;

    /// Read back the attendance log
    async fn search_events(&self, query: &EventQuery) -> Result<EventPage>;
}

struct RequestSpec {
    operation: Operation,
    path: String,
    format: WireFormat,
    query: Vec<(&'static str, String)>,
    body: Option<String>,
}

impl RequestSpec {
    fn new(operation: Operation, format: WireFormat) -> Self {
        let mut query = Vec::new();
        if format == WireFormat::Json {
            query.push(("format", "json".to_string()));
        }

        Self {
            operation,
            path: operation.endpoint().to_string(),
            format,
            query,
            body: None,
        }
    }

    fn with_path(mut self, path: String) -> Self {
        self.path = path;
        self
    }

    fn with_query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }
}

struct Exchange {
    status: u16,
    body: String,
}

/// HTTP client for the terminal's ISAPI surface
///
/// Connection settings are not captured at construction: each call reads a
/// fresh snapshot from the [`SharedConfig`], so host, credentials and timeout
/// changes apply to the next request.
#[derive(Debug, Clone)]
pub struct IsapiClient {
    http: reqwest::Client,
    config: SharedConfig,
}

impl IsapiClient {
    pub fn new(config: SharedConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Create a client with a custom HTTP client (proxies, TLS settings)
    pub fn with_http_client(http: reqwest::Client, config: SharedConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    async fn exchange(&self, config: &DeviceConfig, spec: RequestSpec) -> Result<Exchange> {
        let operation = spec.operation.name();

        let base_url = config.base_url().ok_or_else(|| IsapiError::Request {
            operation,
            message: "device host is not configured".to_string(),
        })?;
        let url = format!("{}{}", base_url, spec.path);

        let mut request = self
            .http
            .request(spec.operation.method(), &url)
            .timeout(config.timeout)
            .header(
                reqwest::header::ACCEPT,
                "application/xml, application/json, text/xml, */*",
            );

        if let Some(username) = &config.username {
            request = request.basic_auth(username, config.password.as_ref());
        }

        if !spec.query.is_empty() {
            request = request.query(&spec.query);
        }

        if let Some(body) = spec.body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, spec.format.content_type())
                .body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| IsapiError::from_transport(operation, config.timeout, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| IsapiError::from_transport(operation, config.timeout, e))?;

        if !status.is_success() {
            return Err(IsapiError::Rejected {
                operation,
                status: status.as_u16(),
                detail: wire::status_detail(&body),
            });
        }

        Ok(Exchange {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl DeviceTransport for IsapiClient {
    async fn create_or_update_user(&self, payload: &DeviceUserPayload) -> Result<StatusReply> {
        let operation = Operation::CreateOrUpdateUser;
        if payload.external_id.is_empty() {
            return Err(IsapiError::InvalidPayload {
                operation: operation.name(),
                message: "externalId is required".to_string(),
            });
        }

        let config = self.config.snapshot();
        let body = wire::encode(config.wire_format, USER_INFO, &UserInfo::from(payload)).map_err(
            |message| IsapiError::Request {
                operation: operation.name(),
                message,
            },
        )?;

        info!(
            employee_no = %payload.external_id,
            name = %payload.display_name,
            end_time = %payload.validity.not_after(),
            "create_or_update_user"
        );

        let spec = RequestSpec::new(operation, config.wire_format).with_body(body);
        let exchange = self.exchange(&config, spec).await?;

        debug!(status = exchange.status, "create_or_update_user acknowledged");
        Ok(StatusReply {
            status_code: exchange.status,
        })
    }

    async fn delete_user(&self, external_id: &ExternalId) -> Result<StatusReply> {
        let operation = Operation::DeleteUser;
        if external_id.is_empty() {
            return Err(IsapiError::InvalidPayload {
                operation: operation.name(),
                message: "externalId is required".to_string(),
            });
        }

        let config = self.config.snapshot();
        info!(employee_no = %external_id, "delete_user");

        let spec = RequestSpec::new(operation, config.wire_format)
            .with_query("employeeNo", external_id.as_str());
        let exchange = self.exchange(&config, spec).await?;

        debug!(status = exchange.status, "delete_user acknowledged");
        Ok(StatusReply {
            status_code: exchange.status,
        })
    }

    async fn open_door(&self, door_no: Option<u32>) -> Result<StatusReply> {
        let operation = Operation::OpenDoor;
        let config = self.config.snapshot();
        let door = door_no.unwrap_or(config.door_no);

        let body = wire::encode(config.wire_format, REMOTE_CONTROL_DOOR, &RemoteControlDoor::open())
            .map_err(|message| IsapiError::Request {
                operation: operation.name(),
                message,
            })?;

        info!(door, "open_door");

        let spec = RequestSpec::new(operation, config.wire_format)
            .with_path(format!("{}/{}", operation.endpoint(), door))
            .with_body(body);
        let exchange = self.exchange(&config, spec).await?;

        debug!(status = exchange.status, "open_door acknowledged");
        Ok(StatusReply {
            status_code: exchange.status,
        })
    }

    async fn device_info(&self) -> Result<DeviceInfo> {
        let operation = Operation::DeviceInfo;
        let config = self.config.snapshot();

        debug!("device_info");
        let spec = RequestSpec::new(operation, config.wire_format);
        let exchange = self.exchange(&config, spec).await?;

        let info = DeviceInfo::from_body(&exchange.body);
        info!(
            model = info.model.as_deref().unwrap_or("?"),
            firmware = info.firmware_version.as_deref().unwrap_or("?"),
            "device_info ok"
        );
        Ok(info)
    }

    async fn search_events(&self, query: &EventQuery) -> Result<EventPage> {
        let operation = Operation::SearchEvents;
        let config = self.config.snapshot();

        // this endpoint only speaks JSON
        let body = wire::encode(WireFormat::Json, ACS_EVENT_COND, &query.to_condition()).map_err(
            |message| IsapiError::Request {
                operation: operation.name(),
                message,
            },
        )?;

        debug!(?query, "search_events");
        let spec = RequestSpec::new(operation, WireFormat::Json).with_body(body);
        let exchange = self.exchange(&config, spec).await?;

        let result: Option<AcsEvent> = wire::decode(WireFormat::Json, ACS_EVENT, &exchange.body)
            .map_err(|message| IsapiError::Parse {
                operation: operation.name(),
                message,
            })?;

        let page = result.map(EventPage::from).ok_or_else(|| IsapiError::Parse {
            operation: operation.name(),
            message: format!("missing {ACS_EVENT} element"),
        })?;

        debug!(total = page.total_matches, returned = page.events.len(), "search_events ok");
        Ok(page)
    }
}
