//! HTTP server emulating the terminal's ISAPI endpoints.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::{Ipv4Addr, SocketAddr};

use bytes::Bytes;
use chrono::NaiveDateTime;
use isapi_client::wire::{
    self, AcsEventCond, RemoteControlDoor, ResponseStatus, UserInfo, ACS_EVENT, ACS_EVENT_COND,
    DEVICE_INFO, REMOTE_CONTROL_DOOR, RESPONSE_STATUS, USER_INFO,
};
use isapi_client::{DeviceConfig, WireFormat};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use warp::http::{Method, StatusCode};
use warp::path::FullPath;
use warp::reply::Response;
use warp::{Filter, Reply};

use crate::error::{Fault, MockError};
use crate::state::MockState;

const ISAPI_PREFIX: &str = "/ISAPI";
const SIMULATE_SCAN: &str = "/simulate-scan";

/// A running mock terminal.
///
/// The server binds immediately and serves until [`MockDevice::shutdown`] is
/// called. All state lives in the [`MockState`] returned by
/// [`MockDevice::state`].
///
/// # Example
///
/// ```no_run
/// use mock_device::MockDevice;
///
/// #[tokio::main]
/// async fn main() {
///     let device = MockDevice::start_local().await.expect("mock device");
///     println!("ISAPI at {}/ISAPI", device.base_url());
///
///     // ... drive a client against device.device_config() ...
///
///     assert_eq!(device.state().user_count(), 0);
///     device.shutdown().await;
/// }
/// ```
#[derive(Debug)]
pub struct MockDevice {
    addr: SocketAddr,
    base_url: String,
    state: MockState,
    shutdown_tx: Option<mpsc::Sender<()>>,
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl MockDevice {
    /// Bind to `addr` (port 0 picks a free port) with fresh state
    pub async fn start(addr: SocketAddr) -> Result<Self, MockError> {
        Self::with_state(addr, MockState::new()).await
    }

    /// Bind to a free port on the loopback interface
    pub async fn start_local() -> Result<Self, MockError> {
        Self::start(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).await
    }

    /// Bind to `addr` serving the given state
    pub async fn with_state(addr: SocketAddr, state: MockState) -> Result<Self, MockError> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let (bound, server) = warp::serve(routes(state.clone()))
            .try_bind_with_graceful_shutdown(addr, async move {
                shutdown_rx.recv().await;
            })
            .map_err(|e| MockError::Bind {
                addr,
                message: e.to_string(),
            })?;

        let server_handle = tokio::spawn(server);
        info!(addr = %bound, "mock device listening");

        Ok(Self {
            addr: bound,
            base_url: format!("http://{bound}"),
            state,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// `http://host:port`, without the `/ISAPI` prefix
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn state(&self) -> &MockState {
        &self.state
    }

    /// Client configuration pointing at this mock
    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig::new().with_device(self.addr.ip().to_string(), self.addr.port())
    }

    /// Stop accepting connections and wait for in-flight requests to finish
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.server_handle.take() {
            let _ = handle.await;
        }
        info!(addr = %self.addr, "mock device stopped");
    }
}

struct MockRequest {
    method: Method,
    path: String,
    query: HashMap<String, String>,
    format: WireFormat,
    authorization: Option<String>,
    body: Bytes,
}

impl MockRequest {
    fn body_text(&self) -> Result<&str, Fault> {
        std::str::from_utf8(&self.body).map_err(|_| Fault::BadRequest("body is not UTF-8".to_string()))
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, root: &str) -> Result<T, Fault> {
        wire::decode(self.format, root, self.body_text()?)
            .map_err(Fault::BadRequest)?
            .ok_or_else(|| Fault::BadRequest(format!("{root} is required")))
    }
}

fn routes(state: MockState) -> impl Filter<Extract = (Response,), Error = Infallible> + Clone {
    warp::method()
        .and(warp::path::full())
        .and(warp::query::<HashMap<String, String>>())
        .and(warp::header::optional::<String>("content-type"))
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::bytes())
        .and(warp::any().map(move || state.clone()))
        .then(
            |method: Method,
             path: FullPath,
             query: HashMap<String, String>,
             content_type: Option<String>,
             authorization: Option<String>,
             body: Bytes,
             state: MockState| async move {
                let json = query.get("format").map_or(false, |f| f.eq_ignore_ascii_case("json"))
                    || content_type.map_or(false, |ct| ct.contains("json"));
                let request = MockRequest {
                    method,
                    path: path.as_str().to_string(),
                    query,
                    format: if json { WireFormat::Json } else { WireFormat::Xml },
                    authorization,
                    body,
                };
                handle(state, request).await
            },
        )
        .recover(handle_rejection)
        .unify()
}

async fn handle(state: MockState, request: MockRequest) -> Response {
    state.record_request(request.method.as_str(), &request.path);

    let latency = state.latency();
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }

    let format = request.format;
    let path = request.path.clone();
    match dispatch(&state, &request) {
        Ok(response) => response,
        Err(fault) => {
            warn!(method = %request.method, path = %path, status = fault.status().as_u16(), "{fault}");
            fault_reply(format, &path, &fault)
        }
    }
}

fn dispatch(state: &MockState, request: &MockRequest) -> Result<Response, Fault> {
    let path = request.path.as_str();

    if path == SIMULATE_SCAN && request.method == Method::POST {
        return simulate_scan(state, request);
    }

    let route = path
        .strip_prefix(ISAPI_PREFIX)
        .ok_or_else(|| Fault::NotFound("Invalid URL".to_string()))?;
    state.authorize(request.authorization.as_deref())?;

    let segments: Vec<&str> = route.trim_matches('/').split('/').collect();
    match (&request.method, segments.as_slice()) {
        (&Method::GET, ["System", "deviceInfo"]) => {
            debug!("GET deviceInfo");
            encoded(request.format, DEVICE_INFO, &state.identity())
        }
        (&Method::POST, ["AccessControl", "UserInfo", "Record"]) => {
            let user = state.upsert_user(request.decode::<UserInfo>(USER_INFO)?)?;
            info!(
                employee_no = %user.employee_no,
                name = user.name.as_deref().unwrap_or("?"),
                until = user.end_time().unwrap_or("?"),
                "user record stored"
            );
            Ok(ok_reply(request.format, path))
        }
        (&Method::PUT, ["AccessControl", "UserInfo", "Modify"]) => {
            let user = state.modify_user(request.decode::<UserInfo>(USER_INFO)?)?;
            info!(employee_no = %user.employee_no, "user record modified");
            Ok(ok_reply(request.format, path))
        }
        (&Method::DELETE, ["AccessControl", "UserInfo", "Record"]) => {
            let employee_no = request
                .query
                .get("employeeNo")
                .ok_or_else(|| Fault::BadRequest("Missing employeeNo".to_string()))?;
            state.delete_user(employee_no)?;
            info!(employee_no = %employee_no, "user record deleted");
            Ok(ok_reply(request.format, path))
        }
        (&Method::PUT, ["AccessControl", "RemoteControl", "door", door]) => {
            let door_no: u32 = door
                .parse()
                .map_err(|_| Fault::BadRequest(format!("invalid door number {door:?}")))?;
            if !request.body.is_empty() {
                let command = request.decode::<RemoteControlDoor>(REMOTE_CONTROL_DOOR)?;
                if command.cmd != "open" {
                    return Err(Fault::BadRequest(format!("unsupported command {:?}", command.cmd)));
                }
            }
            state.open_door(door_no)?;
            info!(door_no, "door opened");
            Ok(ok_reply(request.format, path))
        }
        (&Method::POST, ["AccessControl", "AcsEvent"]) => {
            let cond = request.decode::<AcsEventCond>(ACS_EVENT_COND)?;
            let result = state.search_events(&cond);
            debug!(returned = result.num_of_matches, total = result.total_matches, "event search");
            encoded(request.format, ACS_EVENT, &result)
        }
        _ => Err(Fault::NotFound("Invalid URL".to_string())),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanRequest {
    employee_no: Option<serde_json::Value>,
    time: Option<NaiveDateTime>,
}

fn simulate_scan(state: &MockState, request: &MockRequest) -> Result<Response, Fault> {
    let scan: ScanRequest = serde_json::from_slice(&request.body)
        .map_err(|e| Fault::BadRequest(format!("invalid scan request: {e}")))?;

    let employee_no = match scan.employee_no {
        Some(serde_json::Value::String(no)) => no,
        Some(serde_json::Value::Number(no)) => no.to_string(),
        _ => String::new(),
    };

    let event = state.record_scan(&employee_no, scan.time)?;
    info!(employee_no = %event.employee_no_string, time = %event.time, "finger presented");

    let body = serde_json::json!({
        "statusCode": 1,
        "statusString": "OK",
        "event": event,
    });
    Ok(with_content_type(body.to_string(), WireFormat::Json, StatusCode::OK))
}

fn encoded<T: serde::Serialize>(format: WireFormat, root: &str, value: &T) -> Result<Response, Fault> {
    match wire::encode(format, root, value) {
        Ok(body) => Ok(with_content_type(body, format, StatusCode::OK)),
        Err(message) => Ok(warp::reply::with_status(message, StatusCode::INTERNAL_SERVER_ERROR).into_response()),
    }
}

fn ok_reply(format: WireFormat, path: &str) -> Response {
    status_reply(format, StatusCode::OK, &ResponseStatus::ok().with_request_url(path))
}

fn fault_reply(format: WireFormat, path: &str, fault: &Fault) -> Response {
    let status = ResponseStatus::error(fault.status_code(), fault.to_string(), fault.sub_status())
        .with_request_url(path);
    status_reply(format, fault.status(), &status)
}

/// `ResponseStatus` is a bare object in JSON, a root element in XML
fn status_reply(format: WireFormat, code: StatusCode, status: &ResponseStatus) -> Response {
    let body = match format {
        WireFormat::Xml => wire::encode(format, RESPONSE_STATUS, status),
        WireFormat::Json => serde_json::to_string(status).map_err(|e| e.to_string()),
    };

    match body {
        Ok(body) => with_content_type(body, format, code),
        Err(message) => warp::reply::with_status(message, StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

fn with_content_type(body: String, format: WireFormat, code: StatusCode) -> Response {
    warp::reply::with_status(
        warp::reply::with_header(body, "content-type", format.content_type()),
        code,
    )
    .into_response()
}

/// Turn filter rejections into vendor-shaped XML error answers.
async fn handle_rejection(err: warp::Rejection) -> Result<Response, Infallible> {
    let fault = if err.is_not_found() {
        Fault::NotFound("Invalid URL".to_string())
    } else {
        Fault::BadRequest(format!("{err:?}"))
    };
    Ok(fault_reply(WireFormat::Xml, "", &fault))
}
