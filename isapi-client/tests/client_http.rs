//! HTTP-level tests for the ISAPI client against a scripted server
//!
//! These tests check the bytes on the wire (method, path, query, headers and
//! body) and how the client classifies device answers and transport failures.

use std::net::TcpListener;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use isapi_client::{
    DeviceConfig, DeviceTransport, DeviceUserPayload, EventQuery, ExternalId, IsapiClient,
    IsapiError, SharedConfig, UnreachableCause, Validity, WireFormat,
};
use mockito::{Matcher, Server, ServerGuard};
use rstest::rstest;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn jane() -> DeviceUserPayload {
    DeviceUserPayload::new(
        42,
        "Jane Doe",
        Validity::for_window(date(2025, 1, 10), date(2025, 3, 1)),
    )
}

fn port_of(server: &ServerGuard) -> u16 {
    let host = server.host_with_port();
    host.rsplit(':').next().unwrap().parse().unwrap()
}

fn client_for(server: &ServerGuard, format: WireFormat) -> (IsapiClient, SharedConfig) {
    let config = SharedConfig::new(
        DeviceConfig::new()
            .with_device("127.0.0.1", port_of(server))
            .with_credentials("admin", "secret")
            .with_wire_format(format),
    );
    (IsapiClient::new(config.clone()), config)
}

const OK_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ResponseStatus><statusCode>1</statusCode><statusString>OK</statusString><subStatusCode>ok</subStatusCode></ResponseStatus>"#;

#[tokio::test]
async fn test_upsert_sends_xml_user_record() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/ISAPI/AccessControl/UserInfo/Record")
        .match_header("authorization", "Basic YWRtaW46c2VjcmV0")
        .match_header("content-type", "application/xml")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("<employeeNo>42</employeeNo>".to_string()),
            Matcher::Regex("<name>Jane Doe</name>".to_string()),
            Matcher::Regex("<enable>true</enable>".to_string()),
            Matcher::Regex("<beginTime>2025-01-10T00:00:00</beginTime>".to_string()),
            Matcher::Regex("<endTime>2025-03-01T23:59:59</endTime>".to_string()),
        ]))
        .with_status(200)
        .with_body(OK_XML)
        .create_async()
        .await;

    let (client, _) = client_for(&server, WireFormat::Xml);
    let reply = client.create_or_update_user(&jane()).await.unwrap();

    assert_eq!(reply.status_code, 200);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_upsert_sends_json_with_format_query() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/ISAPI/AccessControl/UserInfo/Record")
        .match_query(Matcher::UrlEncoded("format".into(), "json".into()))
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "UserInfo": {
                "employeeNo": "42",
                "userType": "normal",
                "Valid": {"enable": true, "endTime": "2025-03-01T23:59:59"}
            }
        })))
        .with_status(200)
        .with_body(r#"{"statusCode":1,"statusString":"OK"}"#)
        .create_async()
        .await;

    let (client, _) = client_for(&server, WireFormat::Json);
    client.create_or_update_user(&jane()).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_delete_passes_employee_no_in_query() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("DELETE", "/ISAPI/AccessControl/UserInfo/Record")
        .match_query(Matcher::UrlEncoded("employeeNo".into(), "42".into()))
        .with_status(200)
        .with_body(OK_XML)
        .create_async()
        .await;

    let (client, _) = client_for(&server, WireFormat::Xml);
    client.delete_user(&ExternalId::from(42)).await.unwrap();

    mock.assert_async().await;
}

#[rstest]
#[case(404, "<ResponseStatus><statusString>User not found</statusString></ResponseStatus>", Some("User not found"))]
#[case(400, r#"{"statusCode":6,"subStatusCode":"badParameters"}"#, Some("badParameters"))]
#[case(502, "Bad Gateway", None)]
#[tokio::test]
async fn test_non_success_is_rejected_with_vendor_text(
    #[case] status: usize,
    #[case] body: &str,
    #[case] detail: Option<&str>,
) {
    let mut server = Server::new_async().await;
    server
        .mock("DELETE", "/ISAPI/AccessControl/UserInfo/Record")
        .match_query(Matcher::Any)
        .with_status(status)
        .with_body(body)
        .create_async()
        .await;

    let (client, _) = client_for(&server, WireFormat::Xml);
    let err = client.delete_user(&ExternalId::from(999)).await.unwrap_err();

    match &err {
        IsapiError::Rejected {
            operation,
            status: got,
            detail: got_detail,
        } => {
            assert_eq!(*operation, "delete_user");
            assert_eq!(*got as usize, status);
            assert_eq!(got_detail.as_deref(), detail);
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(err.to_string().starts_with("delete_user: device rejected the request"));
    if let Some(text) = detail {
        assert!(err.to_string().contains(text));
    }
}

#[tokio::test]
async fn test_open_door_uses_configured_default() {
    let mut server = Server::new_async().await;
    let door_two = server
        .mock("PUT", "/ISAPI/AccessControl/RemoteControl/door/2")
        .match_body(Matcher::Regex("<cmd>open</cmd>".to_string()))
        .with_status(200)
        .with_body(OK_XML)
        .create_async()
        .await;
    let door_three = server
        .mock("PUT", "/ISAPI/AccessControl/RemoteControl/door/3")
        .with_status(200)
        .with_body(OK_XML)
        .create_async()
        .await;

    let (client, config) = client_for(&server, WireFormat::Xml);
    config.update(|c| c.door_no = 2);

    client.open_door(None).await.unwrap();
    client.open_door(Some(3)).await.unwrap();

    door_two.assert_async().await;
    door_three.assert_async().await;
}

#[tokio::test]
async fn test_device_info_reads_identity() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/ISAPI/System/deviceInfo")
        .with_status(200)
        .with_header("content-type", "application/xml")
        .with_body(
            "<DeviceInfo><deviceName>Front Door</deviceName><model>DS-K1T8003EF</model>\
             <firmwareVersion>V1.4.0</firmwareVersion></DeviceInfo>",
        )
        .create_async()
        .await;

    let (client, _) = client_for(&server, WireFormat::Xml);
    let info = client.device_info().await.unwrap();

    assert_eq!(info.device_name.as_deref(), Some("Front Door"));
    assert_eq!(info.model.as_deref(), Some("DS-K1T8003EF"));
    assert!(info.serial_number.is_none());
}

#[tokio::test]
async fn test_search_events_is_always_json() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/ISAPI/AccessControl/AcsEvent")
        .match_query(Matcher::UrlEncoded("format".into(), "json".into()))
        .match_body(Matcher::PartialJson(serde_json::json!({
            "AcsEventCond": {"maxResults": 10, "startTime": "2025-01-10T00:00:00"}
        })))
        .with_status(200)
        .with_body(
            r#"{"AcsEvent":{"searchID":"x","totalMatches":1,"numOfMatches":1,"InfoList":[
                {"serialNo":"1","employeeNoString":"42","name":"Jane Doe","time":"2025-01-10T07:15:00","doorNo":1}
            ]}}"#,
        )
        .create_async()
        .await;

    // XML configured, JSON sent anyway
    let (client, _) = client_for(&server, WireFormat::Xml);
    let query = EventQuery::between(
        date(2025, 1, 10).and_hms_opt(0, 0, 0).unwrap(),
        date(2025, 1, 10).and_hms_opt(23, 59, 59).unwrap(),
    )
    .with_limit(10);
    let page = client.search_events(&query).await.unwrap();

    mock.assert_async().await;
    assert_eq!(page.total_matches, 1);
    assert_eq!(page.events[0].external_id.as_str(), "42");
    assert_eq!(page.events[0].door_no, 1);
}

#[tokio::test]
async fn test_search_events_unreadable_body_is_parse_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/ISAPI/AccessControl/AcsEvent")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("<html>login</html>")
        .create_async()
        .await;

    let (client, _) = client_for(&server, WireFormat::Json);
    let err = client.search_events(&EventQuery::default()).await.unwrap_err();

    assert!(matches!(err, IsapiError::Parse { operation: "search_events", .. }));
}

#[tokio::test]
async fn test_empty_external_id_sends_nothing() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let (client, _) = client_for(&server, WireFormat::Xml);
    let payload = DeviceUserPayload::new(
        "  ",
        "Nobody",
        Validity::for_window(date(2025, 1, 1), date(2025, 2, 1)),
    );
    let err = client.create_or_update_user(&payload).await.unwrap_err();

    assert!(matches!(err, IsapiError::InvalidPayload { .. }));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_silent_device_times_out() {
    // Accepted by the kernel backlog, never answered
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let config = SharedConfig::new(
        DeviceConfig::new()
            .with_device("127.0.0.1", port)
            .with_timeout(Duration::from_millis(300)),
    );
    let client = IsapiClient::new(config);

    let started = Instant::now();
    let err = client.device_info().await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    match err {
        IsapiError::Unreachable {
            operation,
            cause: UnreachableCause::TimedOut(timeout),
        } => {
            assert_eq!(operation, "device_info");
            assert_eq!(timeout, Duration::from_millis(300));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    drop(listener);
}

#[tokio::test]
async fn test_refused_connection_is_unreachable() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let config = SharedConfig::new(DeviceConfig::new().with_device("127.0.0.1", port));
    let client = IsapiClient::new(config);

    let err = client.open_door(None).await.unwrap_err();
    assert!(err.is_transient());
    assert!(matches!(
        err,
        IsapiError::Unreachable {
            cause: UnreachableCause::NoResponse(_),
            ..
        }
    ));
    assert!(err.to_string().starts_with("open_door: device unreachable"));
}

#[tokio::test]
async fn test_config_changes_apply_to_next_call() {
    let mut first = Server::new_async().await;
    let mut second = Server::new_async().await;
    let old = first
        .mock("GET", "/ISAPI/System/deviceInfo")
        .with_body("<DeviceInfo><deviceName>Old</deviceName></DeviceInfo>")
        .create_async()
        .await;
    let new = second
        .mock("GET", "/ISAPI/System/deviceInfo")
        .with_body("<DeviceInfo><deviceName>New</deviceName></DeviceInfo>")
        .create_async()
        .await;

    let (client, config) = client_for(&first, WireFormat::Xml);
    assert_eq!(client.device_info().await.unwrap().device_name.as_deref(), Some("Old"));

    let port = port_of(&second);
    config.update(|c| c.port = port);
    assert_eq!(client.device_info().await.unwrap().device_name.as_deref(), Some("New"));

    old.assert_async().await;
    new.assert_async().await;
}
