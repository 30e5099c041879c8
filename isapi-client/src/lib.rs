//! ISAPI client for fingerprint access-control terminals
//!
//! This crate talks HTTP to the terminal's vendor API: user upsert and
//! deletion, remote door release, identity probe and attendance log search.
//! Requests are sent as XML by default, or as JSON with `?format=json`.
//!
//! Connection settings live in a [`SharedConfig`] that every call snapshots, so
//! an operator can re-point the client without rebuilding it:
//!
//! ```rust,no_run
//! use isapi_client::{DeviceConfig, DeviceTransport, IsapiClient, SharedConfig};
//!
//! # async fn run() -> isapi_client::Result<()> {
//! let config = SharedConfig::new(
//!     DeviceConfig::new()
//!         .with_device("192.168.1.64", 80)
//!         .with_credentials("admin", "secret"),
//! );
//! let client = IsapiClient::new(config.clone());
//!
//! let info = client.device_info().await?;
//! println!("connected to {:?}", info.model);
//!
//! config.update(|c| c.door_no = 2);
//! client.open_door(None).await?; // opens door 2
//! # Ok(())
//! # }
//! ```
//!
//! Every failure is an [`IsapiError`] whose message starts with the operation
//! name and tells a rejecting device apart from an unreachable one.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod payload;
pub mod response;
pub mod wire;

pub use client::{DeviceTransport, IsapiClient, Operation};
pub use config::{DeviceConfig, RetryPolicy, SharedConfig, WireFormat};
pub use error::{ConfigError, IsapiError, Result, UnreachableCause};
pub use events::{AccessEvent, EventPage, EventQuery};
pub use payload::{DeviceUserPayload, ExternalId, Validity};
pub use response::{DeviceInfo, StatusReply};
