//! Device sync for gym memberships
//!
//! Keeps an access-control terminal in step with the local membership store.
//! The store commits first; this crate then replicates the change and reports
//! how it went as a [`SyncOutcome`] value. A terminal that is off, slow or
//! misconfigured shows up as a `Failed` outcome, never as an error the caller
//! has to handle, and never undoes the local write.
//!
//! - [`DeviceAdapter`]: one verb per lifecycle action, failure isolation, skip switch
//! - [`MemberSync`]: picks the verb for a [`MembershipEvent`] and builds the payload
//! - [`MemberStore`]: read seam onto the source of truth
//!
//! ```rust,no_run
//! use device_sync::{DeviceAdapter, MemberSync, MembershipEvent, MembershipRecord, MembershipType, MemberId};
//! use isapi_client::SharedConfig;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SharedConfig::from_env()?;
//! let sync = MemberSync::new(DeviceAdapter::connect(config));
//!
//! let record = MembershipRecord::new(
//!     Some(MemberId::new(42)),
//!     "Jane Doe",
//!     MembershipType::Short,
//!     chrono::NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
//! );
//! let outcome = sync.sync_record(MembershipEvent::Created, &record).await;
//! if let Some(notice) = outcome.operator_notice(MembershipEvent::Created) {
//!     eprintln!("{notice}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod logging;
pub mod member;
pub mod orchestrator;
pub mod outcome;
pub mod store;

pub use adapter::DeviceAdapter;
pub use member::{MemberId, MemberStatus, MembershipRecord, MembershipType, PayloadError};
pub use orchestrator::{MemberSync, MembershipEvent};
pub use outcome::{DeviceResponse, FailureKind, SyncFailure, SyncOutcome};
pub use store::{InMemoryStore, MemberStore, StoreError};
