//! Verb-level device API that turns every failure into a [`SyncOutcome`]

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use isapi_client::{
    DeviceTransport, DeviceUserPayload, EventQuery, ExternalId, IsapiClient, IsapiError,
    SharedConfig,
};
use tracing::{debug, error, info, warn};

use crate::outcome::{DeviceResponse, FailureKind, SyncOutcome};

/// Device adapter
///
/// Each verb corresponds to one membership lifecycle action and resolves to a
/// [`SyncOutcome`]. No verb returns an error or lets a panic escape, so the
/// caller's already-committed local write is never affected by the terminal
/// being off, misconfigured or slow.
///
/// The disablement switch is checked before anything else: when sync is
/// disabled every verb returns [`SyncOutcome::Skipped`] without validating its
/// input or touching the network.
///
/// Renewal never deletes. Deleting a user on the terminal destroys its enrolled
/// fingerprints, so [`DeviceAdapter::renew_membership`] only upserts the
/// record with the extended validity window.
#[derive(Debug, Clone)]
pub struct DeviceAdapter<T = IsapiClient> {
    transport: T,
    config: SharedConfig,
}

impl DeviceAdapter<IsapiClient> {
    /// Adapter over a real HTTP client sharing `config`
    pub fn connect(config: SharedConfig) -> Self {
        Self::new(IsapiClient::new(config.clone()), config)
    }
}

impl<T: DeviceTransport> DeviceAdapter<T> {
    pub fn new(transport: T, config: SharedConfig) -> Self {
        if config.sync_disabled() {
            warn!("device sync is disabled; every device call will be skipped");
        }
        Self { transport, config }
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_sync_disabled(&self) -> bool {
        self.config.sync_disabled()
    }

    /// Provision a new member on the terminal
    pub async fn add_user(&self, payload: &DeviceUserPayload) -> SyncOutcome {
        self.upsert("add_user", payload).await
    }

    /// Push profile changes; enrolled fingerprints stay bound to the external id
    pub async fn edit_user(&self, payload: &DeviceUserPayload) -> SyncOutcome {
        self.upsert("edit_user", payload).await
    }

    /// Extend access by upserting the record with the new `notAfter`
    pub async fn renew_membership(&self, payload: &DeviceUserPayload) -> SyncOutcome {
        self.upsert("renew_membership", payload).await
    }

    /// Remove the user and its biometric templates from the terminal. Irreversible.
    pub async fn delete_user(&self, external_id: &ExternalId) -> SyncOutcome {
        if self.is_sync_disabled() {
            return SyncOutcome::skipped_disabled();
        }
        if external_id.is_empty() {
            return invalid_payload("delete_user", "externalId is required");
        }

        info!(employee_no = %external_id, "delete_user");
        self.guarded("delete_user", || self.transport.delete_user(external_id))
            .await
    }

    /// Manual remote unlock; `None` opens the configured default door
    pub async fn open_door(&self, door_no: Option<u32>) -> SyncOutcome {
        if self.is_sync_disabled() {
            return SyncOutcome::skipped_disabled();
        }

        info!(door_no = ?door_no, "open_door");
        self.guarded("open_door", || self.transport.open_door(door_no))
            .await
    }

    /// Connectivity health check
    pub async fn device_status(&self) -> SyncOutcome {
        if self.is_sync_disabled() {
            return SyncOutcome::skipped_disabled();
        }

        info!("device_status");
        self.guarded("device_status", || self.transport.device_info())
            .await
    }

    /// Read back the attendance the terminal logged on its own
    pub async fn attendance_events(&self, query: &EventQuery) -> SyncOutcome {
        if self.is_sync_disabled() {
            return SyncOutcome::skipped_disabled();
        }

        info!(start = ?query.start, end = ?query.end, limit = query.max_results, "attendance_events");
        self.guarded("attendance_events", || self.transport.search_events(query))
            .await
    }

    async fn upsert(&self, verb: &'static str, payload: &DeviceUserPayload) -> SyncOutcome {
        if self.is_sync_disabled() {
            return SyncOutcome::skipped_disabled();
        }
        if payload.external_id.is_empty() {
            return invalid_payload(verb, "externalId is required");
        }

        info!(
            employee_no = %payload.external_id,
            not_after = %payload.validity.not_after(),
            "{verb}"
        );
        self.guarded(verb, || self.transport.create_or_update_user(payload))
            .await
    }

    /// Run a device call with panic isolation and the configured retry policy
    async fn guarded<F, Fut, R>(&self, verb: &'static str, call: F) -> SyncOutcome
    where
        F: Fn() -> Fut,
        Fut: Future<Output = isapi_client::Result<R>>,
        R: Into<DeviceResponse>,
    {
        let retry = self.config.snapshot().retry;
        let mut attempt = 0;

        loop {
            let result = AssertUnwindSafe(call()).catch_unwind().await;

            let err = match result {
                Ok(Ok(response)) => {
                    debug!(verb, attempt, "device call succeeded");
                    return SyncOutcome::Synced(response.into());
                }
                Ok(Err(err)) => err,
                Err(panic) => {
                    let message = format!("{verb}: device call panicked: {}", panic_message(&*panic));
                    error!("{message}");
                    return SyncOutcome::failed(FailureKind::Internal, message);
                }
            };

            if err.is_transient() && attempt < retry.max_retries {
                attempt += 1;
                let delay = retry.delay_for_attempt(attempt);
                warn!(verb, attempt, delay_ms = delay.as_millis() as u64, "{err}; retrying");
                tokio::time::sleep(delay).await;
                continue;
            }

            return report(verb, &err);
        }
    }
}

fn report(verb: &'static str, err: &IsapiError) -> SyncOutcome {
    error!(verb, status = ?err.status(), "{err}");
    SyncOutcome::from(err)
}

fn invalid_payload(verb: &'static str, message: &str) -> SyncOutcome {
    let message = format!("{verb}: invalid payload: {message}");
    warn!("{message}");
    SyncOutcome::failed(FailureKind::InvalidPayload, message)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
