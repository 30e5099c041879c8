//! Maps membership lifecycle events onto adapter verbs

use std::fmt;
use std::future::Future;

use isapi_client::{DeviceTransport, DeviceUserPayload, IsapiClient};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::adapter::DeviceAdapter;
use crate::member::{MemberId, MembershipRecord};
use crate::outcome::{FailureKind, SyncOutcome};
use crate::store::MemberStore;

/// Membership change that was just committed locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MembershipEvent {
    /// New member inserted
    Created,
    /// Name, phone, address or photo changed; validity unchanged
    ProfileEdited,
    /// New validity window, status back to active
    Renewed,
    /// Soft-deleted locally; purged from the terminal
    Retired,
}

impl MembershipEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MembershipEvent::Created => "created",
            MembershipEvent::ProfileEdited => "profile-edited",
            MembershipEvent::Renewed => "renewed",
            MembershipEvent::Retired => "retired",
        }
    }
}

impl fmt::Display for MembershipEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Replicates committed membership changes onto the terminal
///
/// | Event           | Adapter verb        |
/// |-----------------|---------------------|
/// | `Created`       | `add_user`          |
/// | `ProfileEdited` | `edit_user`         |
/// | `Renewed`       | `renew_membership`  |
/// | `Retired`       | `delete_user`, through [`MemberSync::purge_member_from_device`] |
///
/// The returned [`SyncOutcome`] is informational: nothing here can undo or
/// block the local write that triggered it.
#[derive(Debug, Clone)]
pub struct MemberSync<T = IsapiClient> {
    adapter: DeviceAdapter<T>,
}

impl<T: DeviceTransport> MemberSync<T> {
    pub fn new(adapter: DeviceAdapter<T>) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &DeviceAdapter<T> {
        &self.adapter
    }

    /// Sync a record the caller already holds (e.g. the row just inserted)
    pub async fn sync_record(&self, event: MembershipEvent, record: &MembershipRecord) -> SyncOutcome {
        if self.adapter.is_sync_disabled() {
            return SyncOutcome::skipped_disabled();
        }

        let outcome = match event {
            MembershipEvent::Created => {
                self.with_payload(record, |payload| async move { self.adapter.add_user(&payload).await })
                    .await
            }
            MembershipEvent::ProfileEdited => {
                self.with_payload(record, |payload| async move { self.adapter.edit_user(&payload).await })
                    .await
            }
            MembershipEvent::Renewed => {
                self.with_payload(record, |payload| async move {
                    self.adapter.renew_membership(&payload).await
                })
                .await
            }
            MembershipEvent::Retired => self.purge_member_from_device(record).await,
        };

        log_outcome(event, record.id, &outcome);
        outcome
    }

    /// Load the current record from `store` and sync it
    pub async fn sync_member<S>(&self, store: &S, event: MembershipEvent, id: MemberId) -> SyncOutcome
    where
        S: MemberStore + ?Sized,
    {
        if self.adapter.is_sync_disabled() {
            return SyncOutcome::skipped_disabled();
        }

        match store.member(id).await {
            Ok(Some(record)) => self.sync_record(event, &record).await,
            Ok(None) => {
                warn!(member_id = %id, %event, "member not found; nothing to sync");
                SyncOutcome::failed(FailureKind::MemberNotFound, format!("member {id} not found"))
            }
            Err(err) => {
                error!(member_id = %id, %event, "{err}");
                SyncOutcome::failed(FailureKind::Store, err.to_string())
            }
        }
    }

    /// Delete the member and its enrolled fingerprints from the terminal
    ///
    /// This is the only path to the device-side delete. It cannot be undone:
    /// the member has to re-enroll if they come back.
    pub async fn purge_member_from_device(&self, record: &MembershipRecord) -> SyncOutcome {
        if self.adapter.is_sync_disabled() {
            return SyncOutcome::skipped_disabled();
        }

        match record.id {
            Some(id) => self.adapter.delete_user(&id.external_id()).await,
            None => invalid_record(record),
        }
    }

    async fn with_payload<F, Fut>(&self, record: &MembershipRecord, verb: F) -> SyncOutcome
    where
        F: FnOnce(DeviceUserPayload) -> Fut,
        Fut: Future<Output = SyncOutcome>,
    {
        match record.to_payload() {
            Ok(payload) => verb(payload).await,
            Err(_) => invalid_record(record),
        }
    }
}

fn invalid_record(record: &MembershipRecord) -> SyncOutcome {
    SyncOutcome::failed(
        FailureKind::InvalidPayload,
        format!("member {:?} has no id; save it before syncing", record.full_name),
    )
}

fn log_outcome(event: MembershipEvent, id: Option<MemberId>, outcome: &SyncOutcome) {
    let member_id = id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string());
    match outcome {
        SyncOutcome::Synced(_) => info!(%member_id, %event, "device sync ok"),
        SyncOutcome::Skipped { reason } => info!(%member_id, %event, reason, "device sync skipped"),
        SyncOutcome::Failed(failure) => error!(
            %member_id,
            %event,
            reason = failure.kind.reason(),
            "device sync FAILED: {}",
            failure.message
        ),
    }
}

impl SyncOutcome {
    /// Non-blocking warning for the operator, `None` unless the sync failed
    pub fn operator_notice(&self, event: MembershipEvent) -> Option<String> {
        let failure = self.failure()?;
        let consequence = match event {
            MembershipEvent::Created => {
                "Member saved locally but not provisioned on the access terminal; \
                 they cannot badge in until re-synced"
            }
            MembershipEvent::ProfileEdited => {
                "Changes saved locally but not pushed to the access terminal"
            }
            MembershipEvent::Renewed => {
                "Renewal saved locally but the access terminal still holds the old expiry; \
                 the member may be refused at the door until re-synced"
            }
            MembershipEvent::Retired => {
                "Member removed locally but still enrolled on the access terminal; \
                 retry the removal or delete them on the device"
            }
        };
        Some(format!("{consequence} ({})", failure.message))
    }
}
