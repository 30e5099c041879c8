//! Membership store seam
//!
//! The store is the source of truth. Sync only reads from it, after the local
//! write has been committed.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

use crate::member::{MemberId, MembershipRecord};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("membership store unavailable: {0}")]
    Unavailable(String),

    #[error("membership store query failed: {0}")]
    Query(String),
}

/// Read access to membership records
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// Current record for `id`, `None` when it does not exist
    async fn member(&self, id: MemberId) -> Result<Option<MembershipRecord>, StoreError>;
}

#[derive(Debug, Clone)]
struct Entry {
    record: MembershipRecord,
    retired: bool,
}

/// Store kept in memory, for tests and the CLI
///
/// Retiring a member is a soft delete: the record stays readable so it can
/// still be purged from the terminal afterwards.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<MemberId, Entry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist a new record, assigning the next id when it has none
    pub fn insert(&self, mut record: MembershipRecord) -> MembershipRecord {
        let mut entries = self.entries.write();
        let id = record.id.unwrap_or_else(|| {
            let next = entries.keys().next_back().map_or(1, |last| last.value() + 1);
            MemberId::new(next)
        });
        record.id = Some(id);
        entries.insert(
            id,
            Entry {
                record: record.clone(),
                retired: false,
            },
        );
        record
    }

    /// Replace the stored record; `None` when it does not exist
    pub fn update(&self, record: MembershipRecord) -> Option<MembershipRecord> {
        let id = record.id?;
        let mut entries = self.entries.write();
        let entry = entries.get_mut(&id)?;
        entry.record = record.clone();
        Some(record)
    }

    /// Flag the member as deleted locally; returns whether it existed
    pub fn retire(&self, id: MemberId) -> bool {
        match self.entries.write().get_mut(&id) {
            Some(entry) => {
                entry.retired = true;
                true
            }
            None => false,
        }
    }

    pub fn is_retired(&self, id: MemberId) -> bool {
        self.entries.read().get(&id).map_or(false, |entry| entry.retired)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl MemberStore for InMemoryStore {
    async fn member(&self, id: MemberId) -> Result<Option<MembershipRecord>, StoreError> {
        Ok(self.entries.read().get(&id).map(|entry| entry.record.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::MembershipType;
    use chrono::NaiveDate;

    fn record(name: &str) -> MembershipRecord {
        MembershipRecord::new(
            None,
            name,
            MembershipType::Short,
            NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_insert_assigns_ids() {
        let store = InMemoryStore::new();
        let first = store.insert(record("Jane"));
        let second = store.insert(record("Sam"));

        assert_eq!(first.id, Some(MemberId::new(1)));
        assert_eq!(second.id, Some(MemberId::new(2)));
        assert_eq!(
            store.member(MemberId::new(2)).await.unwrap().unwrap().full_name,
            "Sam"
        );
        assert!(store.member(MemberId::new(3)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retire_keeps_record_readable() {
        let store = InMemoryStore::new();
        let jane = store.insert(record("Jane"));
        let id = jane.id.unwrap();

        assert!(store.retire(id));
        assert!(store.is_retired(id));
        assert!(store.member(id).await.unwrap().is_some());
        assert!(!store.retire(MemberId::new(99)));
    }

    #[test]
    fn test_update_requires_existing_record() {
        let store = InMemoryStore::new();
        assert!(store.update(record("Ghost")).is_none());

        let jane = store.insert(record("Jane"));
        let renamed = MembershipRecord {
            full_name: "Jane Doe".to_string(),
            ..jane
        };
        assert!(store.update(renamed).is_some());
        assert_eq!(store.len(), 1);
    }
}
