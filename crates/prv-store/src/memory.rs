//! In-memory implementation of the LedgerStore trait.
//!
//! This is primarily for testing. It has the same compare-and-swap
//! semantics as SQLite but keeps everything in a BTreeMap.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use prv_core::{AccessRecord, ChatId, ProfileId, RecordKey};

use crate::error::Result;
use crate::traits::{LedgerStore, WriteOutcome};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<(ProfileId, RecordKey), AccessRecord>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn get_record(
        &self,
        profile: &ProfileId,
        key: &RecordKey,
    ) -> Result<Option<AccessRecord>> {
        let records = self.records.read().unwrap();
        Ok(records.get(&(profile.clone(), key.clone())).cloned())
    }

    async fn put_record(
        &self,
        profile: &ProfileId,
        record: &AccessRecord,
    ) -> Result<WriteOutcome> {
        let mut records = self.records.write().unwrap();
        let map_key = (profile.clone(), record.key.clone());

        let stored_version = records.get(&map_key).map(|r| r.version);
        match stored_version {
            None if record.version == 0 => {}
            Some(v) if v == record.version => {}
            other => {
                return Ok(WriteOutcome::Conflict {
                    stored: other.unwrap_or(0),
                });
            }
        }

        let mut committed = record.clone();
        committed.version = record.version + 1;
        let version = committed.version;
        records.insert(map_key, committed);

        Ok(WriteOutcome::Committed { version })
    }

    async fn list_chat_records(
        &self,
        profile: &ProfileId,
        chat_id: &ChatId,
    ) -> Result<Vec<AccessRecord>> {
        let records = self.records.read().unwrap();
        Ok(records
            .iter()
            .filter(|((p, key), _)| p == profile && &key.chat_id == chat_id)
            .map(|(_, rec)| rec.clone())
            .collect())
    }

    async fn count_records(&self, profile: &ProfileId) -> Result<u64> {
        let records = self.records.read().unwrap();
        Ok(records.keys().filter(|(p, _)| p == profile).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prv_core::FileRef;

    fn key(file: &str) -> RecordKey {
        RecordKey::new(ChatId::from("chat1"), FileRef::from(file))
    }

    fn profile() -> ProfileId {
        ProfileId::from("alice")
    }

    #[tokio::test]
    async fn test_fresh_record_commits_at_version_one() {
        let store = MemoryStore::new();
        let rec = AccessRecord::requested(key("/a.prv"), 100);

        let outcome = store.put_record(&profile(), &rec).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Committed { version: 1 });

        let stored = store
            .get_record(&profile(), &key("/a.prv"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = MemoryStore::new();
        let rec = AccessRecord::requested(key("/a.prv"), 100);
        store.put_record(&profile(), &rec).await.unwrap();

        // Still at version 0: the stored record moved to 1.
        let outcome = store.put_record(&profile(), &rec).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Conflict { stored: 1 });
    }

    #[tokio::test]
    async fn test_records_scoped_per_profile() {
        let store = MemoryStore::new();
        let rec = AccessRecord::requested(key("/a.prv"), 100);
        store.put_record(&profile(), &rec).await.unwrap();

        let other = ProfileId::from("bob");
        assert!(store
            .get_record(&other, &key("/a.prv"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.count_records(&profile()).await.unwrap(), 1);
        assert_eq!(store.count_records(&other).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_chat_records() {
        let store = MemoryStore::new();
        store
            .put_record(&profile(), &AccessRecord::requested(key("/a.prv"), 100))
            .await
            .unwrap();
        store
            .put_record(&profile(), &AccessRecord::requested(key("/b.prv"), 100))
            .await
            .unwrap();
        let other_chat = RecordKey::new(ChatId::from("chat2"), FileRef::from("/c.prv"));
        store
            .put_record(&profile(), &AccessRecord::requested(other_chat, 100))
            .await
            .unwrap();

        let listed = store
            .list_chat_records(&profile(), &ChatId::from("chat1"))
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
    }
}
