//! The access ledger: authoritative records plus per-key serialization.
//!
//! All mutations on a (profile, chat, file) key run under a keyed async
//! mutex, so at most one transition is in flight per record. Reads bypass
//! the locks and see committed snapshots only; lazy expiry is baked into
//! every snapshot handed out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use prv_core::{
    AccessRecord, AccessStatus, ChatId, Clock, Permissions, ProfileId, RecordKey,
};
use prv_store::{LedgerStore, WriteOutcome};

use crate::error::{LedgerError, Result};
use crate::event::{transition, AccessEvent};

type LockKey = (ProfileId, RecordKey);

/// Owns the authoritative access records for every profile.
pub struct AccessLedger<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    locks: StdMutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

impl<S: LedgerStore> AccessLedger<S> {
    /// Build a ledger over a store and a clock.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// The ledger's time source.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn key_lock(&self, profile: &ProfileId, key: &RecordKey) -> Arc<AsyncMutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            // A panic while holding this map lock cannot corrupt the map
            // itself; take the data and move on.
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry((profile.clone(), key.clone()))
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    async fn commit(&self, profile: &ProfileId, record: AccessRecord) -> Result<AccessRecord> {
        match self.store.put_record(profile, &record).await? {
            WriteOutcome::Committed { version } => {
                let mut committed = record;
                committed.version = version;
                info!(
                    key = %committed.key,
                    status = %committed.status,
                    version,
                    "record committed"
                );
                Ok(committed)
            }
            WriteOutcome::Conflict { stored } => {
                warn!(key = %record.key, stored, "commit lost to concurrent writer");
                Err(LedgerError::Conflict {
                    key: record.key,
                })
            }
        }
    }

    /// Create or return the record for a key, starting a fresh cycle on a
    /// terminal one.
    pub async fn request_access(
        &self,
        profile: &ProfileId,
        key: &RecordKey,
    ) -> Result<AccessRecord> {
        let lock = self.key_lock(profile, key);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        match self.store.get_record(profile, key).await? {
            None => {
                let fresh = AccessRecord::requested(key.clone(), now);
                self.commit(profile, fresh).await
            }
            Some(current) => {
                let next = transition(&current, &AccessEvent::Request, now)?;
                if next == current {
                    // Already in flight; nothing to write.
                    return Ok(current.resolved(now));
                }
                self.commit(profile, next).await
            }
        }
    }

    /// Move a `Requested` record to `WaitingOwnerAction`.
    pub async fn mark_waiting(
        &self,
        profile: &ProfileId,
        key: &RecordKey,
    ) -> Result<AccessRecord> {
        self.apply_local(profile, key, &AccessEvent::MarkWaiting).await
    }

    /// Grant access with a duration and permission flags.
    pub async fn record_grant(
        &self,
        profile: &ProfileId,
        key: &RecordKey,
        duration_secs: u64,
        allow_download: bool,
        allow_forward: bool,
    ) -> Result<AccessRecord> {
        self.apply_local(
            profile,
            key,
            &AccessEvent::Grant {
                duration_secs,
                allow_download,
                allow_forward,
            },
        )
        .await
    }

    /// Deny a pending request.
    pub async fn record_denial(
        &self,
        profile: &ProfileId,
        key: &RecordKey,
        status_code: Option<i64>,
    ) -> Result<AccessRecord> {
        self.apply_local(profile, key, &AccessEvent::Deny { status_code })
            .await
    }

    /// Revoke an active grant.
    pub async fn record_revocation(
        &self,
        profile: &ProfileId,
        key: &RecordKey,
    ) -> Result<AccessRecord> {
        self.apply_local(profile, key, &AccessEvent::Revoke).await
    }

    /// Mark a record `Deleted` because the backing file is gone.
    pub async fn record_file_deleted(
        &self,
        profile: &ProfileId,
        key: &RecordKey,
    ) -> Result<AccessRecord> {
        self.apply_local(profile, key, &AccessEvent::FileDeleted).await
    }

    async fn apply_local(
        &self,
        profile: &ProfileId,
        key: &RecordKey,
        event: &AccessEvent,
    ) -> Result<AccessRecord> {
        let lock = self.key_lock(profile, key);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let current = self
            .store
            .get_record(profile, key)
            .await?
            .ok_or_else(|| prv_store::StoreError::NotFound(key.to_string()))?;

        let next = transition(&current, event, now)?;
        self.commit(profile, next).await
    }

    /// Apply a PDU-carried event under the replay guard.
    ///
    /// A PDU whose sequence number is at or below the record's
    /// `last_applied_seq` is a duplicate delivery: the current record is
    /// returned unchanged. A new sequence number whose transition would
    /// move the record backward in the lattice is a reordering and is
    /// rejected as [`LedgerError::Replay`].
    pub async fn apply_pdu(
        &self,
        profile: &ProfileId,
        key: &RecordKey,
        seq: u64,
        event: &AccessEvent,
    ) -> Result<AccessRecord> {
        let lock = self.key_lock(profile, key);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let current = self.store.get_record(profile, key).await?;

        if let Some(ref current) = current {
            if seq <= current.last_applied_seq {
                debug!(
                    key = %key,
                    seq,
                    last_applied = current.last_applied_seq,
                    "duplicate PDU, returning current record"
                );
                return Ok(current.resolved(now));
            }
        }

        let next = match current {
            None => match event {
                // The first access request creates the record implicitly.
                AccessEvent::Request => AccessRecord::requested(key.clone(), now),
                _ => {
                    return Err(prv_store::StoreError::NotFound(key.to_string()).into());
                }
            },
            Some(current) => transition(&current, event, now).map_err(|e| match e {
                LedgerError::InvalidTransition { key, from, event: ev }
                    if from.rank() > event.target_rank() =>
                {
                    warn!(key = %key, from = %from, event = ev, "reordered PDU rejected");
                    LedgerError::Replay { key, from, event: ev }
                }
                other => other,
            })?,
        };

        let mut next = next;
        next.last_applied_seq = seq;
        self.commit(profile, next).await
    }

    /// Read the record for a key, with lazy expiry resolved.
    ///
    /// Returns a synthetic `NotFound` record when nothing is stored; the
    /// synthetic record is never persisted.
    pub async fn query_status(
        &self,
        profile: &ProfileId,
        key: &RecordKey,
    ) -> Result<AccessRecord> {
        let now = self.clock.now();
        match self.store.get_record(profile, key).await? {
            Some(record) => Ok(record.resolved(now)),
            None => Ok(AccessRecord {
                key: key.clone(),
                status: AccessStatus::NotFound,
                status_code: None,
                expiry_time: None,
                permissions: Permissions::default(),
                access_duration: None,
                last_applied_seq: 0,
                version: 0,
                updated_at: now,
            }),
        }
    }

    /// All records under a chat, lazy expiry resolved.
    pub async fn list_chat(
        &self,
        profile: &ProfileId,
        chat_id: &ChatId,
    ) -> Result<Vec<AccessRecord>> {
        let now = self.clock.now();
        let records = self.store.list_chat_records(profile, chat_id).await?;
        Ok(records.into_iter().map(|r| r.resolved(now)).collect())
    }

    /// Mark every record under a chat `Deleted`. Returns how many records
    /// actually changed.
    pub async fn delete_chat(&self, profile: &ProfileId, chat_id: &ChatId) -> Result<u64> {
        let records = self.store.list_chat_records(profile, chat_id).await?;
        let mut affected = 0u64;
        for record in records {
            if record.status == AccessStatus::Deleted {
                continue;
            }
            let key = record.key.clone();
            let lock = self.key_lock(profile, &key);
            let _guard = lock.lock().await;

            // Reload under the lock; the listing snapshot may be stale.
            let Some(current) = self.store.get_record(profile, &key).await? else {
                continue;
            };
            if current.status == AccessStatus::Deleted {
                continue;
            }
            let next = transition(&current, &AccessEvent::FileDeleted, self.clock.now())?;
            self.commit(profile, next).await?;
            affected += 1;
        }
        info!(chat = %chat_id, affected, "chat deleted");
        Ok(affected)
    }
}
