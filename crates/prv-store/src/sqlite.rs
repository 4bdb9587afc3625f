//! SQLite implementation of the LedgerStore trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking. The version
//! compare-and-swap runs inside a single transaction, so a lost race is
//! reported as a conflict and never as a partial write.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use prv_core::{AccessRecord, AccessStatus, ChatId, FileRef, Permissions, ProfileId, RecordKey};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{LedgerStore, WriteOutcome};

/// SQLite-based ledger store.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking to
/// avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (creating if needed) a ledger database at `path` and bring its
    /// schema up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// An in-memory database, for tests.
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn lock_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Database(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
        Some(format!("mutex poisoned: {}", e)),
    ))
}

fn join_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Database(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
        Some(format!("spawn_blocking failed: {}", e)),
    ))
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AccessRecord> {
    let chat_id: String = row.get("chat_id")?;
    let file_ref: String = row.get("file_ref")?;
    let status_str: String = row.get("status")?;

    let status = AccessStatus::from_str(&status_str).map_err(|_| {
        rusqlite::Error::InvalidColumnType(3, "status".into(), rusqlite::types::Type::Text)
    })?;

    let allow_download: Option<i64> = row.get("allow_download")?;
    let allow_forward: Option<i64> = row.get("allow_forward")?;

    Ok(AccessRecord {
        key: RecordKey::new(ChatId::new(chat_id), FileRef::new(file_ref)),
        status,
        status_code: row.get("status_code")?,
        expiry_time: row.get("expiry_time")?,
        permissions: Permissions {
            download: allow_download.map(|v| v != 0),
            forward: allow_forward.map(|v| v != 0),
        },
        access_duration: row
            .get::<_, Option<i64>>("access_duration")?
            .map(|d| d as u64),
        last_applied_seq: row.get::<_, i64>("last_applied_seq")? as u64,
        version: row.get::<_, i64>("version")? as u64,
        updated_at: row.get("updated_at")?,
    })
}

const RECORD_COLUMNS: &str = "chat_id, file_ref, status, status_code, expiry_time, \
     allow_download, allow_forward, access_duration, last_applied_seq, version, updated_at";

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn get_record(
        &self,
        profile: &ProfileId,
        key: &RecordKey,
    ) -> Result<Option<AccessRecord>> {
        let profile = profile.clone();
        let key = key.clone();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(lock_err)?;
            conn.query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM access_records
                     WHERE profile_id = ?1 AND chat_id = ?2 AND file_ref = ?3"
                ),
                params![profile.as_str(), key.chat_id.as_str(), key.file.as_str()],
                row_to_record,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
        .map_err(join_err)?
    }

    async fn put_record(
        &self,
        profile: &ProfileId,
        record: &AccessRecord,
    ) -> Result<WriteOutcome> {
        let profile = profile.clone();
        let record = record.clone();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(lock_err)?;
            let tx = conn.transaction()?;

            let stored_version: Option<i64> = tx
                .query_row(
                    "SELECT version FROM access_records
                     WHERE profile_id = ?1 AND chat_id = ?2 AND file_ref = ?3",
                    params![
                        profile.as_str(),
                        record.key.chat_id.as_str(),
                        record.key.file.as_str()
                    ],
                    |row| row.get(0),
                )
                .optional()?;

            match stored_version {
                None if record.version == 0 => {}
                Some(v) if v as u64 == record.version => {}
                other => {
                    debug!(
                        key = %record.key,
                        expected = record.version,
                        stored = other.unwrap_or(0),
                        "put_record lost the version race"
                    );
                    return Ok(WriteOutcome::Conflict {
                        stored: other.unwrap_or(0) as u64,
                    });
                }
            }

            let new_version = record.version + 1;
            tx.execute(
                "INSERT INTO access_records (
                    profile_id, chat_id, file_ref, status, status_code, expiry_time,
                    allow_download, allow_forward, access_duration, last_applied_seq,
                    version, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                ON CONFLICT(profile_id, chat_id, file_ref) DO UPDATE SET
                    status = excluded.status,
                    status_code = excluded.status_code,
                    expiry_time = excluded.expiry_time,
                    allow_download = excluded.allow_download,
                    allow_forward = excluded.allow_forward,
                    access_duration = excluded.access_duration,
                    last_applied_seq = excluded.last_applied_seq,
                    version = excluded.version,
                    updated_at = excluded.updated_at",
                params![
                    profile.as_str(),
                    record.key.chat_id.as_str(),
                    record.key.file.as_str(),
                    record.status.as_str(),
                    record.status_code,
                    record.expiry_time,
                    record.permissions.download.map(|b| b as i64),
                    record.permissions.forward.map(|b| b as i64),
                    record.access_duration.map(|d| d as i64),
                    record.last_applied_seq as i64,
                    new_version as i64,
                    record.updated_at,
                ],
            )?;

            tx.commit()?;
            Ok(WriteOutcome::Committed {
                version: new_version,
            })
        })
        .await
        .map_err(join_err)?
    }

    async fn list_chat_records(
        &self,
        profile: &ProfileId,
        chat_id: &ChatId,
    ) -> Result<Vec<AccessRecord>> {
        let profile = profile.clone();
        let chat_id = chat_id.clone();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(lock_err)?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM access_records
                 WHERE profile_id = ?1 AND chat_id = ?2
                 ORDER BY file_ref"
            ))?;

            let records = stmt
                .query_map(params![profile.as_str(), chat_id.as_str()], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(records)
        })
        .await
        .map_err(join_err)?
    }

    async fn count_records(&self, profile: &ProfileId) -> Result<u64> {
        let profile = profile.clone();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(lock_err)?;
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM access_records WHERE profile_id = ?1",
                params![profile.as_str()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
        .map_err(join_err)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(file: &str) -> RecordKey {
        RecordKey::new(ChatId::from("chat1"), FileRef::from(file))
    }

    fn profile() -> ProfileId {
        ProfileId::from("alice")
    }

    #[tokio::test]
    async fn test_sqlite_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        let mut rec = AccessRecord::requested(key("/a.prv"), 100);
        rec.status = AccessStatus::Active;
        rec.expiry_time = Some(3700);
        rec.permissions = Permissions::new(true, false);
        rec.access_duration = Some(3600);
        rec.last_applied_seq = 4;

        let outcome = store.put_record(&profile(), &rec).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Committed { version: 1 });

        let stored = store
            .get_record(&profile(), &key("/a.prv"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, AccessStatus::Active);
        assert_eq!(stored.expiry_time, Some(3700));
        assert_eq!(stored.permissions.download, Some(true));
        assert_eq!(stored.permissions.forward, Some(false));
        assert_eq!(stored.access_duration, Some(3600));
        assert_eq!(stored.last_applied_seq, 4);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_sqlite_cas_conflict() {
        let store = SqliteStore::open_memory().unwrap();
        let rec = AccessRecord::requested(key("/a.prv"), 100);
        store.put_record(&profile(), &rec).await.unwrap();

        // Re-submitting at version 0 must lose: the store is at version 1.
        let outcome = store.put_record(&profile(), &rec).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Conflict { stored: 1 });

        // Loading and re-committing at the stored version succeeds.
        let mut loaded = store
            .get_record(&profile(), &key("/a.prv"))
            .await
            .unwrap()
            .unwrap();
        loaded.status = AccessStatus::Denied;
        let outcome = store.put_record(&profile(), &loaded).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Committed { version: 2 });
    }

    #[tokio::test]
    async fn test_sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            let rec = AccessRecord::requested(key("/a.prv"), 100);
            store.put_record(&profile(), &rec).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let stored = store.get_record(&profile(), &key("/a.prv")).await.unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn test_sqlite_list_and_count() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .put_record(&profile(), &AccessRecord::requested(key("/a.prv"), 100))
            .await
            .unwrap();
        store
            .put_record(&profile(), &AccessRecord::requested(key("/b.prv"), 100))
            .await
            .unwrap();

        let listed = store
            .list_chat_records(&profile(), &ChatId::from("chat1"))
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(store.count_records(&profile()).await.unwrap(), 2);
    }
}
