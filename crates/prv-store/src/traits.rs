//! LedgerStore trait: the abstract interface for access-record persistence.
//!
//! This keeps the ledger storage-agnostic. Implementations include SQLite
//! (primary) and in-memory (for tests).

use async_trait::async_trait;

use prv_core::{AccessRecord, ProfileId, RecordKey};

use crate::error::Result;

/// Result of committing a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The record was committed; contains the new stored version.
    Committed { version: u64 },
    /// A concurrent writer committed first; contains the version now stored.
    Conflict { stored: u64 },
}

/// Async interface for access-record persistence.
///
/// # Design Notes
///
/// - **Per-key atomicity**: `put_record` is a compare-and-swap on
///   `record.version`. A record loaded at version N commits only if the
///   stored version is still N; the committed record is stored at N+1.
/// - **Fresh records** carry version 0 and commit only if no record exists
///   for the key yet.
/// - **No partial writes**: a record is either stored whole at the new
///   version or the previous state is fully retained.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load the record for a key, if any.
    async fn get_record(&self, profile: &ProfileId, key: &RecordKey)
        -> Result<Option<AccessRecord>>;

    /// Commit a record via compare-and-swap on its version.
    ///
    /// `record.version` must be the version the caller loaded (0 for a fresh
    /// record). On success the record is stored with `version + 1`.
    async fn put_record(&self, profile: &ProfileId, record: &AccessRecord)
        -> Result<WriteOutcome>;

    /// List all records under a chat, in key order.
    async fn list_chat_records(
        &self,
        profile: &ProfileId,
        chat_id: &prv_core::ChatId,
    ) -> Result<Vec<AccessRecord>>;

    /// Count records stored for a profile (diagnostics).
    async fn count_records(&self, profile: &ProfileId) -> Result<u64>;
}
