//! Access records: the durable state of a single (chat, file) grant.
//!
//! A record is created by the first access request for a file and then moves
//! through the status machine. Expiry is lazy: a stored `Active` record whose
//! expiry time has passed is reported as `Expired` by every reader, without a
//! background sweeper.

use serde::{Deserialize, Serialize};

use crate::ids::RecordKey;

/// Status of a file access grant. Exactly one holds at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessStatus {
    /// A peer has requested access; no decision yet.
    Requested,
    /// The owner must act; the request could not be auto-decided.
    WaitingOwnerAction,
    /// Access granted and not yet expired.
    Active,
    /// Access was granted but the expiry time has passed.
    Expired,
    /// The owner revoked a previously active grant.
    Revoked,
    /// The owner denied the request.
    Denied,
    /// The backing file was removed from storage.
    Deleted,
    /// Synthetic query result: no record and no backing file. Never stored.
    NotFound,
}

impl AccessStatus {
    /// Position in the replay lattice: pending < active < terminal.
    ///
    /// A PDU whose transition would lower the rank of a record is a replay
    /// (or reordering) and must be rejected.
    pub fn rank(&self) -> u8 {
        match self {
            AccessStatus::Requested | AccessStatus::WaitingOwnerAction => 0,
            AccessStatus::Active => 1,
            AccessStatus::Expired
            | AccessStatus::Revoked
            | AccessStatus::Denied
            | AccessStatus::Deleted => 2,
            AccessStatus::NotFound => 2,
        }
    }

    /// Whether this status ends the current access attempt.
    ///
    /// A fresh request for the same key starts a new cycle on top of a
    /// terminal record.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AccessStatus::Expired
                | AccessStatus::Revoked
                | AccessStatus::Denied
                | AccessStatus::Deleted
        )
    }

    /// Whether the owner may still decide on this request.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            AccessStatus::Requested | AccessStatus::WaitingOwnerAction
        )
    }

    /// Stable string form used in logs and at the API boundary.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessStatus::Requested => "requested",
            AccessStatus::WaitingOwnerAction => "waiting_owner_action",
            AccessStatus::Active => "active",
            AccessStatus::Expired => "expired",
            AccessStatus::Revoked => "revoked",
            AccessStatus::Denied => "denied",
            AccessStatus::Deleted => "deleted",
            AccessStatus::NotFound => "not_found",
        }
    }
}

impl std::fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AccessStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(AccessStatus::Requested),
            "waiting_owner_action" => Ok(AccessStatus::WaitingOwnerAction),
            "active" => Ok(AccessStatus::Active),
            "expired" => Ok(AccessStatus::Expired),
            "revoked" => Ok(AccessStatus::Revoked),
            "denied" => Ok(AccessStatus::Denied),
            "deleted" => Ok(AccessStatus::Deleted),
            "not_found" => Ok(AccessStatus::NotFound),
            other => Err(format!("unknown access status: {other}")),
        }
    }
}

/// Permission flags fixed at grant time.
///
/// Absent flags mean "unspecified" and deny by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Permissions {
    /// Whether the recipient may download the plaintext.
    pub download: Option<bool>,
    /// Whether the recipient may forward the file to other chats.
    pub forward: Option<bool>,
}

impl Permissions {
    /// Permissions as granted.
    pub fn new(download: bool, forward: bool) -> Self {
        Self {
            download: Some(download),
            forward: Some(forward),
        }
    }

    /// Effective download permission (deny when unspecified).
    pub fn download_allowed(&self) -> bool {
        self.download.unwrap_or(false)
    }

    /// Effective forward permission (deny when unspecified).
    pub fn forward_allowed(&self) -> bool {
        self.forward.unwrap_or(false)
    }
}

/// The durable state of one (chat, file) access attempt.
///
/// The ledger owns the authoritative copy; everything else receives clones
/// that are point-in-time snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    /// Composite key.
    pub key: RecordKey,

    /// Current status as stored. Readers must resolve lazy expiry via
    /// [`AccessRecord::effective_status`] instead of reading this directly.
    pub status: AccessStatus,

    /// Optional diagnostic code from the peer; never used for logic.
    pub status_code: Option<i64>,

    /// Absolute expiry (epoch seconds). Meaningful only for Active/Expired.
    pub expiry_time: Option<i64>,

    /// Permission flags granted at approval time.
    pub permissions: Permissions,

    /// Requested/granted access duration in seconds.
    pub access_duration: Option<u64>,

    /// Highest PDU sequence number applied to this record. Replays at or
    /// below this are idempotent no-ops.
    pub last_applied_seq: u64,

    /// Optimistic-concurrency token; bumped by the store on every commit.
    pub version: u64,

    /// When the record last changed (epoch seconds). Diagnostics only.
    pub updated_at: i64,
}

impl AccessRecord {
    /// A fresh record in `Requested` state.
    pub fn requested(key: RecordKey, now: i64) -> Self {
        Self {
            key,
            status: AccessStatus::Requested,
            status_code: None,
            expiry_time: None,
            permissions: Permissions::default(),
            access_duration: None,
            last_applied_seq: 0,
            version: 0,
            updated_at: now,
        }
    }

    /// Status with lazy expiry resolved: an `Active` record whose expiry
    /// time is at or before `now` reads as `Expired`.
    pub fn effective_status(&self, now: i64) -> AccessStatus {
        match (self.status, self.expiry_time) {
            (AccessStatus::Active, Some(expiry)) if now >= expiry => AccessStatus::Expired,
            (status, _) => status,
        }
    }

    /// Snapshot of this record with lazy expiry baked into `status`.
    ///
    /// This is what readers hand out; the stored copy is left untouched
    /// (no background sweep).
    pub fn resolved(&self, now: i64) -> Self {
        let mut out = self.clone();
        out.status = self.effective_status(now);
        out
    }
}
