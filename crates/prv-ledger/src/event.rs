//! Pure transition rules of the access state machine.
//!
//! [`transition`] takes a record and an event and produces the next record
//! without touching storage or clocks beyond the `now` it is given. The
//! ledger wraps it with locking and persistence; tests can drive it
//! directly.

use prv_core::{AccessRecord, AccessStatus, Permissions};

use crate::error::{LedgerError, Result};

/// An event that may move an access record through the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessEvent {
    /// A peer asks for access. Starts a record, or a fresh cycle on a
    /// terminal one; a no-op on a record that is already in flight.
    Request,

    /// The request could not be auto-decided; the owner must act.
    MarkWaiting,

    /// The owner approves.
    Grant {
        /// Access duration in seconds from now.
        duration_secs: u64,
        /// Whether download is allowed.
        allow_download: bool,
        /// Whether forwarding is allowed.
        allow_forward: bool,
    },

    /// The owner denies the pending request.
    Deny {
        /// Optional diagnostic code from the peer.
        status_code: Option<i64>,
    },

    /// The owner revokes the active grant.
    Revoke,

    /// The backing file was removed from storage.
    FileDeleted,
}

impl AccessEvent {
    /// Stable name for logs and errors.
    pub fn kind_str(&self) -> &'static str {
        match self {
            AccessEvent::Request => "request",
            AccessEvent::MarkWaiting => "mark_waiting",
            AccessEvent::Grant { .. } => "grant",
            AccessEvent::Deny { .. } => "deny",
            AccessEvent::Revoke => "revoke",
            AccessEvent::FileDeleted => "file_deleted",
        }
    }

    /// Lattice rank of the status this event drives toward.
    ///
    /// Used by the PDU path to tell a reordered/replayed message (target
    /// rank below the record's current rank) from a locally invalid call.
    pub fn target_rank(&self) -> u8 {
        match self {
            AccessEvent::Request | AccessEvent::MarkWaiting => 0,
            AccessEvent::Grant { .. } => 1,
            AccessEvent::Deny { .. } | AccessEvent::Revoke | AccessEvent::FileDeleted => 2,
        }
    }
}

fn invalid(record: &AccessRecord, from: AccessStatus, event: &AccessEvent) -> LedgerError {
    LedgerError::InvalidTransition {
        key: record.key.clone(),
        from,
        event: event.kind_str(),
    }
}

/// Start a new cycle on top of a terminal record: same key, same version
/// chain, everything else reset.
fn fresh_cycle(record: &AccessRecord, now: i64) -> AccessRecord {
    AccessRecord {
        key: record.key.clone(),
        status: AccessStatus::Requested,
        status_code: None,
        expiry_time: None,
        permissions: Permissions::default(),
        access_duration: None,
        last_applied_seq: record.last_applied_seq,
        version: record.version,
        updated_at: now,
    }
}

/// Apply `event` to `record` at time `now`, producing the next record.
///
/// Lazy expiry is honored: the rules run against the record's effective
/// status, so granting on a record whose expiry already passed is rejected
/// even though the stored status still says `Active`.
pub fn transition(record: &AccessRecord, event: &AccessEvent, now: i64) -> Result<AccessRecord> {
    let from = record.effective_status(now);

    match event {
        AccessEvent::Request => {
            if from.is_terminal() {
                Ok(fresh_cycle(record, now))
            } else {
                // Already in flight; requesting again changes nothing.
                Ok(record.clone())
            }
        }

        AccessEvent::MarkWaiting => match from {
            AccessStatus::Requested => {
                let mut next = record.clone();
                next.status = AccessStatus::WaitingOwnerAction;
                next.updated_at = now;
                Ok(next)
            }
            _ => Err(invalid(record, from, event)),
        },

        AccessEvent::Grant {
            duration_secs,
            allow_download,
            allow_forward,
        } => {
            if !from.is_pending() {
                return Err(invalid(record, from, event));
            }
            let mut next = record.clone();
            next.status = AccessStatus::Active;
            next.expiry_time = Some(now + *duration_secs as i64);
            next.permissions = Permissions::new(*allow_download, *allow_forward);
            next.access_duration = Some(*duration_secs);
            next.updated_at = now;
            Ok(next)
        }

        AccessEvent::Deny { status_code } => {
            if !from.is_pending() {
                return Err(invalid(record, from, event));
            }
            let mut next = record.clone();
            next.status = AccessStatus::Denied;
            next.status_code = *status_code;
            next.updated_at = now;
            Ok(next)
        }

        AccessEvent::Revoke => match from {
            AccessStatus::Active => {
                let mut next = record.clone();
                next.status = AccessStatus::Revoked;
                next.expiry_time = None;
                next.updated_at = now;
                Ok(next)
            }
            _ => Err(invalid(record, from, event)),
        },

        AccessEvent::FileDeleted => {
            let mut next = record.clone();
            next.status = AccessStatus::Deleted;
            next.expiry_time = None;
            next.updated_at = now;
            Ok(next)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prv_core::{ChatId, FileRef, RecordKey};

    fn requested(now: i64) -> AccessRecord {
        AccessRecord::requested(
            RecordKey::new(ChatId::from("chat1"), FileRef::from("/f.prv")),
            now,
        )
    }

    fn grant() -> AccessEvent {
        AccessEvent::Grant {
            duration_secs: 3600,
            allow_download: true,
            allow_forward: false,
        }
    }

    #[test]
    fn test_grant_from_requested() {
        let rec = requested(100);
        let next = transition(&rec, &grant(), 100).unwrap();

        assert_eq!(next.status, AccessStatus::Active);
        assert_eq!(next.expiry_time, Some(3700));
        assert_eq!(next.access_duration, Some(3600));
        assert!(next.permissions.download_allowed());
        assert!(!next.permissions.forward_allowed());
    }

    #[test]
    fn test_grant_from_waiting() {
        let rec = requested(100);
        let waiting = transition(&rec, &AccessEvent::MarkWaiting, 100).unwrap();
        assert_eq!(waiting.status, AccessStatus::WaitingOwnerAction);

        let next = transition(&waiting, &grant(), 200).unwrap();
        assert_eq!(next.status, AccessStatus::Active);
        assert_eq!(next.expiry_time, Some(3800));
    }

    #[test]
    fn test_grant_from_active_rejected() {
        let rec = requested(100);
        let active = transition(&rec, &grant(), 100).unwrap();

        let err = transition(&active, &grant(), 200).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidTransition {
                from: AccessStatus::Active,
                ..
            }
        ));
    }

    #[test]
    fn test_grant_after_lazy_expiry_rejected() {
        let rec = requested(100);
        let active = transition(&rec, &grant(), 100).unwrap();

        // Stored status is Active, but expiry has passed.
        let err = transition(&active, &grant(), 4000).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidTransition {
                from: AccessStatus::Expired,
                ..
            }
        ));
    }

    #[test]
    fn test_revoke_only_from_active() {
        let rec = requested(100);
        assert!(transition(&rec, &AccessEvent::Revoke, 100).is_err());

        let active = transition(&rec, &grant(), 100).unwrap();
        let revoked = transition(&active, &AccessEvent::Revoke, 200).unwrap();
        assert_eq!(revoked.status, AccessStatus::Revoked);
        assert!(revoked.expiry_time.is_none());

        // Re-revoking is a hard error, not an idempotent no-op.
        assert!(transition(&revoked, &AccessEvent::Revoke, 300).is_err());
    }

    #[test]
    fn test_deny_terminal_not_idempotent() {
        let rec = requested(100);
        let denied = transition(&rec, &AccessEvent::Deny { status_code: Some(7) }, 100).unwrap();
        assert_eq!(denied.status, AccessStatus::Denied);
        assert_eq!(denied.status_code, Some(7));

        let err = transition(&denied, &AccessEvent::Deny { status_code: None }, 200).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
    }

    #[test]
    fn test_file_deleted_from_any_state() {
        let rec = requested(100);
        let active = transition(&rec, &grant(), 100).unwrap();
        let revoked = transition(&active, &AccessEvent::Revoke, 200).unwrap();

        for state in [&rec, &active, &revoked] {
            let deleted = transition(state, &AccessEvent::FileDeleted, 300).unwrap();
            assert_eq!(deleted.status, AccessStatus::Deleted);
        }
    }

    #[test]
    fn test_request_restarts_terminal_record() {
        let rec = requested(100);
        let denied = transition(&rec, &AccessEvent::Deny { status_code: None }, 100).unwrap();

        let restarted = transition(&denied, &AccessEvent::Request, 500).unwrap();
        assert_eq!(restarted.status, AccessStatus::Requested);
        assert!(restarted.expiry_time.is_none());
        assert_eq!(restarted.key, rec.key);
        assert_eq!(restarted.updated_at, 500);
    }

    #[test]
    fn test_request_noop_while_in_flight() {
        let rec = requested(100);
        let again = transition(&rec, &AccessEvent::Request, 200).unwrap();
        assert_eq!(again, rec);

        let active = transition(&rec, &grant(), 100).unwrap();
        let again = transition(&active, &AccessEvent::Request, 200).unwrap();
        assert_eq!(again, active);
    }
}
