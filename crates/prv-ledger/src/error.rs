//! Error types for the ledger.

use thiserror::Error;

use prv_core::{AccessStatus, ErrorKind, RecordKey};
use prv_store::StoreError;

/// Errors from applying events to access records.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The event is not valid from the record's current status.
    #[error("invalid transition: {event} from {from} for {key}")]
    InvalidTransition {
        /// The record the event targeted.
        key: RecordKey,
        /// Effective status at the time of the attempt.
        from: AccessStatus,
        /// Stable name of the rejected event.
        event: &'static str,
    },

    /// A concurrent writer committed first; the caller's snapshot is stale.
    #[error("concurrent mutation on {key}")]
    Conflict {
        /// The contended record.
        key: RecordKey,
    },

    /// The PDU would move the record backward in the status lattice.
    #[error("replayed or reordered PDU rejected: {event} from {from} for {key}")]
    Replay {
        /// The record the PDU targeted.
        key: RecordKey,
        /// Effective status at the time of the attempt.
        from: AccessStatus,
        /// Stable name of the rejected event.
        event: &'static str,
    },

    /// The persistence layer failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Map onto the boundary classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidTransition { .. } | LedgerError::Replay { .. } => {
                ErrorKind::InvalidTransition
            }
            LedgerError::Conflict { .. } => ErrorKind::Conflict,
            LedgerError::Store(e) => e.kind(),
        }
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
