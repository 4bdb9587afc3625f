//! Error types for the store module.

use thiserror::Error;

use prv_core::ErrorKind;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Compare-and-swap failed: a concurrent writer committed first.
    #[error("version conflict on {key}: expected {expected}, stored {stored}")]
    VersionConflict {
        key: String,
        expected: u64,
        stored: u64,
    },

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Map onto the boundary classification.
    ///
    /// Backend failures (SQL, I/O, migration, corrupt rows) all surface as
    /// `NotInitialized`: the store itself is unusable, not any one record,
    /// and callers react the same way as to a missing backend.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::VersionConflict { .. } => ErrorKind::Conflict,
            StoreError::Database(_)
            | StoreError::Serialization(_)
            | StoreError::InvalidData(_)
            | StoreError::Migration(_)
            | StoreError::Io(_) => ErrorKind::NotInitialized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            StoreError::NotFound("chat1:/a.prv".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            StoreError::VersionConflict {
                key: "chat1:/a.prv".into(),
                expected: 1,
                stored: 2,
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            StoreError::Migration("too new".into()).kind(),
            ErrorKind::NotInitialized
        );
        assert_eq!(
            StoreError::InvalidData("bad status".into()).kind(),
            ErrorKind::NotInitialized
        );
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
