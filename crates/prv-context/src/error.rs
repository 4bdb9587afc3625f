//! Facade errors and the uniform boundary result shape.
//!
//! Nothing panics across the boundary: every operation returns an
//! [`ApiResult`], a serializable `{success, data, error}` triple that
//! presentation layers pattern-match on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use prv_core::{ChatId, ErrorKind};
use prv_ledger::LedgerError;
use prv_proto::ProtoError;

/// Errors raised by the context facade.
#[derive(Debug, Error)]
pub enum ContextError {
    /// `init` has not been called yet.
    #[error("context not initialized")]
    NotInitialized,

    /// No profile is currently active.
    #[error("no active profile")]
    NoActiveProfile,

    /// The operation exceeded its caller-supplied deadline.
    #[error("operation timed out")]
    Timeout,

    /// The operation was cancelled before it committed.
    #[error("operation cancelled before commit")]
    Cancelled,

    /// No seal key is known for the chat peer; the peer-add handshake has
    /// not completed.
    #[error("no seal key known for chat {0}")]
    NoPeerKey(ChatId),

    /// A ledger transition failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The wire layer failed.
    #[error(transparent)]
    Proto(#[from] ProtoError),
}

impl ContextError {
    /// Map onto the boundary classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContextError::NotInitialized => ErrorKind::NotInitialized,
            ContextError::NoActiveProfile => ErrorKind::NoActiveProfile,
            // Cancellation surfaces as a deadline failure: the caller's
            // retry story is the same for both.
            ContextError::Timeout | ContextError::Cancelled => ErrorKind::Timeout,
            ContextError::NoPeerKey(_) => ErrorKind::CryptoFailure,
            ContextError::Ledger(e) => e.kind(),
            ContextError::Proto(e) => e.kind(),
        }
    }
}

/// Result type for facade internals.
pub type Result<T> = std::result::Result<T, ContextError>;

/// Boundary error: a classification plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Machine-readable classification.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

/// The uniform boundary shape of every facade operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResult<T> {
    /// Whether the operation succeeded.
    pub success: bool,
    /// The payload, present iff `success`.
    pub data: Option<T>,
    /// The failure, present iff `!success`.
    pub error: Option<ApiError>,
}

impl<T> ApiResult<T> {
    /// A successful result.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A failed result.
    pub fn err(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                kind,
                message: message.into(),
            }),
        }
    }

    /// Convert back to a `Result` for callers that prefer `?`.
    pub fn into_result(self) -> std::result::Result<T, ApiError> {
        match (self.data, self.error) {
            (Some(data), _) => Ok(data),
            (None, Some(error)) => Err(error),
            (None, None) => Err(ApiError {
                kind: ErrorKind::NotFound,
                message: "empty result".to_string(),
            }),
        }
    }
}

impl<T> From<Result<T>> for ApiResult<T> {
    fn from(res: Result<T>) -> Self {
        match res {
            Ok(data) => ApiResult::ok(data),
            Err(e) => ApiResult::err(e.kind(), e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_result_shape() {
        let ok: ApiResult<u32> = ApiResult::ok(7);
        assert!(ok.success);
        assert_eq!(ok.data, Some(7));
        assert!(ok.error.is_none());

        let err: ApiResult<u32> = ApiResult::err(ErrorKind::NoActiveProfile, "pick one");
        assert!(!err.success);
        assert!(err.data.is_none());
        assert_eq!(err.error.as_ref().map(|e| e.kind), Some(ErrorKind::NoActiveProfile));
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(ContextError::NotInitialized.kind(), ErrorKind::NotInitialized);
        assert_eq!(ContextError::Cancelled.kind(), ErrorKind::Timeout);
        assert_eq!(
            ContextError::NoPeerKey(ChatId::from("c")).kind(),
            ErrorKind::CryptoFailure
        );
    }

    #[test]
    fn test_api_result_serializes() {
        let err: ApiResult<u32> = ApiResult::err(ErrorKind::Timeout, "too slow");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["kind"], "Timeout");
    }
}
