//! Error types shared across the PRV kernel.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable classification of every failure the kernel can surface.
///
/// Presentation layers pattern-match on this; the human-readable message
/// travels alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No crypto/profile backend is available yet.
    NotInitialized,
    /// No profile has been selected.
    NoActiveProfile,
    /// The requested ledger transition is not allowed from the current status.
    InvalidTransition,
    /// Inbound PDU could not be decoded.
    MalformedPdu,
    /// The crypto provider rejected the operation.
    CryptoFailure,
    /// The operation exceeded its caller-supplied deadline.
    Timeout,
    /// No record (and no backing file) exists for the key.
    NotFound,
    /// A concurrent mutation won the race for this record.
    Conflict,
}

impl ErrorKind {
    /// Stable string form, used at the API boundary and in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotInitialized => "not_initialized",
            ErrorKind::NoActiveProfile => "no_active_profile",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::MalformedPdu => "malformed_pdu",
            ErrorKind::CryptoFailure => "crypto_failure",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the core primitives themselves.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

impl CoreError {
    /// Map onto the boundary classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidSignature | CoreError::InvalidPublicKey => ErrorKind::CryptoFailure,
            CoreError::EncodingError(_) | CoreError::DecodingError(_) => ErrorKind::MalformedPdu,
        }
    }
}
