//! Error types for the wire layer.

use thiserror::Error;

use prv_core::ErrorKind;

/// Errors that can occur while encoding, decoding, or sealing.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// The bytes are not a PDU at all, or the CBOR is broken.
    #[error("malformed PDU: {0}")]
    Malformed(String),

    /// The PDU decoded but its signature does not verify.
    #[error("signature verification failed")]
    SignatureInvalid,

    /// Wire version this build does not speak.
    #[error("unsupported wire version: {0}")]
    UnsupportedVersion(u8),

    /// A size limit was exceeded.
    #[error("PDU too large: {0} bytes")]
    TooLarge(usize),

    /// The crypto backend rejected the operation.
    #[error("crypto failure: {0}")]
    Crypto(String),
}

impl ProtoError {
    /// Map onto the boundary classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtoError::Malformed(_)
            | ProtoError::UnsupportedVersion(_)
            | ProtoError::TooLarge(_) => ErrorKind::MalformedPdu,
            ProtoError::SignatureInvalid | ProtoError::Crypto(_) => ErrorKind::CryptoFailure,
        }
    }
}

impl From<prv_core::CoreError> for ProtoError {
    fn from(e: prv_core::CoreError) -> Self {
        match e {
            prv_core::CoreError::InvalidSignature => ProtoError::SignatureInvalid,
            prv_core::CoreError::InvalidPublicKey => ProtoError::Crypto("invalid public key".into()),
            prv_core::CoreError::EncodingError(msg) | prv_core::CoreError::DecodingError(msg) => {
                ProtoError::Malformed(msg)
            }
        }
    }
}

/// Result type for wire operations.
pub type Result<T> = std::result::Result<T, ProtoError>;
