//! # PRV Proto
//!
//! The wire layer of the PRV kernel: protocol data units (PDUs), the
//! crypto provider interface, and the sealed-file envelope.
//!
//! ## Overview
//!
//! Access-control events travel between peers as PDUs: small, signed,
//! CBOR-encoded messages. Each PDU carries a per-(sender, chat) sequence
//! number; the ledger uses it to make PDU application idempotent and to
//! reject replays that would move a record backward.
//!
//! Signing and validation are behind the [`CryptoProvider`] trait so the
//! backend is pluggable; [`Ed25519Provider`] is the default implementation.
//!
//! File payloads are sealed with a per-file content key
//! (ChaCha20-Poly1305); the content key is wrapped to the recipient via
//! X25519, so revocation never requires re-encrypting content.

pub mod error;
pub mod pdu;
pub mod provider;
pub mod seal;

pub use error::{ProtoError, Result};
pub use pdu::{limits, Pdu, PduBody, PduDraft, WIRE_MAGIC, WIRE_VERSION};
pub use provider::{CryptoProvider, DecodedPdu, Ed25519Provider};
pub use seal::{ContentKey, KeyWrap, SealNonce, SealedFile, X25519PublicKey, X25519StaticSecret};
