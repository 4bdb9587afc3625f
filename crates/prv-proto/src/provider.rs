//! Crypto provider interface.
//!
//! The exchange engine never touches keys directly. It hands drafts and
//! wire bytes to a [`CryptoProvider`], which owns the identity keypair and
//! the seal secret. The trait is async so a backend may live behind an IPC
//! boundary or a hardware token.

use async_trait::async_trait;
use bytes::Bytes;

use prv_core::{Ed25519PublicKey, Keypair, PduId};

use crate::error::Result;
use crate::pdu::{Pdu, PduDraft};
use crate::seal::{SealedFile, X25519PublicKey, X25519StaticSecret};

/// A PDU that passed decoding and signature validation.
#[derive(Debug, Clone)]
pub struct DecodedPdu {
    /// The validated PDU.
    pub pdu: Pdu,
    /// Content address of the wire bytes.
    pub id: PduId,
}

/// Signing, validation, and file sealing behind one seam.
#[async_trait]
pub trait CryptoProvider: Send + Sync {
    /// The provider's signing identity.
    fn signing_key(&self) -> Ed25519PublicKey;

    /// The X25519 key peers wrap content keys to.
    fn seal_key(&self) -> X25519PublicKey;

    /// Sign a draft and encode it to wire bytes.
    async fn encode_pdu(&self, draft: PduDraft) -> Result<(Pdu, Bytes)>;

    /// Decode wire bytes and verify the embedded signature.
    async fn decode_pdu(&self, bytes: &[u8]) -> Result<DecodedPdu>;

    /// Seal a file payload to a recipient, returning the encoded envelope.
    ///
    /// `context` binds the seal to a (chat, file) pair.
    async fn seal_file(
        &self,
        plaintext: &[u8],
        recipient: &X25519PublicKey,
        context: &[u8],
    ) -> Result<Bytes>;

    /// Open a sealed envelope with the provider's seal secret.
    async fn open_file(&self, envelope: &[u8], context: &[u8]) -> Result<Vec<u8>>;
}

/// In-process provider backed by ed25519-dalek and x25519-dalek.
pub struct Ed25519Provider {
    keypair: Keypair,
    seal_secret: X25519StaticSecret,
}

impl Ed25519Provider {
    /// Generate a provider with fresh random keys.
    pub fn generate() -> Self {
        Self {
            keypair: Keypair::generate(),
            seal_secret: X25519StaticSecret::generate(),
        }
    }

    /// Build from existing key material.
    pub fn from_parts(keypair: Keypair, seal_secret: X25519StaticSecret) -> Self {
        Self {
            keypair,
            seal_secret,
        }
    }

    /// Deterministic provider for tests and fixtures.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            keypair: Keypair::from_seed(seed),
            seal_secret: X25519StaticSecret::from_bytes(*seed),
        }
    }
}

#[async_trait]
impl CryptoProvider for Ed25519Provider {
    fn signing_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    fn seal_key(&self) -> X25519PublicKey {
        self.seal_secret.public_key()
    }

    async fn encode_pdu(&self, draft: PduDraft) -> Result<(Pdu, Bytes)> {
        let pdu = Pdu::sign(draft, &self.keypair)?;
        let wire = pdu.to_wire()?;
        Ok((pdu, Bytes::from(wire)))
    }

    async fn decode_pdu(&self, bytes: &[u8]) -> Result<DecodedPdu> {
        let pdu = Pdu::from_wire(bytes)?;
        pdu.verify()?;
        let id = pdu.id()?;
        Ok(DecodedPdu { pdu, id })
    }

    async fn seal_file(
        &self,
        plaintext: &[u8],
        recipient: &X25519PublicKey,
        context: &[u8],
    ) -> Result<Bytes> {
        let sealed = SealedFile::seal(plaintext, recipient, context)?;
        Ok(Bytes::from(sealed.to_bytes()?))
    }

    async fn open_file(&self, envelope: &[u8], context: &[u8]) -> Result<Vec<u8>> {
        let sealed = SealedFile::from_bytes(envelope)?;
        sealed.open(&self.seal_secret, context)
    }
}
