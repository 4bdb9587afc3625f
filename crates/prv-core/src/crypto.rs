//! Signing and hashing primitives.
//!
//! The PDU layer signs with Ed25519 and addresses content with Blake3.
//! Everything here is a thin newtype over raw byte arrays so that hashes,
//! public keys, and signatures cannot be swapped for one another by
//! accident; the actual protocol logic lives behind the provider seam in
//! `prv-proto`.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Hash bytes with Blake3.
pub fn content_hash(data: &[u8]) -> Blake3Hash {
    Blake3Hash(*blake3::hash(data).as_bytes())
}

/// A 32-byte Blake3 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Blake3Hash(pub [u8; 32]);

impl Blake3Hash {
    /// Hash the given bytes. Alias for [`content_hash`].
    pub fn hash(data: &[u8]) -> Self {
        content_hash(data)
    }

    /// Wrap an existing digest.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn short_hex(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Debug for Blake3Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blake3Hash({}..)", self.short_hex())
    }
}

impl fmt::Display for Blake3Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_hex())
    }
}

impl AsRef<[u8]> for Blake3Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// An Ed25519 public key, the wire identity of a sender.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ed25519PublicKey(pub [u8; 32]);

impl Ed25519PublicKey {
    /// Wrap raw key bytes. Validity is checked on first use.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn short_hex(&self) -> String {
        hex::encode(&self.0[..8])
    }

    /// Check `signature` over `message` against this key.
    ///
    /// Fails with `InvalidPublicKey` when the bytes are not a valid curve
    /// point, `InvalidSignature` when verification itself fails.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CoreError> {
        let key = VerifyingKey::from_bytes(&self.0).map_err(|_| CoreError::InvalidPublicKey)?;
        key.verify(message, &Signature::from_bytes(&signature.0))
            .map_err(|_| CoreError::InvalidSignature)
    }
}

impl fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519PublicKey({}..)", self.short_hex())
    }
}

impl fmt::Display for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_hex())
    }
}

impl AsRef<[u8]> for Ed25519PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A detached Ed25519 signature, 64 bytes.
///
/// Serde is implemented by hand: derive only covers arrays up to 32
/// elements. On the wire this is a plain byte string.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature(pub [u8; 64]);

impl Ed25519Signature {
    /// Wrap raw signature bytes.
    pub const fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Raw signature bytes.
    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// All-zero placeholder; verifies against nothing.
    pub const ZERO: Self = Self([0u8; 64]);
}

impl fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Signature({}..)", hex::encode(&self.0[..8]))
    }
}

impl AsRef<[u8]> for Ed25519Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Ed25519Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Ed25519Signature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SignatureVisitor;

        impl<'de> serde::de::Visitor<'de> for SignatureVisitor {
            type Value = Ed25519Signature;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("64 signature bytes")
            }

            fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                let bytes: [u8; 64] = v
                    .try_into()
                    .map_err(|_| E::invalid_length(v.len(), &self))?;
                Ok(Ed25519Signature(bytes))
            }

            // Human-readable formats encode byte strings as sequences.
            fn visit_seq<A: serde::de::SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> Result<Self::Value, A::Error> {
                let mut bytes = [0u8; 64];
                for (i, slot) in bytes.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| serde::de::Error::invalid_length(i, &self))?;
                }
                if seq.next_element::<u8>()?.is_some() {
                    return Err(serde::de::Error::invalid_length(65, &self));
                }
                Ok(Ed25519Signature(bytes))
            }
        }

        deserializer.deserialize_bytes(SignatureVisitor)
    }
}

/// An Ed25519 signing keypair.
///
/// The secret half never leaves this struct; only signatures and the
/// public key come out.
#[derive(Clone)]
pub struct Keypair {
    secret: SigningKey,
}

impl Keypair {
    /// A fresh random keypair.
    pub fn generate() -> Self {
        Self {
            secret: SigningKey::generate(&mut rand::thread_rng()),
        }
    }

    /// Deterministic keypair from a 32-byte seed. Used for key restore
    /// and test fixtures.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            secret: SigningKey::from_bytes(seed),
        }
    }

    /// The public half.
    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.secret.verifying_key().to_bytes())
    }

    /// Sign a message with the secret half.
    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        Ed25519Signature(self.secret.sign(message).to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the secret half.
        write!(f, "Keypair(pub: {})", self.public_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_verifies_only_original_message() {
        let keypair = Keypair::generate();
        let signature = keypair.sign(b"revoke chat1 /contract.prv");

        assert!(keypair
            .public_key()
            .verify(b"revoke chat1 /contract.prv", &signature)
            .is_ok());
        assert!(keypair
            .public_key()
            .verify(b"revoke chat1 /other.prv", &signature)
            .is_err());
        assert!(keypair
            .public_key()
            .verify(b"revoke chat1 /contract.prv", &Ed25519Signature::ZERO)
            .is_err());
    }

    #[test]
    fn test_seed_determinism() {
        let a = Keypair::from_seed(&[7; 32]);
        let b = Keypair::from_seed(&[7; 32]);
        let c = Keypair::from_seed(&[8; 32]);
        assert_eq!(a.public_key(), b.public_key());
        assert_ne!(a.public_key(), c.public_key());
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash(b"pdu bytes"), content_hash(b"pdu bytes"));
        assert_ne!(content_hash(b"pdu bytes"), content_hash(b"pdu bytes!"));
        assert_eq!(content_hash(b"x").to_hex().len(), 64);
    }

    #[test]
    fn test_signature_serde_roundtrip() {
        let keypair = Keypair::from_seed(&[3; 32]);
        let signature = keypair.sign(b"payload");

        let json = serde_json::to_string(&signature).unwrap();
        let back: Ed25519Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, signature);

        // Wrong lengths are rejected, not truncated or padded.
        assert!(serde_json::from_str::<Ed25519Signature>("[1, 2, 3]").is_err());
        let long: Vec<u8> = vec![0; 65];
        let json = serde_json::to_string(&long).unwrap();
        assert!(serde_json::from_str::<Ed25519Signature>(&json).is_err());
    }

    #[test]
    fn test_debug_never_leaks_secret() {
        let keypair = Keypair::from_seed(&[9; 32]);
        let debug = format!("{:?}", keypair);
        assert!(!debug.contains(&hex::encode([9u8; 32])));
    }
}
