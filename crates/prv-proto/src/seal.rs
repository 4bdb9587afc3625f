//! Sealed-file envelope.
//!
//! A PRV file is the original payload encrypted under a random per-file
//! content key (ChaCha20-Poly1305). The content key is wrapped to the chat
//! peer via ephemeral X25519 key agreement. Revoking access means refusing
//! to serve new wraps; the content itself is never re-encrypted.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::error::{ProtoError, Result};

/// An X25519 public key used for content-key wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct X25519PublicKey(pub [u8; 32]);

impl X25519PublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn to_dalek(self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

/// An X25519 static secret. Key agreement only, never signing.
pub struct X25519StaticSecret(StaticSecret);

impl X25519StaticSecret {
    /// Generate a new random secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(StaticSecret::from(bytes))
    }

    /// Create from seed bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Derive the public key.
    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey(*PublicKey::from(&self.0).as_bytes())
    }
}

/// A 256-bit per-file content key.
#[derive(Clone)]
pub struct ContentKey([u8; 32]);

impl ContentKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn encrypt(&self, plaintext: &[u8], nonce: &SealNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| ProtoError::Crypto(e.to_string()))?;
        cipher
            .encrypt(Nonce::from_slice(&nonce.0), plaintext)
            .map_err(|e| ProtoError::Crypto(e.to_string()))
    }

    fn decrypt(&self, ciphertext: &[u8], nonce: &SealNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| ProtoError::Crypto(e.to_string()))?;
        cipher
            .decrypt(Nonce::from_slice(&nonce.0), ciphertext)
            .map_err(|e| ProtoError::Crypto(e.to_string()))
    }
}

/// A 96-bit ChaCha20-Poly1305 nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealNonce(pub [u8; 12]);

impl SealNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }
}

fn derive_wrap_key(shared: &[u8; 32], context: &[u8]) -> ContentKey {
    let mut hasher = blake3::Hasher::new_derive_key("prv-seal-v1-keywrap");
    hasher.update(shared);
    hasher.update(context);
    ContentKey(*hasher.finalize().as_bytes())
}

/// The content key encrypted to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyWrap {
    /// Ephemeral public key used for this wrap.
    pub ephemeral: X25519PublicKey,
    /// Nonce for the wrap encryption.
    pub nonce: SealNonce,
    /// The encrypted content key.
    pub wrapped: Vec<u8>,
}

impl KeyWrap {
    /// Wrap a content key to a recipient.
    pub fn create(key: &ContentKey, recipient: &X25519PublicKey, context: &[u8]) -> Result<Self> {
        let ephemeral_secret = EphemeralSecret::random_from_rng(rand::thread_rng());
        let ephemeral = X25519PublicKey(*PublicKey::from(&ephemeral_secret).as_bytes());
        let shared = ephemeral_secret.diffie_hellman(&recipient.to_dalek());

        let wrap_key = derive_wrap_key(shared.as_bytes(), context);
        let nonce = SealNonce::generate();
        let wrapped = wrap_key.encrypt(key.as_bytes(), &nonce)?;

        Ok(Self {
            ephemeral,
            nonce,
            wrapped,
        })
    }

    /// Unwrap the content key with the recipient's secret.
    pub fn unwrap_key(&self, secret: &X25519StaticSecret, context: &[u8]) -> Result<ContentKey> {
        let shared = secret.0.diffie_hellman(&self.ephemeral.to_dalek());
        let wrap_key = derive_wrap_key(shared.as_bytes(), context);
        let bytes = wrap_key.decrypt(&self.wrapped, &self.nonce)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ProtoError::Crypto("wrapped key has wrong length".into()))?;
        Ok(ContentKey(arr))
    }
}

/// A sealed (PRV) file: ciphertext plus the wrap for the chat peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedFile {
    /// Nonce for the content encryption.
    pub nonce: SealNonce,
    /// The encrypted file payload (includes the auth tag).
    pub ciphertext: Vec<u8>,
    /// Content key wrapped to the recipient.
    pub key_wrap: KeyWrap,
}

impl SealedFile {
    /// Seal a payload to a recipient.
    ///
    /// `context` binds the wrap to the (chat, file) pair so a wrap captured
    /// from one file cannot unwrap another.
    pub fn seal(plaintext: &[u8], recipient: &X25519PublicKey, context: &[u8]) -> Result<Self> {
        let content_key = ContentKey::generate();
        let nonce = SealNonce::generate();
        let ciphertext = content_key.encrypt(plaintext, &nonce)?;
        let key_wrap = KeyWrap::create(&content_key, recipient, context)?;

        Ok(Self {
            nonce,
            ciphertext,
            key_wrap,
        })
    }

    /// Open a sealed file with the recipient's secret.
    pub fn open(&self, secret: &X25519StaticSecret, context: &[u8]) -> Result<Vec<u8>> {
        let content_key = self.key_wrap.unwrap_key(secret, context)?;
        content_key.decrypt(&self.ciphertext, &self.nonce)
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| ProtoError::Crypto(format!("CBOR encode: {e}")))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| ProtoError::Malformed(format!("CBOR decode: {e}")))
    }
}
