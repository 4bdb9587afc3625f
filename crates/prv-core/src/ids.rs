//! Strong identifier types for the PRV kernel.
//!
//! Chat, file, and profile identifiers are opaque strings supplied by the
//! surrounding application; newtypes keep them from being mixed up at
//! compile time. PDU identifiers are content addresses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a chat, opaque to the kernel.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(String);

impl ChatId {
    /// Wrap a caller-supplied chat identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChatId({})", self.0)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChatId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Reference to a file within a chat, opaque to the kernel.
///
/// Typically a path, but the kernel never touches the filesystem through it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileRef(String);

impl FileRef {
    /// Wrap a caller-supplied file reference.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Get the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileRef({})", self.0)
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a user profile (the username it was created under).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProfileId(String);

impl ProfileId {
    /// Wrap a username as a profile identifier.
    pub fn new(username: impl Into<String>) -> Self {
        Self(username.into())
    }

    /// Get the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProfileId({})", self.0)
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProfileId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Composite key of an access record: one record per (chat, file) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    /// The chat the file was shared in.
    pub chat_id: ChatId,
    /// The shared file.
    pub file: FileRef,
}

impl RecordKey {
    /// Build a record key.
    pub fn new(chat_id: ChatId, file: FileRef) -> Self {
        Self { chat_id, file }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chat_id, self.file)
    }
}

/// A 32-byte PDU identifier, computed as Blake3(canonical_bytes(pdu)).
///
/// Two PDUs with identical content have the same id, which makes duplicate
/// delivery detectable without trusting the sender.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PduId(pub [u8; 32]);

impl PduId {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// The zero id (sentinel).
    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for PduId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PduId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for PduId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for PduId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for PduId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdu_id_hex_roundtrip() {
        let id = PduId::from_bytes([0x42; 32]);
        let hex = id.to_hex();
        let recovered = PduId::from_hex(&hex).unwrap();
        assert_eq!(id, recovered);
    }

    #[test]
    fn test_record_key_distinct_per_file() {
        let a = RecordKey::new(ChatId::from("chat1"), FileRef::from("/a.prv"));
        let b = RecordKey::new(ChatId::from("chat1"), FileRef::from("/b.prv"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_chat_id_display() {
        let id = ChatId::from("chat-42");
        assert_eq!(format!("{}", id), "chat-42");
    }
}
