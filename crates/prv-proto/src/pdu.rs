//! Protocol data units.
//!
//! A PDU is one access-control event on the wire: a signed envelope around
//! a tagged body. The encoding is CBOR behind a fixed magic prefix, which
//! lets message transports recognize protocol traffic without attempting a
//! full decode.

use serde::{Deserialize, Serialize};

use prv_core::{Blake3Hash, ChatId, Ed25519PublicKey, Ed25519Signature, FileRef, Keypair, PduId};

use crate::error::{ProtoError, Result};

/// Magic prefix on every wire-encoded PDU.
pub const WIRE_MAGIC: &[u8; 4] = b"PRV\x01";

/// Current wire version.
pub const WIRE_VERSION: u8 = 1;

/// Domain prefix mixed into every signature, so PDU signatures can never be
/// confused with signatures over other data.
pub const SIGN_DOMAIN: &[u8] = b"prv/pdu-sig/v1";

/// Wire size limits.
pub mod limits {
    /// Max encoded PDU size.
    pub const MAX_PDU_BYTES: usize = 64 * 1024;
    /// Max peer name length.
    pub const MAX_NAME_LEN: usize = 256;
    /// Max denial/revocation reason length.
    pub const MAX_REASON_LEN: usize = 512;
}

/// The event a PDU carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PduBody {
    /// Ask a peer to establish a protected chat.
    PeerAddRequest {
        /// Display name of the requesting peer.
        peer_name: String,
        /// Optional email.
        peer_email: Option<String>,
        /// Optional external id.
        peer_id: Option<String>,
        /// X25519 key files will be wrapped to, raw bytes.
        seal_key: [u8; 32],
    },

    /// Answer to a PeerAddRequest.
    PeerAddResponse {
        /// Whether the peer accepted.
        accepted: bool,
        /// Optional rejection reason.
        reason: Option<String>,
        /// Responder's X25519 seal key, present when accepted.
        seal_key: Option<[u8; 32]>,
    },

    /// A peer requests access to a file.
    AccessRequest {
        /// The file being requested.
        file: FileRef,
    },

    /// The owner grants access.
    AccessGrant {
        /// The granted file.
        file: FileRef,
        /// Access duration in seconds, from the grant time.
        duration_secs: u64,
        /// Whether download is allowed.
        allow_download: bool,
        /// Whether forwarding is allowed.
        allow_forward: bool,
    },

    /// The owner denies a pending request.
    AccessDeny {
        /// The denied file.
        file: FileRef,
        /// Optional diagnostic code, not used for logic.
        status_code: Option<i64>,
    },

    /// The owner revokes an active grant.
    AccessRevoke {
        /// The revoked file.
        file: FileRef,
        /// Reason shown to the peer.
        reason: Option<String>,
    },

    /// The backing file was removed from storage.
    FileDeleted {
        /// The removed file.
        file: FileRef,
    },
}

impl PduBody {
    /// The file this event concerns, if any.
    pub fn file(&self) -> Option<&FileRef> {
        match self {
            PduBody::AccessRequest { file }
            | PduBody::AccessGrant { file, .. }
            | PduBody::AccessDeny { file, .. }
            | PduBody::AccessRevoke { file, .. }
            | PduBody::FileDeleted { file } => Some(file),
            PduBody::PeerAddRequest { .. } | PduBody::PeerAddResponse { .. } => None,
        }
    }

    /// Stable name for logs.
    pub fn kind_str(&self) -> &'static str {
        match self {
            PduBody::PeerAddRequest { .. } => "peer_add_request",
            PduBody::PeerAddResponse { .. } => "peer_add_response",
            PduBody::AccessRequest { .. } => "access_request",
            PduBody::AccessGrant { .. } => "access_grant",
            PduBody::AccessDeny { .. } => "access_deny",
            PduBody::AccessRevoke { .. } => "access_revoke",
            PduBody::FileDeleted { .. } => "file_deleted",
        }
    }

    fn validate_limits(&self) -> Result<()> {
        let too_long = |s: &str, max: usize| s.len() > max;
        match self {
            PduBody::PeerAddRequest {
                peer_name,
                peer_email,
                ..
            } => {
                if too_long(peer_name, limits::MAX_NAME_LEN)
                    || peer_email
                        .as_deref()
                        .is_some_and(|e| too_long(e, limits::MAX_NAME_LEN))
                {
                    return Err(ProtoError::Malformed("peer name/email too long".into()));
                }
            }
            PduBody::PeerAddResponse { reason, .. } | PduBody::AccessRevoke { reason, .. } => {
                if reason
                    .as_deref()
                    .is_some_and(|r| too_long(r, limits::MAX_REASON_LEN))
                {
                    return Err(ProtoError::Malformed("reason too long".into()));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// The unsigned fields of a PDU, as assembled by the exchange engine
/// before handing them to the crypto provider for signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PduDraft {
    /// The chat the event belongs to.
    pub chat_id: ChatId,
    /// Monotonic per-(sender, chat) sequence number.
    pub seq: u64,
    /// Sender-claimed timestamp, epoch seconds.
    pub timestamp: i64,
    /// The event.
    pub body: PduBody,
}

impl PduDraft {
    /// Assemble a draft.
    pub fn new(chat_id: ChatId, seq: u64, timestamp: i64, body: PduBody) -> Self {
        Self {
            chat_id,
            seq,
            timestamp,
            body,
        }
    }
}

/// A signed PDU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pdu {
    /// Wire version.
    pub version: u8,
    /// Signing key of the sender.
    pub sender: Ed25519PublicKey,
    /// The chat the event belongs to.
    pub chat_id: ChatId,
    /// Monotonic per-(sender, chat) sequence number.
    pub seq: u64,
    /// Sender-claimed timestamp, epoch seconds.
    pub timestamp: i64,
    /// The event.
    pub body: PduBody,
    /// Signature over the domain-prefixed signable bytes.
    pub signature: Ed25519Signature,
}

fn cbor_encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| ProtoError::Malformed(format!("CBOR encode: {e}")))?;
    Ok(buf)
}

impl Pdu {
    /// Sign a draft, producing a complete PDU.
    pub fn sign(draft: PduDraft, keypair: &Keypair) -> Result<Self> {
        draft.body.validate_limits()?;
        let sender = keypair.public_key();
        let message = signable_bytes(&sender, &draft)?;
        let signature = keypair.sign(&message);
        Ok(Self {
            version: WIRE_VERSION,
            sender,
            chat_id: draft.chat_id,
            seq: draft.seq,
            timestamp: draft.timestamp,
            body: draft.body,
            signature,
        })
    }

    /// Verify the embedded signature against the sender key.
    pub fn verify(&self) -> Result<()> {
        let draft = PduDraft {
            chat_id: self.chat_id.clone(),
            seq: self.seq,
            timestamp: self.timestamp,
            body: self.body.clone(),
        };
        let message = signable_bytes(&self.sender, &draft)?;
        self.sender
            .verify(&message, &self.signature)
            .map_err(|_| ProtoError::SignatureInvalid)
    }

    /// Encode to wire bytes: magic prefix followed by CBOR.
    pub fn to_wire(&self) -> Result<Vec<u8>> {
        self.body.validate_limits()?;
        let mut out = WIRE_MAGIC.to_vec();
        out.extend_from_slice(&cbor_encode(self)?);
        if out.len() > limits::MAX_PDU_BYTES {
            return Err(ProtoError::TooLarge(out.len()));
        }
        Ok(out)
    }

    /// Decode from wire bytes. Does NOT verify the signature.
    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > limits::MAX_PDU_BYTES {
            return Err(ProtoError::TooLarge(bytes.len()));
        }
        let payload = bytes
            .strip_prefix(WIRE_MAGIC.as_slice())
            .ok_or_else(|| ProtoError::Malformed("missing wire magic".into()))?;
        let pdu: Pdu = ciborium::from_reader(payload)
            .map_err(|e| ProtoError::Malformed(format!("CBOR decode: {e}")))?;
        if pdu.version != WIRE_VERSION {
            return Err(ProtoError::UnsupportedVersion(pdu.version));
        }
        pdu.body.validate_limits()?;
        Ok(pdu)
    }

    /// Content address of this PDU.
    pub fn id(&self) -> Result<PduId> {
        let wire = self.to_wire()?;
        Ok(PduId(*Blake3Hash::hash(&wire).as_bytes()))
    }

    /// Cheap check whether bytes could be a PDU, without decoding.
    pub fn looks_like_pdu(bytes: &[u8]) -> bool {
        bytes.starts_with(WIRE_MAGIC)
    }
}

fn signable_bytes(sender: &Ed25519PublicKey, draft: &PduDraft) -> Result<Vec<u8>> {
    let mut out = SIGN_DOMAIN.to_vec();
    out.extend_from_slice(&cbor_encode(&(sender, draft))?);
    Ok(out)
}
