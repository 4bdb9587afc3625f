//! Protocol exchange engine.
//!
//! Builds outbound PDUs (signed, sequence-numbered per chat) and routes
//! inbound ones: peer-add traffic updates the chat registry, access traffic
//! drives exactly one ledger transition.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use prv_core::{ChatId, Clock, FileRef, Profile, ProfileId, RecordKey};
use prv_ledger::{AccessEvent, AccessLedger};
use prv_proto::{CryptoProvider, DecodedPdu, Pdu, PduBody, PduDraft, X25519PublicKey};
use prv_store::LedgerStore;

use crate::error::{ContextError, Result};

/// What processing an inbound PDU did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProcessedMessage {
    /// A peer asked to establish a protected chat.
    PeerAddRequested {
        /// The chat the request arrived on.
        chat_id: ChatId,
        /// Display name of the requesting peer.
        peer_name: String,
    },
    /// A peer answered our peer-add request.
    PeerAddDecided {
        /// The chat the response arrived on.
        chat_id: ChatId,
        /// Whether the peer accepted.
        accepted: bool,
    },
    /// An access event was applied; this is the resulting record.
    RecordUpdated(prv_core::AccessRecord),
}

#[derive(Debug, Default, Clone)]
struct ChatPeer {
    seal_key: Option<X25519PublicKey>,
    protected: bool,
}

type ChatKey = (ProfileId, ChatId);

/// Builds and consumes PDUs on behalf of the active profile.
pub struct ExchangeEngine<P> {
    provider: Arc<P>,
    clock: Arc<dyn Clock>,
    seqs: StdMutex<HashMap<ChatKey, u64>>,
    chats: StdMutex<HashMap<ChatKey, ChatPeer>>,
}

impl<P: CryptoProvider> ExchangeEngine<P> {
    /// Build an engine over a crypto provider.
    pub fn new(provider: Arc<P>, clock: Arc<dyn Clock>) -> Self {
        Self {
            provider,
            clock,
            seqs: StdMutex::new(HashMap::new()),
            chats: StdMutex::new(HashMap::new()),
        }
    }

    /// The engine's crypto provider.
    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    fn next_seq(&self, profile: &ProfileId, chat_id: &ChatId) -> u64 {
        let mut seqs = match self.seqs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let seq = seqs
            .entry((profile.clone(), chat_id.clone()))
            .or_insert(0);
        *seq += 1;
        *seq
    }

    fn with_chat<R>(
        &self,
        profile: &ProfileId,
        chat_id: &ChatId,
        f: impl FnOnce(&mut ChatPeer) -> R,
    ) -> R {
        let mut chats = match self.chats.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = chats
            .entry((profile.clone(), chat_id.clone()))
            .or_default();
        f(entry)
    }

    async fn build(
        &self,
        profile: &ProfileId,
        chat_id: &ChatId,
        body: PduBody,
    ) -> Result<(Pdu, Bytes)> {
        let draft = PduDraft::new(
            chat_id.clone(),
            self.next_seq(profile, chat_id),
            self.clock.now(),
            body,
        );
        debug!(chat = %chat_id, kind = draft.body.kind_str(), seq = draft.seq, "building PDU");
        Ok(self.provider.encode_pdu(draft).await?)
    }

    /// Build a peer-add request carrying our seal key.
    pub async fn peer_add_request(
        &self,
        profile: &ProfileId,
        chat_id: &ChatId,
        me: &Profile,
    ) -> Result<(Pdu, Bytes)> {
        self.with_chat(profile, chat_id, |_| ());
        self.build(
            profile,
            chat_id,
            PduBody::PeerAddRequest {
                peer_name: me.username.clone(),
                peer_email: me.email.clone(),
                peer_id: me.user_id.clone(),
                seal_key: *self.provider.seal_key().as_bytes(),
            },
        )
        .await
    }

    /// Build a peer-add response. Accepting marks the chat protected and
    /// includes our seal key.
    pub async fn peer_add_response(
        &self,
        profile: &ProfileId,
        chat_id: &ChatId,
        accepted: bool,
        reason: Option<String>,
    ) -> Result<(Pdu, Bytes)> {
        if accepted {
            self.with_chat(profile, chat_id, |peer| peer.protected = true);
        }
        let seal_key = accepted.then(|| *self.provider.seal_key().as_bytes());
        self.build(
            profile,
            chat_id,
            PduBody::PeerAddResponse {
                accepted,
                reason,
                seal_key,
            },
        )
        .await
    }

    /// Build an access-request PDU.
    pub async fn access_request(
        &self,
        profile: &ProfileId,
        chat_id: &ChatId,
        file: &FileRef,
    ) -> Result<(Pdu, Bytes)> {
        self.build(
            profile,
            chat_id,
            PduBody::AccessRequest { file: file.clone() },
        )
        .await
    }

    /// Build an access-grant PDU.
    pub async fn access_grant(
        &self,
        profile: &ProfileId,
        chat_id: &ChatId,
        file: &FileRef,
        duration_secs: u64,
        allow_download: bool,
        allow_forward: bool,
    ) -> Result<(Pdu, Bytes)> {
        self.build(
            profile,
            chat_id,
            PduBody::AccessGrant {
                file: file.clone(),
                duration_secs,
                allow_download,
                allow_forward,
            },
        )
        .await
    }

    /// Build an access-deny PDU.
    pub async fn access_deny(
        &self,
        profile: &ProfileId,
        chat_id: &ChatId,
        file: &FileRef,
        status_code: Option<i64>,
    ) -> Result<(Pdu, Bytes)> {
        self.build(
            profile,
            chat_id,
            PduBody::AccessDeny {
                file: file.clone(),
                status_code,
            },
        )
        .await
    }

    /// Build an access-revoke PDU.
    pub async fn access_revoke(
        &self,
        profile: &ProfileId,
        chat_id: &ChatId,
        file: &FileRef,
        reason: Option<String>,
    ) -> Result<(Pdu, Bytes)> {
        self.build(
            profile,
            chat_id,
            PduBody::AccessRevoke {
                file: file.clone(),
                reason,
            },
        )
        .await
    }

    /// Build a file-deleted PDU.
    pub async fn file_deleted(
        &self,
        profile: &ProfileId,
        chat_id: &ChatId,
        file: &FileRef,
    ) -> Result<(Pdu, Bytes)> {
        self.build(
            profile,
            chat_id,
            PduBody::FileDeleted { file: file.clone() },
        )
        .await
    }

    /// Decode and signature-check inbound bytes. No state changes.
    pub async fn decode(&self, bytes: &[u8]) -> Result<DecodedPdu> {
        Ok(self.provider.decode_pdu(bytes).await?)
    }

    /// Route a decoded PDU: update the chat registry or apply exactly one
    /// ledger transition.
    pub async fn apply<S: LedgerStore>(
        &self,
        profile: &ProfileId,
        ledger: &AccessLedger<S>,
        pdu: &Pdu,
    ) -> Result<ProcessedMessage> {
        match &pdu.body {
            PduBody::PeerAddRequest {
                peer_name,
                seal_key,
                ..
            } => {
                self.with_chat(profile, &pdu.chat_id, |peer| {
                    peer.seal_key = Some(X25519PublicKey::from_bytes(*seal_key));
                    peer.protected = true;
                });
                Ok(ProcessedMessage::PeerAddRequested {
                    chat_id: pdu.chat_id.clone(),
                    peer_name: peer_name.clone(),
                })
            }

            PduBody::PeerAddResponse {
                accepted,
                seal_key,
                ..
            } => {
                if *accepted {
                    self.with_chat(profile, &pdu.chat_id, |peer| {
                        peer.seal_key = seal_key.map(X25519PublicKey::from_bytes);
                        peer.protected = true;
                    });
                } else {
                    warn!(chat = %pdu.chat_id, "peer declined protected chat");
                }
                Ok(ProcessedMessage::PeerAddDecided {
                    chat_id: pdu.chat_id.clone(),
                    accepted: *accepted,
                })
            }

            body => {
                let file = body
                    .file()
                    .ok_or_else(|| {
                        ContextError::Proto(prv_proto::ProtoError::Malformed(
                            "access PDU without a file".into(),
                        ))
                    })?
                    .clone();
                let key = RecordKey::new(pdu.chat_id.clone(), file);
                let event = match body {
                    PduBody::AccessRequest { .. } => AccessEvent::Request,
                    PduBody::AccessGrant {
                        duration_secs,
                        allow_download,
                        allow_forward,
                        ..
                    } => AccessEvent::Grant {
                        duration_secs: *duration_secs,
                        allow_download: *allow_download,
                        allow_forward: *allow_forward,
                    },
                    PduBody::AccessDeny { status_code, .. } => AccessEvent::Deny {
                        status_code: *status_code,
                    },
                    PduBody::AccessRevoke { .. } => AccessEvent::Revoke,
                    PduBody::FileDeleted { .. } => AccessEvent::FileDeleted,
                    // Handled above.
                    PduBody::PeerAddRequest { .. } | PduBody::PeerAddResponse { .. } => {
                        unreachable!("peer-add bodies are routed before this match")
                    }
                };
                let record = ledger.apply_pdu(profile, &key, pdu.seq, &event).await?;
                Ok(ProcessedMessage::RecordUpdated(record))
            }
        }
    }

    /// Whether the chat has completed (or received) a peer-add handshake.
    pub fn is_chat_protected(&self, profile: &ProfileId, chat_id: &ChatId) -> bool {
        let chats = match self.chats.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        chats
            .get(&(profile.clone(), chat_id.clone()))
            .is_some_and(|peer| peer.protected)
    }

    /// The seal key of the chat peer, if the handshake delivered one.
    pub fn peer_seal_key(&self, profile: &ProfileId, chat_id: &ChatId) -> Option<X25519PublicKey> {
        let chats = match self.chats.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        chats
            .get(&(profile.clone(), chat_id.clone()))
            .and_then(|peer| peer.seal_key)
    }

    /// Drop the chat from the registry (chat deletion).
    pub fn forget_chat(&self, profile: &ProfileId, chat_id: &ChatId) {
        let mut chats = match self.chats.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        chats.remove(&(profile.clone(), chat_id.clone()));
    }
}
