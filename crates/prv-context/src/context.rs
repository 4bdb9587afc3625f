//! The context object: one handle over profiles, ledger, and exchange.
//!
//! There is no global singleton; the application constructs a [`PrvContext`]
//! at startup and passes it to whoever needs it. All operations go through
//! the uniform [`ApiResult`] boundary and never panic across it.
//!
//! Locking: profile switches take the context write lock, every other
//! operation a read lock, so a switch admits no new work and drains what is
//! already in flight. Record-level mutual exclusion lives in the ledger.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use prv_core::{
    AccessRecord, AccessStatus, ChatId, Clock, FileRef, Profile, ProfileId, RecordKey,
};
use prv_ledger::{AccessLedger, LedgerError};
use prv_proto::{CryptoProvider, Pdu};
use prv_store::LedgerStore;

use crate::error::{ApiResult, ContextError, Result};
use crate::exchange::{ExchangeEngine, ProcessedMessage};
use crate::profiles::{ProfileStore, SwitchOutcome};

/// Cooperative cancellation flag.
///
/// Cancelling is effective only before the operation commits; afterwards it
/// is a no-op and the commit stands.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn check_cancel(cancel: Option<&CancelToken>) -> Result<()> {
    if cancel.is_some_and(CancelToken::is_cancelled) {
        return Err(ContextError::Cancelled);
    }
    Ok(())
}

/// A committed local mutation plus the PDU to send to the peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outbound {
    /// The record after the local transition.
    pub record: AccessRecord,
    /// Wire bytes of the signed PDU for the chat peer.
    pub pdu: Vec<u8>,
}

struct Kernel<S, P> {
    profiles: ProfileStore,
    ledger: AccessLedger<S>,
    engine: ExchangeEngine<P>,
}

/// The process-wide kernel handle.
pub struct PrvContext<S, P> {
    inner: RwLock<Option<Kernel<S, P>>>,
}

impl<S, P> Default for PrvContext<S, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, P> PrvContext<S, P> {
    /// An uninitialized context. Every operation except
    /// [`PrvContext::is_recognized_protocol_message`] and
    /// [`PrvContext::version`] fails `NotInitialized` until
    /// [`PrvContext::init`] runs.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// Crate version, for diagnostics.
    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Whether bytes look like protocol traffic. Pure prefix check; safe
    /// to call before initialization.
    pub fn is_recognized_protocol_message(&self, bytes: &[u8]) -> bool {
        Pdu::looks_like_pdu(bytes)
    }
}

async fn bounded<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(ContextError::Timeout),
    }
}

impl<S: LedgerStore, P: CryptoProvider> PrvContext<S, P> {
    /// Install the backend. Returns `true` on first initialization, `false`
    /// when the context was already initialized (no-op).
    pub async fn init(
        &self,
        store: Arc<S>,
        provider: Arc<P>,
        clock: Arc<dyn Clock>,
    ) -> ApiResult<bool> {
        let mut guard = self.inner.write().await;
        if guard.is_some() {
            return ApiResult::ok(false);
        }
        *guard = Some(Kernel {
            profiles: ProfileStore::new(),
            ledger: AccessLedger::new(store, clock.clone()),
            engine: ExchangeEngine::new(provider, clock),
        });
        info!("context initialized");
        ApiResult::ok(true)
    }

    /// Activate a profile, creating it on first reference.
    ///
    /// Takes the context write lock: no operation is admitted during the
    /// switch and in-flight ones drain first. The timeout bounds the drain;
    /// cancellation is honored until the registry is touched. Returns `true`
    /// when a switch happened, `false` when the profile was already active.
    pub async fn switch_profile(
        &self,
        username: &str,
        email: Option<&str>,
        user_id: Option<&str>,
        timeout: Duration,
        cancel: Option<&CancelToken>,
    ) -> ApiResult<bool> {
        let res = bounded(timeout, async {
            check_cancel(cancel)?;
            let mut guard = self.inner.write().await;
            let kernel = guard.as_mut().ok_or(ContextError::NotInitialized)?;
            check_cancel(cancel)?;
            let now = kernel.ledger.clock().now();
            Ok(match kernel.profiles.switch(username, email, user_id, now) {
                SwitchOutcome::AlreadyActive => false,
                SwitchOutcome::Activated { .. } => true,
            })
        })
        .await;
        res.into()
    }

    /// The currently active profile, if any.
    pub async fn active_profile(&self) -> ApiResult<Option<Profile>> {
        let guard = self.inner.read().await;
        let res = guard
            .as_ref()
            .ok_or(ContextError::NotInitialized)
            .map(|kernel| kernel.profiles.active().cloned());
        res.into()
    }

    /// All known profiles.
    pub async fn list_profiles(&self) -> ApiResult<Vec<Profile>> {
        let guard = self.inner.read().await;
        let res = guard
            .as_ref()
            .ok_or(ContextError::NotInitialized)
            .map(|kernel| kernel.profiles.list());
        res.into()
    }

    /// Build a peer-add request for a chat.
    pub async fn peer_add_request(&self, chat_id: &ChatId, timeout: Duration) -> ApiResult<Vec<u8>> {
        let guard = self.inner.read().await;
        let res = async {
            let kernel = guard.as_ref().ok_or(ContextError::NotInitialized)?;
            let profile = kernel.profiles.active_id()?;
            let me = kernel
                .profiles
                .active()
                .ok_or(ContextError::NoActiveProfile)?
                .clone();
            let (_, wire) = bounded(
                timeout,
                kernel.engine.peer_add_request(&profile, chat_id, &me),
            )
            .await?;
            Ok(wire.to_vec())
        }
        .await;
        res.into()
    }

    /// Answer a peer-add request.
    pub async fn peer_add_response(
        &self,
        chat_id: &ChatId,
        accepted: bool,
        reason: Option<String>,
        timeout: Duration,
    ) -> ApiResult<Vec<u8>> {
        let guard = self.inner.read().await;
        let res = async {
            let kernel = guard.as_ref().ok_or(ContextError::NotInitialized)?;
            let profile = kernel.profiles.active_id()?;
            let (_, wire) = bounded(
                timeout,
                kernel
                    .engine
                    .peer_add_response(&profile, chat_id, accepted, reason),
            )
            .await?;
            Ok(wire.to_vec())
        }
        .await;
        res.into()
    }

    /// Request access to a file: commits a `Requested` record locally and
    /// returns the PDU to send.
    pub async fn request_access(
        &self,
        chat_id: &ChatId,
        file: &FileRef,
        timeout: Duration,
    ) -> ApiResult<Outbound> {
        let guard = self.inner.read().await;
        let res = async {
            let kernel = guard.as_ref().ok_or(ContextError::NotInitialized)?;
            let profile = kernel.profiles.active_id()?;
            let key = RecordKey::new(chat_id.clone(), file.clone());
            bounded(timeout, async {
                // The PDU is built and signed before the ledger commits, so a
                // rejected draft leaves the record exactly as it was. A commit
                // failure after a successful build just discards the PDU.
                let (_, wire) = kernel.engine.access_request(&profile, chat_id, file).await?;
                let record = kernel.ledger.request_access(&profile, &key).await?;
                Ok(Outbound {
                    record,
                    pdu: wire.to_vec(),
                })
            })
            .await
        }
        .await;
        res.into()
    }

    /// Grant access with a duration and permission flags.
    pub async fn record_grant(
        &self,
        chat_id: &ChatId,
        file: &FileRef,
        duration_secs: u64,
        allow_download: bool,
        allow_forward: bool,
        timeout: Duration,
    ) -> ApiResult<Outbound> {
        let guard = self.inner.read().await;
        let res = async {
            let kernel = guard.as_ref().ok_or(ContextError::NotInitialized)?;
            let profile = kernel.profiles.active_id()?;
            let key = RecordKey::new(chat_id.clone(), file.clone());
            bounded(timeout, async {
                let (_, wire) = kernel
                    .engine
                    .access_grant(
                        &profile,
                        chat_id,
                        file,
                        duration_secs,
                        allow_download,
                        allow_forward,
                    )
                    .await?;
                let record = kernel
                    .ledger
                    .record_grant(&profile, &key, duration_secs, allow_download, allow_forward)
                    .await?;
                Ok(Outbound {
                    record,
                    pdu: wire.to_vec(),
                })
            })
            .await
        }
        .await;
        res.into()
    }

    /// Deny a pending request.
    pub async fn record_denial(
        &self,
        chat_id: &ChatId,
        file: &FileRef,
        status_code: Option<i64>,
        timeout: Duration,
    ) -> ApiResult<Outbound> {
        let guard = self.inner.read().await;
        let res = async {
            let kernel = guard.as_ref().ok_or(ContextError::NotInitialized)?;
            let profile = kernel.profiles.active_id()?;
            let key = RecordKey::new(chat_id.clone(), file.clone());
            bounded(timeout, async {
                let (_, wire) = kernel
                    .engine
                    .access_deny(&profile, chat_id, file, status_code)
                    .await?;
                let record = kernel
                    .ledger
                    .record_denial(&profile, &key, status_code)
                    .await?;
                Ok(Outbound {
                    record,
                    pdu: wire.to_vec(),
                })
            })
            .await
        }
        .await;
        res.into()
    }

    /// Revoke an active grant.
    pub async fn record_revocation(
        &self,
        chat_id: &ChatId,
        file: &FileRef,
        reason: Option<String>,
        timeout: Duration,
    ) -> ApiResult<Outbound> {
        let guard = self.inner.read().await;
        let res = async {
            let kernel = guard.as_ref().ok_or(ContextError::NotInitialized)?;
            let profile = kernel.profiles.active_id()?;
            let key = RecordKey::new(chat_id.clone(), file.clone());
            bounded(timeout, async {
                let (_, wire) = kernel
                    .engine
                    .access_revoke(&profile, chat_id, file, reason)
                    .await?;
                let record = kernel.ledger.record_revocation(&profile, &key).await?;
                Ok(Outbound {
                    record,
                    pdu: wire.to_vec(),
                })
            })
            .await
        }
        .await;
        res.into()
    }

    /// Mark a file deleted from storage.
    pub async fn record_file_deleted(
        &self,
        chat_id: &ChatId,
        file: &FileRef,
        timeout: Duration,
    ) -> ApiResult<Outbound> {
        let guard = self.inner.read().await;
        let res = async {
            let kernel = guard.as_ref().ok_or(ContextError::NotInitialized)?;
            let profile = kernel.profiles.active_id()?;
            let key = RecordKey::new(chat_id.clone(), file.clone());
            bounded(timeout, async {
                let (_, wire) = kernel.engine.file_deleted(&profile, chat_id, file).await?;
                let record = kernel.ledger.record_file_deleted(&profile, &key).await?;
                Ok(Outbound {
                    record,
                    pdu: wire.to_vec(),
                })
            })
            .await
        }
        .await;
        res.into()
    }

    /// Process one inbound message: decode, verify, and apply exactly one
    /// transition (or a chat-registry update for peer-add traffic).
    ///
    /// Cancellation is honored between decode and commit; once the ledger
    /// transition has committed, cancelling is a no-op.
    pub async fn process_message(
        &self,
        bytes: &[u8],
        timeout: Duration,
        cancel: Option<&CancelToken>,
    ) -> ApiResult<ProcessedMessage> {
        let guard = self.inner.read().await;
        let res = async {
            let kernel = guard.as_ref().ok_or(ContextError::NotInitialized)?;
            let profile = kernel.profiles.active_id()?;
            check_cancel(cancel)?;
            bounded(timeout, async {
                let decoded = kernel.engine.decode(bytes).await?;
                check_cancel(cancel)?;
                kernel
                    .engine
                    .apply(&profile, &kernel.ledger, &decoded.pdu)
                    .await
            })
            .await
        }
        .await;
        res.into()
    }

    /// Current access status for a file, lazy expiry resolved. Read-only.
    pub async fn get_file_access_status(
        &self,
        chat_id: &ChatId,
        file: &FileRef,
        timeout: Duration,
    ) -> ApiResult<AccessRecord> {
        let guard = self.inner.read().await;
        let res = async {
            let kernel = guard.as_ref().ok_or(ContextError::NotInitialized)?;
            let profile = kernel.profiles.active_id()?;
            let key = RecordKey::new(chat_id.clone(), file.clone());
            bounded(timeout, async {
                Ok(kernel.ledger.query_status(&profile, &key).await?)
            })
            .await
        }
        .await;
        res.into()
    }

    /// Whether a chat is protected: a completed/received peer-add
    /// handshake, or any access record under the chat.
    pub async fn is_chat_protected(&self, chat_id: &ChatId, timeout: Duration) -> ApiResult<bool> {
        let guard = self.inner.read().await;
        let res = async {
            let kernel = guard.as_ref().ok_or(ContextError::NotInitialized)?;
            let profile = kernel.profiles.active_id()?;
            if kernel.engine.is_chat_protected(&profile, chat_id) {
                return Ok(true);
            }
            bounded(timeout, async {
                Ok(!kernel.ledger.list_chat(&profile, chat_id).await?.is_empty())
            })
            .await
        }
        .await;
        res.into()
    }

    /// Mark every record under a chat `Deleted` and forget its peer state.
    /// Returns how many records changed.
    pub async fn delete_chat(&self, chat_id: &ChatId, timeout: Duration) -> ApiResult<u64> {
        let guard = self.inner.read().await;
        let res = async {
            let kernel = guard.as_ref().ok_or(ContextError::NotInitialized)?;
            let profile = kernel.profiles.active_id()?;
            let affected = bounded(timeout, async {
                Ok(kernel.ledger.delete_chat(&profile, chat_id).await?)
            })
            .await?;
            kernel.engine.forget_chat(&profile, chat_id);
            Ok(affected)
        }
        .await;
        res.into()
    }

    /// Seal a file payload to the chat peer, producing the PRV envelope.
    ///
    /// Requires a completed peer-add handshake (the peer's seal key).
    pub async fn seal_file(
        &self,
        chat_id: &ChatId,
        file: &FileRef,
        plaintext: &[u8],
        timeout: Duration,
    ) -> ApiResult<Vec<u8>> {
        let guard = self.inner.read().await;
        let res = async {
            let kernel = guard.as_ref().ok_or(ContextError::NotInitialized)?;
            let profile = kernel.profiles.active_id()?;
            let recipient = kernel
                .engine
                .peer_seal_key(&profile, chat_id)
                .ok_or_else(|| ContextError::NoPeerKey(chat_id.clone()))?;
            let context = RecordKey::new(chat_id.clone(), file.clone()).to_string();
            let envelope = bounded(timeout, async {
                Ok(kernel
                    .engine
                    .provider()
                    .seal_file(plaintext, &recipient, context.as_bytes())
                    .await?)
            })
            .await?;
            Ok(envelope.to_vec())
        }
        .await;
        res.into()
    }

    /// Open a PRV envelope. Requires an `Active` access record for the
    /// (chat, file) pair; expiry is enforced here, lazily.
    pub async fn open_file(
        &self,
        chat_id: &ChatId,
        file: &FileRef,
        envelope: &[u8],
        timeout: Duration,
    ) -> ApiResult<Vec<u8>> {
        let guard = self.inner.read().await;
        let res = async {
            let kernel = guard.as_ref().ok_or(ContextError::NotInitialized)?;
            let profile = kernel.profiles.active_id()?;
            let key = RecordKey::new(chat_id.clone(), file.clone());

            let record = kernel.ledger.query_status(&profile, &key).await?;
            if record.status != AccessStatus::Active {
                return Err(ContextError::Ledger(LedgerError::InvalidTransition {
                    key,
                    from: record.status,
                    event: "open_file",
                }));
            }

            let context = key.to_string();
            bounded(timeout, async {
                Ok(kernel
                    .engine
                    .provider()
                    .open_file(envelope, context.as_bytes())
                    .await?)
            })
            .await
        }
        .await;
        res.into()
    }
}
