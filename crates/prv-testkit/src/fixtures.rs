//! Ready-made test setups.

use std::sync::Arc;
use std::time::Duration;

use prv_core::{ChatId, FileRef, ManualClock, ProfileId, RecordKey};
use prv_context::PrvContext;
use prv_ledger::AccessLedger;
use prv_proto::Ed25519Provider;
use prv_store::MemoryStore;

/// Generous deadline for test operations; nothing in-memory should come
/// close to it.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Install a log subscriber that writes through the test harness.
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    use std::sync::Once;
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// Epoch the manual clocks start at.
pub const TEST_EPOCH: i64 = 1_700_000_000;

/// A record key under the default test chat.
pub fn test_key(file: &str) -> RecordKey {
    RecordKey::new(test_chat(), FileRef::from(file))
}

/// The default test chat.
pub fn test_chat() -> ChatId {
    ChatId::from("chat1")
}

/// The default test profile id.
pub fn test_profile() -> ProfileId {
    ProfileId::from("alice")
}

/// A ledger over an in-memory store with a manual clock.
pub fn memory_ledger() -> (AccessLedger<MemoryStore>, Arc<ManualClock>) {
    let clock = ManualClock::at(TEST_EPOCH);
    let ledger = AccessLedger::new(Arc::new(MemoryStore::new()), clock.clone());
    (ledger, clock)
}

/// An initialized context with the "alice" profile active.
pub async fn ready_context() -> (
    PrvContext<MemoryStore, Ed25519Provider>,
    Arc<ManualClock>,
) {
    init_tracing();
    let clock = ManualClock::at(TEST_EPOCH);
    let ctx = PrvContext::new();
    let init = ctx
        .init(
            Arc::new(MemoryStore::new()),
            Arc::new(Ed25519Provider::generate()),
            clock.clone(),
        )
        .await;
    assert!(init.success, "context init failed: {:?}", init.error);

    let switched = ctx
        .switch_profile("alice", Some("alice@example.org"), None, TEST_TIMEOUT, None)
        .await;
    assert!(switched.success, "profile switch failed: {:?}", switched.error);

    (ctx, clock)
}

/// Two contexts sharing a clock, wired as chat peers ("alice" and "bob")
/// with the peer-add handshake already completed.
pub async fn paired_contexts() -> (
    PrvContext<MemoryStore, Ed25519Provider>,
    PrvContext<MemoryStore, Ed25519Provider>,
    Arc<ManualClock>,
) {
    init_tracing();
    let clock = ManualClock::at(TEST_EPOCH);

    let alice = PrvContext::new();
    assert!(
        alice
            .init(
                Arc::new(MemoryStore::new()),
                Arc::new(Ed25519Provider::generate()),
                clock.clone(),
            )
            .await
            .success
    );
    assert!(
        alice
            .switch_profile("alice", None, None, TEST_TIMEOUT, None)
            .await
            .success
    );

    let bob = PrvContext::new();
    assert!(
        bob.init(
            Arc::new(MemoryStore::new()),
            Arc::new(Ed25519Provider::generate()),
            clock.clone(),
        )
        .await
        .success
    );
    assert!(
        bob.switch_profile("bob", None, None, TEST_TIMEOUT, None)
            .await
            .success
    );

    let chat = test_chat();

    let request = alice.peer_add_request(&chat, TEST_TIMEOUT).await;
    let wire = request.data.expect("peer-add request");
    assert!(bob.process_message(&wire, TEST_TIMEOUT, None).await.success);

    let response = bob.peer_add_response(&chat, true, None, TEST_TIMEOUT).await;
    let wire = response.data.expect("peer-add response");
    assert!(alice.process_message(&wire, TEST_TIMEOUT, None).await.success);

    (alice, bob, clock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ready_context_has_active_profile() {
        let (ctx, _) = ready_context().await;
        let active = ctx.active_profile().await.data.flatten();
        assert_eq!(active.map(|p| p.username), Some("alice".to_string()));
    }

    #[tokio::test]
    async fn test_paired_contexts_are_protected() {
        let (alice, bob, _) = paired_contexts().await;
        assert_eq!(
            alice.is_chat_protected(&test_chat(), TEST_TIMEOUT).await.data,
            Some(true)
        );
        assert_eq!(
            bob.is_chat_protected(&test_chat(), TEST_TIMEOUT).await.data,
            Some(true)
        );
    }
}
