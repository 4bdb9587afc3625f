//! End-to-end flows through the context facade: two peers exchanging
//! access-control PDUs over a simulated transport (byte slices).

use std::sync::Arc;

use prv_core::{AccessStatus, ErrorKind, FileRef, ManualClock};
use prv_context::{CancelToken, ProcessedMessage, PrvContext};
use prv_proto::Ed25519Provider;
use prv_store::MemoryStore;
use prv_testkit::fixtures::{paired_contexts, ready_context, test_chat, TEST_TIMEOUT};

fn file() -> FileRef {
    FileRef::from("/contract.prv")
}

#[tokio::test]
async fn test_operations_before_init_fail_closed() {
    let ctx: PrvContext<MemoryStore, Ed25519Provider> = PrvContext::new();

    let res = ctx
        .get_file_access_status(&test_chat(), &file(), TEST_TIMEOUT)
        .await;
    assert!(!res.success);
    assert_eq!(
        res.error.map(|e| e.kind),
        Some(ErrorKind::NotInitialized)
    );

    // The byte sniff works without a backend.
    assert!(!ctx.is_recognized_protocol_message(b"plain text"));
}

#[tokio::test]
async fn test_operations_without_profile_fail_closed() {
    let ctx: PrvContext<MemoryStore, Ed25519Provider> = PrvContext::new();
    let init = ctx
        .init(
            Arc::new(MemoryStore::new()),
            Arc::new(Ed25519Provider::generate()),
            ManualClock::at(1000),
        )
        .await;
    assert_eq!(init.data, Some(true));

    let res = ctx.request_access(&test_chat(), &file(), TEST_TIMEOUT).await;
    assert_eq!(
        res.error.map(|e| e.kind),
        Some(ErrorKind::NoActiveProfile)
    );
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let (ctx, clock) = ready_context().await;
    let again = ctx
        .init(
            Arc::new(MemoryStore::new()),
            Arc::new(Ed25519Provider::generate()),
            clock,
        )
        .await;
    // Second init is a no-op: the original backend stays.
    assert_eq!(again.data, Some(false));
    assert!(ctx.active_profile().await.data.flatten().is_some());
}

#[tokio::test]
async fn test_request_grant_expiry_scenario() {
    let (alice, bob, clock) = paired_contexts().await;
    let chat = test_chat();

    // Bob requests access; Alice's ledger records it.
    let req = bob.request_access(&chat, &file(), TEST_TIMEOUT).await;
    let outbound = req.data.expect("request should succeed");
    assert_eq!(outbound.record.status, AccessStatus::Requested);

    let processed = alice
        .process_message(&outbound.pdu, TEST_TIMEOUT, None)
        .await;
    assert!(processed.success);

    let status = alice.get_file_access_status(&chat, &file(), TEST_TIMEOUT).await;
    assert_eq!(status.data.unwrap().status, AccessStatus::Requested);

    // Alice grants for an hour, download only.
    let grant = alice
        .record_grant(&chat, &file(), 3600, true, false, TEST_TIMEOUT)
        .await;
    let outbound = grant.data.expect("grant should succeed");
    assert_eq!(outbound.record.status, AccessStatus::Active);
    assert!(outbound.record.permissions.download_allowed());
    assert!(!outbound.record.permissions.forward_allowed());

    // Bob applies the grant to his replica.
    let processed = bob.process_message(&outbound.pdu, TEST_TIMEOUT, None).await;
    let Some(ProcessedMessage::RecordUpdated(record)) = processed.data else {
        panic!("expected a record update, got {:?}", processed);
    };
    assert_eq!(record.status, AccessStatus::Active);
    let expiry = record.expiry_time.expect("grant sets expiry");

    // One second past expiry, both sides read Expired without a sweeper.
    clock.set(expiry + 1);
    let status = bob.get_file_access_status(&chat, &file(), TEST_TIMEOUT).await;
    assert_eq!(status.data.unwrap().status, AccessStatus::Expired);
    let status = alice.get_file_access_status(&chat, &file(), TEST_TIMEOUT).await;
    assert_eq!(status.data.unwrap().status, AccessStatus::Expired);
}

#[tokio::test]
async fn test_replayed_grant_pdu_is_idempotent() {
    let (alice, bob, _) = paired_contexts().await;
    let chat = test_chat();

    let req = bob.request_access(&chat, &file(), TEST_TIMEOUT).await;
    let request_wire = req.data.unwrap().pdu;
    alice
        .process_message(&request_wire, TEST_TIMEOUT, None)
        .await;

    let grant = alice
        .record_grant(&chat, &file(), 3600, true, false, TEST_TIMEOUT)
        .await;
    let grant_wire = grant.data.unwrap().pdu;

    let first = bob.process_message(&grant_wire, TEST_TIMEOUT, None).await;
    let second = bob.process_message(&grant_wire, TEST_TIMEOUT, None).await;
    assert!(first.success && second.success);

    let (Some(ProcessedMessage::RecordUpdated(a)), Some(ProcessedMessage::RecordUpdated(b))) =
        (first.data, second.data)
    else {
        panic!("expected record updates");
    };
    // No double transition: same record both times.
    assert_eq!(a.status, b.status);
    assert_eq!(a.version, b.version);
    assert_eq!(a.expiry_time, b.expiry_time);
}

#[tokio::test]
async fn test_redenial_is_invalid_transition() {
    let (alice, bob, _) = paired_contexts().await;
    let chat = test_chat();

    let req = bob.request_access(&chat, &file(), TEST_TIMEOUT).await;
    alice
        .process_message(&req.data.unwrap().pdu, TEST_TIMEOUT, None)
        .await;

    let first = alice
        .record_denial(&chat, &file(), Some(403), TEST_TIMEOUT)
        .await;
    assert_eq!(
        first.data.unwrap().record.status,
        AccessStatus::Denied
    );

    let second = alice.record_denial(&chat, &file(), None, TEST_TIMEOUT).await;
    assert_eq!(
        second.error.map(|e| e.kind),
        Some(ErrorKind::InvalidTransition)
    );

    // The failed call left the record untouched.
    let status = alice.get_file_access_status(&chat, &file(), TEST_TIMEOUT).await;
    let record = status.data.unwrap();
    assert_eq!(record.status, AccessStatus::Denied);
    assert_eq!(record.status_code, Some(403));
}

#[tokio::test]
async fn test_revoked_grant_blocks_open() {
    let (alice, bob, _) = paired_contexts().await;
    let chat = test_chat();

    // Alice seals a file to Bob and grants access.
    let sealed = alice
        .seal_file(&chat, &file(), b"the payload", TEST_TIMEOUT)
        .await;
    let envelope = sealed.data.expect("sealing should succeed");

    let req = bob.request_access(&chat, &file(), TEST_TIMEOUT).await;
    alice
        .process_message(&req.data.unwrap().pdu, TEST_TIMEOUT, None)
        .await;
    let grant = alice
        .record_grant(&chat, &file(), 3600, true, false, TEST_TIMEOUT)
        .await;
    bob.process_message(&grant.data.unwrap().pdu, TEST_TIMEOUT, None)
        .await;

    // Active: Bob opens the envelope.
    let opened = bob.open_file(&chat, &file(), &envelope, TEST_TIMEOUT).await;
    assert_eq!(opened.data.as_deref(), Some(b"the payload".as_slice()));

    // Alice revokes; Bob applies it and can no longer open.
    let revoke = alice
        .record_revocation(&chat, &file(), Some("shared by mistake".into()), TEST_TIMEOUT)
        .await;
    bob.process_message(&revoke.data.unwrap().pdu, TEST_TIMEOUT, None)
        .await;

    let blocked = bob.open_file(&chat, &file(), &envelope, TEST_TIMEOUT).await;
    assert_eq!(
        blocked.error.map(|e| e.kind),
        Some(ErrorKind::InvalidTransition)
    );
}

#[tokio::test]
async fn test_expiry_blocks_open() {
    let (alice, bob, clock) = paired_contexts().await;
    let chat = test_chat();

    let sealed = alice
        .seal_file(&chat, &file(), b"short-lived", TEST_TIMEOUT)
        .await;
    let envelope = sealed.data.unwrap();

    let req = bob.request_access(&chat, &file(), TEST_TIMEOUT).await;
    alice
        .process_message(&req.data.unwrap().pdu, TEST_TIMEOUT, None)
        .await;
    let grant = alice
        .record_grant(&chat, &file(), 60, true, false, TEST_TIMEOUT)
        .await;
    bob.process_message(&grant.data.unwrap().pdu, TEST_TIMEOUT, None)
        .await;

    clock.advance(61);
    let blocked = bob.open_file(&chat, &file(), &envelope, TEST_TIMEOUT).await;
    assert!(!blocked.success);
}

#[tokio::test]
async fn test_seal_requires_handshake() {
    let (ctx, _) = ready_context().await;
    let res = ctx
        .seal_file(&test_chat(), &file(), b"data", TEST_TIMEOUT)
        .await;
    assert_eq!(
        res.error.map(|e| e.kind),
        Some(ErrorKind::CryptoFailure)
    );
}

#[tokio::test]
async fn test_delete_chat_terminates_records() {
    let (alice, bob, _) = paired_contexts().await;
    let chat = test_chat();

    for f in ["/a.prv", "/b.prv"] {
        let req = bob
            .request_access(&chat, &FileRef::from(f), TEST_TIMEOUT)
            .await;
        alice
            .process_message(&req.data.unwrap().pdu, TEST_TIMEOUT, None)
            .await;
    }

    let deleted = alice.delete_chat(&chat, TEST_TIMEOUT).await;
    assert_eq!(deleted.data, Some(2));

    let status = alice
        .get_file_access_status(&chat, &FileRef::from("/a.prv"), TEST_TIMEOUT)
        .await;
    assert_eq!(status.data.unwrap().status, AccessStatus::Deleted);
}

#[tokio::test]
async fn test_profile_switch_scopes_the_ledger() {
    let (ctx, _) = ready_context().await;
    let chat = test_chat();

    let res = ctx.request_access(&chat, &file(), TEST_TIMEOUT).await;
    assert!(res.success);

    // Bob sees none of Alice's records.
    assert_eq!(
        ctx.switch_profile("bob", None, None, TEST_TIMEOUT, None)
            .await
            .data,
        Some(true)
    );
    let status = ctx.get_file_access_status(&chat, &file(), TEST_TIMEOUT).await;
    assert_eq!(status.data.unwrap().status, AccessStatus::NotFound);

    // Switching back restores them.
    assert_eq!(
        ctx.switch_profile("alice", None, None, TEST_TIMEOUT, None)
            .await
            .data,
        Some(true)
    );
    let status = ctx.get_file_access_status(&chat, &file(), TEST_TIMEOUT).await;
    assert_eq!(status.data.unwrap().status, AccessStatus::Requested);

    // Re-switching to the active profile is a no-op.
    assert_eq!(
        ctx.switch_profile("alice", None, None, TEST_TIMEOUT, None)
            .await
            .data,
        Some(false)
    );
}

#[tokio::test]
async fn test_cancelled_before_commit_leaves_state_untouched() {
    let (alice, bob, _) = paired_contexts().await;
    let chat = test_chat();

    let req = bob.request_access(&chat, &file(), TEST_TIMEOUT).await;
    let wire = req.data.unwrap().pdu;

    let cancel = CancelToken::new();
    cancel.cancel();
    let res = alice.process_message(&wire, TEST_TIMEOUT, Some(&cancel)).await;
    assert_eq!(res.error.map(|e| e.kind), Some(ErrorKind::Timeout));

    let status = alice.get_file_access_status(&chat, &file(), TEST_TIMEOUT).await;
    assert_eq!(status.data.unwrap().status, AccessStatus::NotFound);

    // Without the cancelled token the same bytes apply fine.
    let res = alice.process_message(&wire, TEST_TIMEOUT, None).await;
    assert!(res.success);
}

#[tokio::test]
async fn test_protocol_message_recognition() {
    let (alice, bob, _) = paired_contexts().await;

    let req = bob
        .request_access(&test_chat(), &file(), TEST_TIMEOUT)
        .await;
    let wire = req.data.unwrap().pdu;

    assert!(alice.is_recognized_protocol_message(&wire));
    assert!(!alice.is_recognized_protocol_message(b"just a chat message"));
    assert!(!alice.is_recognized_protocol_message(&[]));
}

#[tokio::test]
async fn test_malformed_pdu_surfaces_kind() {
    let (ctx, _) = ready_context().await;

    // Right magic, garbage payload.
    let mut bytes = b"PRV\x01".to_vec();
    bytes.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

    let res = ctx.process_message(&bytes, TEST_TIMEOUT, None).await;
    assert_eq!(
        res.error.map(|e| e.kind),
        Some(ErrorKind::MalformedPdu)
    );
}

#[tokio::test]
async fn test_oversized_revocation_reason_leaves_grant_active() {
    let (alice, bob, _) = paired_contexts().await;
    let chat = test_chat();

    let req = bob.request_access(&chat, &file(), TEST_TIMEOUT).await;
    alice
        .process_message(&req.data.unwrap().pdu, TEST_TIMEOUT, None)
        .await;
    let grant = alice
        .record_grant(&chat, &file(), 3600, true, false, TEST_TIMEOUT)
        .await;
    assert_eq!(grant.data.unwrap().record.status, AccessStatus::Active);

    // A reason past the wire limit fails the PDU build; the failed call
    // must not have revoked anything.
    let revoke = alice
        .record_revocation(&chat, &file(), Some("x".repeat(600)), TEST_TIMEOUT)
        .await;
    assert!(!revoke.success);

    let status = alice.get_file_access_status(&chat, &file(), TEST_TIMEOUT).await;
    assert_eq!(status.data.unwrap().status, AccessStatus::Active);

    // A reason within the limit still goes through.
    let revoke = alice
        .record_revocation(&chat, &file(), Some("leaked".into()), TEST_TIMEOUT)
        .await;
    assert_eq!(revoke.data.unwrap().record.status, AccessStatus::Revoked);
}

#[tokio::test]
async fn test_cancelled_profile_switch_leaves_active_profile() {
    let (ctx, _) = ready_context().await;

    let cancel = CancelToken::new();
    cancel.cancel();
    let res = ctx
        .switch_profile("bob", None, None, TEST_TIMEOUT, Some(&cancel))
        .await;
    assert_eq!(res.error.map(|e| e.kind), Some(ErrorKind::Timeout));

    let active = ctx.active_profile().await.data.flatten();
    assert_eq!(active.map(|p| p.username), Some("alice".to_string()));
}

#[tokio::test]
async fn test_version_is_exposed() {
    let ctx: PrvContext<MemoryStore, Ed25519Provider> = PrvContext::new();
    assert!(!ctx.version().is_empty());
}
