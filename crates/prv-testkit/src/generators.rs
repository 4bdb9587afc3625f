//! Proptest strategies for kernel types.

use proptest::prelude::*;

use prv_core::{AccessStatus, ChatId, FileRef, ProfileId, RecordKey};
use prv_proto::{PduBody, PduDraft};

/// An opaque chat identifier.
pub fn chat_id() -> impl Strategy<Value = ChatId> {
    "[a-z0-9]{1,16}".prop_map(ChatId::new)
}

/// A file reference shaped like a path.
pub fn file_ref() -> impl Strategy<Value = FileRef> {
    "(/[a-z0-9]{1,8}){1,3}\\.prv".prop_map(FileRef::new)
}

/// A profile identifier.
pub fn profile_id() -> impl Strategy<Value = ProfileId> {
    "[a-z]{1,12}".prop_map(ProfileId::new)
}

/// A (chat, file) record key.
pub fn record_key() -> impl Strategy<Value = RecordKey> {
    (chat_id(), file_ref()).prop_map(|(chat, file)| RecordKey::new(chat, file))
}

/// Any storable access status (excludes the synthetic `NotFound`).
pub fn stored_status() -> impl Strategy<Value = AccessStatus> {
    prop_oneof![
        Just(AccessStatus::Requested),
        Just(AccessStatus::WaitingOwnerAction),
        Just(AccessStatus::Active),
        Just(AccessStatus::Expired),
        Just(AccessStatus::Revoked),
        Just(AccessStatus::Denied),
        Just(AccessStatus::Deleted),
    ]
}

/// Any access-event PDU body (excludes peer-add traffic).
pub fn access_body() -> impl Strategy<Value = PduBody> {
    prop_oneof![
        file_ref().prop_map(|file| PduBody::AccessRequest { file }),
        (file_ref(), 1u64..1_000_000, any::<bool>(), any::<bool>()).prop_map(
            |(file, duration_secs, allow_download, allow_forward)| PduBody::AccessGrant {
                file,
                duration_secs,
                allow_download,
                allow_forward,
            }
        ),
        (file_ref(), proptest::option::of(any::<i64>()))
            .prop_map(|(file, status_code)| PduBody::AccessDeny { file, status_code }),
        (file_ref(), proptest::option::of("[a-z ]{0,32}"))
            .prop_map(|(file, reason)| PduBody::AccessRevoke { file, reason }),
        file_ref().prop_map(|file| PduBody::FileDeleted { file }),
    ]
}

/// An unsigned PDU draft carrying an access event.
pub fn access_draft() -> impl Strategy<Value = PduDraft> {
    (chat_id(), 1u64..1_000, 0i64..2_000_000_000, access_body())
        .prop_map(|(chat, seq, timestamp, body)| PduDraft::new(chat, seq, timestamp, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    use prv_core::Keypair;
    use prv_proto::Pdu;

    proptest! {
        #[test]
        fn prop_access_drafts_roundtrip_the_wire(draft in access_draft()) {
            let keypair = Keypair::generate();
            let pdu = Pdu::sign(draft, &keypair).unwrap();
            let wire = pdu.to_wire().unwrap();
            let decoded = Pdu::from_wire(&wire).unwrap();
            prop_assert_eq!(&decoded, &pdu);
            prop_assert!(decoded.verify().is_ok());
        }

        #[test]
        fn prop_stored_status_string_roundtrip(status in stored_status()) {
            let parsed: AccessStatus = status.as_str().parse().unwrap();
            prop_assert_eq!(parsed, status);
        }
    }
}
