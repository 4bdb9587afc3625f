//! # PRV Core
//!
//! Pure primitives for the PRV access-control kernel: identifiers, access
//! records, profiles, and the clock abstraction.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over the data model shared by every other crate in the
//! workspace.
//!
//! ## Key Types
//!
//! - [`AccessRecord`] - Durable per-(chat, file) grant state
//! - [`AccessStatus`] - The status enum at the heart of the state machine
//! - [`ChatId`] / [`FileRef`] / [`ProfileId`] - Opaque string identifiers
//! - [`Clock`] - Time source abstraction so expiry is testable

pub mod clock;
pub mod crypto;
pub mod error;
pub mod ids;
pub mod profile;
pub mod record;

pub use clock::{Clock, ManualClock, SystemClock};
pub use crypto::{content_hash, Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::{CoreError, ErrorKind};
pub use ids::{ChatId, FileRef, PduId, ProfileId, RecordKey};
pub use profile::Profile;
pub use record::{AccessRecord, AccessStatus, Permissions};
