//! # PRV Ledger
//!
//! The access-control state machine: pure transition rules over
//! [`prv_core::AccessRecord`] plus [`AccessLedger`], the component that
//! owns the authoritative records and serializes mutations per key.
//!
//! ## State machine
//!
//! ```text
//! (none) --request--> Requested --mark-waiting--> WaitingOwnerAction
//!     Requested/WaitingOwnerAction --grant--> Active --revoke--> Revoked
//!     Requested/WaitingOwnerAction --deny---> Denied
//!     Active --expiry observed lazily--> Expired
//!     any --file deleted--> Deleted
//! ```
//!
//! Expired, Revoked, Denied, and Deleted are terminal for the current
//! attempt; a fresh request on a terminal record starts a new cycle under
//! the same key.

pub mod error;
pub mod event;
pub mod ledger;

pub use error::{LedgerError, Result};
pub use event::{transition, AccessEvent};
pub use ledger::AccessLedger;
