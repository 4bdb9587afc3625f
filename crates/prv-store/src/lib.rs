//! # PRV Store
//!
//! Storage abstraction for the access ledger. Records are keyed by
//! `(profile, chat, file)` and every write is an atomic compare-and-swap on
//! the record version, so concurrent transitions cannot silently clobber
//! each other.
//!
//! Two backends ship with the workspace:
//!
//! - [`SqliteStore`] - the durable default, rusqlite with bundled SQLite
//! - [`MemoryStore`] - same semantics, no persistence, for tests

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{LedgerStore, WriteOutcome};
