//! # PRV Context
//!
//! The unified facade over the PRV kernel: one [`PrvContext`] handle owns
//! the profile registry, the access ledger, and the protocol exchange
//! engine.
//!
//! ## Boundary contract
//!
//! Every operation returns an [`ApiResult`] — `{success, data, error}` —
//! and never panics across the boundary. Operations before [`PrvContext::init`]
//! fail with `NotInitialized`; operations without an active profile fail
//! with `NoActiveProfile`. Every operation that reaches the persistence
//! layer is bounded by a caller-supplied timeout; mutations and profile
//! switches also support cooperative cancellation via [`CancelToken`].
//!
//! ## Typical flow
//!
//! ```text
//! ctx.init(store, provider, clock)
//! ctx.switch_profile("alice", ..)
//! ctx.peer_add_request(chat)            -> PDU to send
//! ctx.process_message(inbound_bytes)    -> ledger transition
//! ctx.get_file_access_status(chat, file, timeout)
//! ```

pub mod context;
pub mod error;
pub mod exchange;
pub mod profiles;

pub use context::{CancelToken, Outbound, PrvContext};
pub use error::{ApiError, ApiResult, ContextError};
pub use exchange::{ExchangeEngine, ProcessedMessage};
pub use profiles::{ProfileStore, SwitchOutcome};
