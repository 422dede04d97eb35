//! Function-call dispatch.
//!
//! Function calls found in the event log are identified by an idempotency
//! key and forwarded to the relay at most once per key.

mod dispatcher;
mod key;
mod store;

pub use dispatcher::{DispatchNotice, Dispatcher, MESSAGE_ARG, ScanReport};
pub use key::{canonical_args, idempotency_key};
pub use store::{DispatchOutcome, DispatchRecord, DispatchStore};

/// Function routed to the relay's free-form command endpoint.
pub const SEND_MESSAGE_FUNCTION: &str = "send_message";
