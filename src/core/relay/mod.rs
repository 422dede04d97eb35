//! Relay client module.
//!
//! The relay is an external automation service behind a small HTTP surface.
//! The core only needs two calls: run a structured action, or send a
//! free-form command.

mod base;
mod client;
mod messages;

pub use base::{RelayClient, RelayError, RelayResponse, RelayResult};
pub use client::{ACTION_PATH, COMMAND_PATH, HttpRelayClient};
pub use messages::{ActionRequest, CommandRequest, RelayReply, STATUS_SENT};
