//! Relay HTTP request and response bodies.
//!
//! - `POST {base}/action` with [`ActionRequest`]
//! - `POST {base}/command` with [`CommandRequest`]
//!
//! Both answer with a [`RelayReply`]; only `status == "sent"` is success.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status value the relay uses for an accepted request.
pub const STATUS_SENT: &str = "sent";

/// Structured action request.
#[derive(Debug, Clone, Serialize)]
pub struct ActionRequest<'a> {
    /// Shared secret
    pub secret: &'a str,
    /// Action identifier (the function name)
    pub action: &'a str,
    /// Action parameters, passed through verbatim
    pub params: &'a BTreeMap<String, String>,
}

/// Free-form command request.
#[derive(Debug, Clone, Serialize)]
pub struct CommandRequest<'a> {
    /// Shared secret
    pub secret: &'a str,
    /// Command text
    pub command: &'a str,
}

/// Relay response body.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayReply {
    /// "sent" on success
    pub status: String,
    /// Optional human-readable detail
    #[serde(default)]
    pub message: Option<String>,
}

impl RelayReply {
    /// Whether the relay accepted the request.
    pub fn is_sent(&self) -> bool {
        self.status == STATUS_SENT
    }
}
