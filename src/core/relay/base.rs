//! Base trait and types for relay clients.
//!
//! A relay is the external automation endpoint that performs the actions the
//! assistant asks for. Relay clients are best-effort and fail closed: every
//! failure becomes a `RelayResponse` with `success: false`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while talking to the relay.
///
/// These never cross the [`RelayClient`] boundary; they are folded into a
/// failed [`RelayResponse`].
#[derive(Debug, Error)]
pub enum RelayError {
    /// Request could not be delivered
    #[error("Relay transport error: {0}")]
    Transport(String),

    /// Relay answered with a non-success HTTP status
    #[error("Relay returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// Relay response was not the expected JSON
    #[error("Malformed relay response: {0}")]
    Decode(String),

    /// Relay reported a status other than "sent"
    #[error("Relay rejected request ({status}): {message}")]
    Rejected {
        /// Reported status
        status: String,
        /// Reported message
        message: String,
    },

    /// Request was invalid before sending
    #[error("Invalid relay request: {0}")]
    InvalidRequest(String),

    /// Relay client configuration is unusable
    #[error("Invalid relay configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

// =============================================================================
// Response
// =============================================================================

/// Outcome of a relay request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayResponse {
    /// Whether the relay accepted the request
    pub success: bool,
    /// Relay message or failure description
    pub message: String,
}

impl RelayResponse {
    /// Successful response.
    pub fn sent(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Failed response.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl From<RelayResult<String>> for RelayResponse {
    fn from(result: RelayResult<String>) -> Self {
        match result {
            Ok(message) => RelayResponse::sent(message),
            Err(e) => RelayResponse::failed(e.to_string()),
        }
    }
}

// =============================================================================
// Base Trait
// =============================================================================

/// Client for the external automation relay.
///
/// Implementations must not panic or return errors for relay failures;
/// they report them through [`RelayResponse::success`].
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Ask the relay to run a structured action.
    async fn dispatch_action(
        &self,
        action: &str,
        params: &BTreeMap<String, String>,
    ) -> RelayResponse;

    /// Send a free-form command message to the relay.
    async fn dispatch_message(&self, text: &str) -> RelayResponse;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelayError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "Relay returned HTTP 502: bad gateway");

        let err = RelayError::Rejected {
            status: "denied".to_string(),
            message: "bad secret".to_string(),
        };
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_response_from_result() {
        let ok: RelayResponse = RelayResult::Ok("queued".to_string()).into();
        assert!(ok.success);
        assert_eq!(ok.message, "queued");

        let err: RelayResponse =
            RelayResult::<String>::Err(RelayError::Transport("refused".to_string())).into();
        assert!(!err.success);
        assert!(err.message.contains("refused"));
    }
}
