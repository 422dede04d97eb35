//! HTTP relay client.
//!
//! Sends one JSON `POST` per dispatch to the relay, authenticated with a
//! shared secret carried in the request body.
//!
//! # Example
//!
//! ```rust,ignore
//! use voice_relay::core::relay::{HttpRelayClient, RelayClient};
//!
//! let relay = HttpRelayClient::new("https://relay.example.com", "secret")?;
//! let response = relay.dispatch_message("status please").await;
//! println!("{}: {}", response.success, response.message);
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;
use zeroize::Zeroize;

use super::base::{RelayClient, RelayError, RelayResponse, RelayResult};
use super::messages::{ActionRequest, CommandRequest, RelayReply};

/// Relay path for structured actions.
pub const ACTION_PATH: &str = "action";

/// Relay path for free-form commands.
pub const COMMAND_PATH: &str = "command";

/// HTTP relay client.
///
/// No retries and no timeout beyond the transport default: delivery is
/// best-effort.
pub struct HttpRelayClient {
    base_url: String,
    secret: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRelayClient")
            .field("base_url", &self.base_url)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Drop for HttpRelayClient {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl HttpRelayClient {
    /// Create a client for `base_url` with a fresh HTTP client.
    pub fn new(base_url: impl Into<String>, secret: impl Into<String>) -> RelayResult<Self> {
        Self::with_client(base_url, secret, reqwest::Client::new())
    }

    /// Create a client sharing an existing HTTP client.
    pub fn with_client(
        base_url: impl Into<String>,
        secret: impl Into<String>,
        client: reqwest::Client,
    ) -> RelayResult<Self> {
        let base_url = base_url.into();
        let parsed = Url::parse(&base_url)
            .map_err(|e| RelayError::InvalidConfiguration(format!("{}: {}", base_url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(RelayError::InvalidConfiguration(format!(
                "unsupported scheme '{}'",
                parsed.scheme()
            )));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            secret: secret.into(),
            client,
        })
    }

    /// Relay base URL without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Post a JSON body and interpret the relay's reply.
    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> RelayResult<String> {
        let url = self.endpoint(path);
        debug!(url = %url, "Relay request");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: RelayReply = response
            .json()
            .await
            .map_err(|e| RelayError::Decode(e.to_string()))?;

        if reply.is_sent() {
            Ok(reply.message.unwrap_or_else(|| reply.status.clone()))
        } else {
            Err(RelayError::Rejected {
                status: reply.status,
                message: reply.message.unwrap_or_default(),
            })
        }
    }
}

#[async_trait]
impl RelayClient for HttpRelayClient {
    async fn dispatch_action(
        &self,
        action: &str,
        params: &BTreeMap<String, String>,
    ) -> RelayResponse {
        let result = if action.trim().is_empty() {
            Err(RelayError::InvalidRequest("action name is empty".to_string()))
        } else {
            let body = ActionRequest {
                secret: &self.secret,
                action,
                params,
            };
            self.post(ACTION_PATH, &body).await
        };

        if let Err(e) = &result {
            warn!(action = %action, error = %e, "Relay action failed");
        }
        result.into()
    }

    async fn dispatch_message(&self, text: &str) -> RelayResponse {
        let result = if text.trim().is_empty() {
            Err(RelayError::InvalidRequest("command text is empty".to_string()))
        } else {
            let body = CommandRequest {
                secret: &self.secret,
                command: text,
            };
            self.post(COMMAND_PATH, &body).await
        };

        if let Err(e) = &result {
            warn!(error = %e, "Relay command failed");
        }
        result.into()
    }
}
