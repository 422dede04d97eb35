//! Base traits and types for streaming AI sessions.
//!
//! A session is one live, bidirectional connection to a multimodal AI
//! service. The session client decodes every inbound frame into
//! [`RawEvent`]s and hands them to the registered event callback; it never
//! interprets conversation content itself.
//!
//! # Connection signal
//!
//! Drops caused by idle timeouts or maximum session length are reported as a
//! `false` connection signal, not as fatal errors. Whether to reconnect is
//! governed by [`ReconnectionConfig`], which is disabled by default.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

use crate::core::events::RawEvent;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Connection to the service failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Input rejected before sending
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// Service-reported error
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// Configuration for automatic reconnection behavior.
///
/// Disabled by default: a dropped session stays dropped until the caller
/// starts a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectionConfig {
    /// Enable automatic reconnection on connection loss.
    pub enabled: bool,

    /// Maximum number of reconnection attempts before giving up.
    /// Set to 0 for unlimited attempts.
    pub max_attempts: u32,

    /// Initial delay between reconnection attempts (milliseconds).
    pub initial_delay_ms: u64,

    /// Maximum delay between reconnection attempts (milliseconds).
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f32,

    /// Whether to add jitter to the delay.
    pub jitter: bool,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ReconnectionConfig {
    /// Create a config with reconnection enabled and default backoff.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    /// Create a config with reconnection disabled.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Delay in milliseconds before reconnection attempt `attempt` (1-based).
    pub fn calculate_delay(&self, attempt: u32) -> u64 {
        let base_delay = self.initial_delay_ms as f64;
        let multiplier = self.backoff_multiplier as f64;

        let delay = base_delay * multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = delay.min(self.max_delay_ms as f64);

        if self.jitter {
            // Up to 25% either way
            let jitter = rand_jitter(delay * 0.25);
            (delay + jitter).max(0.0) as u64
        } else {
            delay as u64
        }
    }

    /// Check if more reconnection attempts are allowed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.enabled && (self.max_attempts == 0 || attempt < self.max_attempts)
    }
}

/// Pseudo-random value in `-range..=range` from the clock's low bits.
fn rand_jitter(range: f64) -> f64 {
    use std::time::SystemTime;
    let seed = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let random = ((seed.wrapping_mul(1103515245).wrapping_add(12345)) % (1 << 31)) as f64;
    let normalized = random / (1u64 << 31) as f64;
    (normalized - 0.5) * 2.0 * range
}

/// Modality the assistant answers in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseModality {
    /// Spoken answers
    #[default]
    Audio,
    /// Text answers
    Text,
}

impl ResponseModality {
    /// Wire value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "AUDIO",
            Self::Text => "TEXT",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "text" => Self::Text,
            _ => Self::Audio,
        }
    }
}

impl fmt::Display for ResponseModality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// String-typed parameters of a callable function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterSchema {
    /// Parameters the model must supply
    pub required: Vec<String>,
    /// Parameters the model may supply
    pub optional: Vec<String>,
}

impl ParameterSchema {
    /// Render as an OpenAPI-style object schema.
    pub fn to_json_schema(&self) -> serde_json::Value {
        let properties: serde_json::Map<String, serde_json::Value> = self
            .required
            .iter()
            .chain(self.optional.iter())
            .map(|name| (name.clone(), serde_json::json!({ "type": "STRING" })))
            .collect();

        serde_json::json!({
            "type": "OBJECT",
            "properties": properties,
            "required": self.required,
        })
    }
}

/// A function the assistant may request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    /// Function name
    pub name: String,
    /// What the function does, shown to the model
    #[serde(default)]
    pub description: String,
    /// Parameters
    #[serde(default)]
    pub parameters: ParameterSchema,
}

impl FunctionDeclaration {
    /// Declare a function without parameters.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ParameterSchema::default(),
        }
    }

    /// Add a required string parameter.
    pub fn required(mut self, param: impl Into<String>) -> Self {
        self.parameters.required.push(param.into());
        self
    }

    /// Add an optional string parameter.
    pub fn optional(mut self, param: impl Into<String>) -> Self {
        self.parameters.optional.push(param.into());
        self
    }
}

/// Configuration for one logical session.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// API key for authentication
    pub api_key: String,

    /// Model to use
    #[serde(default)]
    pub model: String,

    /// Voice for spoken answers
    #[serde(default)]
    pub voice: Option<String>,

    /// System instruction for the assistant
    #[serde(default)]
    pub system_instruction: Option<String>,

    /// Requested response modality
    #[serde(default)]
    pub response_modality: ResponseModality,

    /// Functions the assistant may call, in declaration order
    #[serde(default)]
    pub functions: Vec<FunctionDeclaration>,

    /// WebSocket endpoint override
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Reconnection configuration
    #[serde(default)]
    pub reconnection: Option<ReconnectionConfig>,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("system_instruction", &self.system_instruction)
            .field("response_modality", &self.response_modality)
            .field("functions", &self.functions)
            .field("endpoint", &self.endpoint)
            .field("reconnection", &self.reconnection)
            .finish()
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected
    #[default]
    Disconnected,
    /// Currently connecting
    Connecting,
    /// Connected and ready
    Connected,
    /// Reconnecting after connection loss
    Reconnecting,
    /// Connection failed
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Reconnecting => write!(f, "Reconnecting"),
            ConnectionState::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// Input
// =============================================================================

/// User input sent into an open session.
#[derive(Debug, Clone)]
pub enum SessionInput {
    /// Encoded audio chunk
    Audio {
        /// Raw audio bytes
        data: Bytes,
        /// MIME type, e.g. `audio/pcm;rate=16000`
        mime_type: String,
    },
    /// Typed text
    Text {
        /// Text content
        text: String,
        /// Whether this ends the user's turn
        turn_complete: bool,
    },
}

impl SessionInput {
    /// Complete text turn.
    pub fn text(text: impl Into<String>) -> Self {
        SessionInput::Text {
            text: text.into(),
            turn_complete: true,
        }
    }

    /// Audio chunk with an explicit MIME type.
    pub fn audio(data: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        SessionInput::Audio {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }
}

// =============================================================================
// Callback Types
// =============================================================================

/// Callback type for decoded session events.
pub type EventCallback =
    Arc<dyn Fn(RawEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for the connected/disconnected signal.
pub type ConnectionCallback =
    Arc<dyn Fn(bool) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for non-fatal session errors.
pub type SessionErrorCallback =
    Arc<dyn Fn(SessionError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

// =============================================================================
// Base Trait
// =============================================================================

/// Base trait for streaming AI session clients.
///
/// # Example
///
/// ```rust,ignore
/// use voice_relay::core::session::{BaseSession, GeminiLiveSession, SessionConfig, SessionInput};
///
/// let mut session = GeminiLiveSession::new(SessionConfig {
///     api_key: "...".to_string(),
///     ..Default::default()
/// })?;
///
/// session.on_event(Arc::new(|event| Box::pin(async move {
///     println!("{:?}", event);
/// })))?;
///
/// session.connect().await?;
/// session.send(SessionInput::text("hello")).await?;
/// ```
#[async_trait]
pub trait BaseSession: Send + Sync {
    /// Create a new session client.
    fn new(config: SessionConfig) -> SessionResult<Self>
    where
        Self: Sized;

    /// Open the session and send its configuration.
    async fn connect(&mut self) -> SessionResult<()>;

    /// Close the session. Calling it on a closed session is a no-op.
    async fn disconnect(&mut self) -> SessionResult<()>;

    /// Check if the session is open.
    fn is_ready(&self) -> bool;

    /// Get the current connection state.
    fn get_connection_state(&self) -> ConnectionState;

    /// Send user audio or text.
    async fn send(&mut self, input: SessionInput) -> SessionResult<()>;

    /// Answer a function call issued by the model.
    async fn send_tool_response(
        &mut self,
        call_id: &str,
        name: &str,
        response: serde_json::Value,
    ) -> SessionResult<()>;

    /// Register a callback for decoded events.
    fn on_event(&mut self, callback: EventCallback) -> SessionResult<()>;

    /// Register a callback for the connection signal.
    fn on_connection_change(&mut self, callback: ConnectionCallback) -> SessionResult<()>;

    /// Register a callback for non-fatal errors.
    fn on_error(&mut self, callback: SessionErrorCallback) -> SessionResult<()>;

    /// Get provider information.
    fn get_provider_info(&self) -> serde_json::Value;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "Connected");
        assert_eq!(ConnectionState::Disconnected.to_string(), "Disconnected");
        assert_eq!(ConnectionState::Reconnecting.to_string(), "Reconnecting");
    }

    #[test]
    fn test_error_display() {
        let err = SessionError::ConnectionFailed("test".to_string());
        assert!(err.to_string().contains("Connection failed"));
        assert_eq!(SessionError::NotConnected.to_string(), "Not connected");
    }

    #[test]
    fn test_reconnection_disabled_by_default() {
        let config = ReconnectionConfig::default();
        assert!(!config.enabled);
        assert!(!config.should_retry(0));
        assert_eq!(config.max_attempts, 5);
    }

    #[test]
    fn test_reconnection_should_retry() {
        let config = ReconnectionConfig::enabled();
        assert!(config.should_retry(0));
        assert!(config.should_retry(4));
        assert!(!config.should_retry(5));

        let unlimited = ReconnectionConfig {
            max_attempts: 0,
            ..ReconnectionConfig::enabled()
        };
        assert!(unlimited.should_retry(u32::MAX));
    }

    #[test]
    fn test_reconnection_calculate_delay_no_jitter() {
        let config = ReconnectionConfig {
            jitter: false,
            ..ReconnectionConfig::enabled()
        };
        assert_eq!(config.calculate_delay(1), 1000);
        assert_eq!(config.calculate_delay(2), 2000);
        assert_eq!(config.calculate_delay(5), 16000);
        assert_eq!(config.calculate_delay(6), 30000);
    }

    #[test]
    fn test_reconnection_calculate_delay_with_jitter() {
        let config = ReconnectionConfig::enabled();
        let delay = config.calculate_delay(1);
        assert!((750..=1250).contains(&delay), "delay {} out of range", delay);
    }

    #[test]
    fn test_reconnection_partial_yaml_uses_defaults() {
        let config: ReconnectionConfig = serde_yaml::from_str("enabled: true").unwrap();
        assert!(config.enabled);
        assert_eq!(config.initial_delay_ms, 1000);
    }

    #[test]
    fn test_response_modality_parsing() {
        assert_eq!(ResponseModality::from_str_or_default("TEXT"), ResponseModality::Text);
        assert_eq!(ResponseModality::from_str_or_default("audio"), ResponseModality::Audio);
        assert_eq!(ResponseModality::from_str_or_default("video"), ResponseModality::Audio);
        assert_eq!(ResponseModality::Text.as_str(), "TEXT");
    }

    #[test]
    fn test_parameter_schema_rendering() {
        let decl = FunctionDeclaration::new("create_task", "Create a task")
            .required("title")
            .optional("notes");
        let schema = decl.parameters.to_json_schema();

        assert_eq!(schema["type"], "OBJECT");
        assert_eq!(schema["properties"]["title"]["type"], "STRING");
        assert_eq!(schema["properties"]["notes"]["type"], "STRING");
        assert_eq!(schema["required"], serde_json::json!(["title"]));
    }

    #[test]
    fn test_session_config_debug_redacts_key() {
        let config = SessionConfig {
            api_key: "AIza-secret".to_string(),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("AIza-secret"));
    }
}
