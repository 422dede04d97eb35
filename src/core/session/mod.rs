//! Streaming AI session clients.
//!
//! A session client owns the connection lifecycle to the AI service and
//! turns its heterogeneous frames into [`RawEvent`](crate::core::events::RawEvent)s.

mod base;
pub mod gemini;

pub use base::{
    BaseSession, ConnectionCallback, ConnectionState, EventCallback, FunctionDeclaration,
    ParameterSchema, ReconnectionConfig, ResponseModality, SessionConfig, SessionError,
    SessionErrorCallback, SessionInput, SessionResult,
};
pub use gemini::GeminiLiveSession;

/// Boxed trait object for session clients.
pub type BoxedSession = Box<dyn BaseSession>;

/// Supported session providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionProvider {
    /// Gemini Live API
    Gemini,
}

impl SessionProvider {
    /// Parse provider from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gemini" | "gemini-live" | "google" => Some(SessionProvider::Gemini),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionProvider::Gemini => write!(f, "gemini"),
        }
    }
}

/// Create a session client by provider name.
pub fn create_session(provider: &str, config: SessionConfig) -> SessionResult<BoxedSession> {
    match SessionProvider::parse(provider) {
        Some(SessionProvider::Gemini) => Ok(Box::new(GeminiLiveSession::new(config)?)),
        None => Err(SessionError::InvalidConfiguration(format!(
            "Unsupported session provider '{}'. Supported: {}",
            provider,
            get_supported_session_providers().join(", ")
        ))),
    }
}

/// Get list of supported session providers.
pub fn get_supported_session_providers() -> Vec<&'static str> {
    vec!["gemini"]
}
