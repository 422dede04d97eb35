//! Environment variable loading for [`BridgeConfig`](super::BridgeConfig).

use std::env;

use crate::core::session::gemini::DEFAULT_GEMINI_MODEL;
use crate::core::session::{ReconnectionConfig, ResponseModality};

use super::{BridgeConfig, DEFAULT_SYSTEM_INSTRUCTION, default_functions};

/// Gemini API key.
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
/// Live model name.
pub const ENV_GEMINI_MODEL: &str = "GEMINI_MODEL";
/// Prebuilt voice name.
pub const ENV_GEMINI_VOICE: &str = "GEMINI_VOICE";
/// WebSocket endpoint override.
pub const ENV_SESSION_URL: &str = "SESSION_URL";
/// System instruction text.
pub const ENV_SYSTEM_INSTRUCTION: &str = "SYSTEM_INSTRUCTION";
/// `audio` or `text`.
pub const ENV_RESPONSE_MODALITY: &str = "RESPONSE_MODALITY";
/// Relay base URL.
pub const ENV_RELAY_BASE_URL: &str = "RELAY_BASE_URL";
/// Relay shared secret.
pub const ENV_RELAY_SECRET: &str = "RELAY_SECRET";
/// Enables automatic reconnection.
pub const ENV_RECONNECT_ENABLED: &str = "RECONNECT_ENABLED";

/// Read a variable, treating blank values as unset.
pub(crate) fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a boolean variable (`true/false`, `1/0`, `yes/no`, `on/off`).
pub(crate) fn env_bool(name: &str) -> Result<Option<bool>, String> {
    match env_string(name) {
        None => Ok(None),
        Some(value) => match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(format!("Invalid boolean for {name}: {value}")),
        },
    }
}

/// Build a configuration from environment variables and defaults only.
pub(crate) fn load_from_env() -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    let response_modality = env_string(ENV_RESPONSE_MODALITY)
        .map(|m| ResponseModality::from_str_or_default(&m))
        .unwrap_or_default();

    let reconnection = match env_bool(ENV_RECONNECT_ENABLED)? {
        Some(true) => ReconnectionConfig::enabled(),
        _ => ReconnectionConfig::disabled(),
    };

    Ok(BridgeConfig {
        api_key: env_string(ENV_GEMINI_API_KEY),
        model: env_string(ENV_GEMINI_MODEL).unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
        voice: env_string(ENV_GEMINI_VOICE),
        session_url: env_string(ENV_SESSION_URL),
        system_instruction: env_string(ENV_SYSTEM_INSTRUCTION)
            .unwrap_or_else(|| DEFAULT_SYSTEM_INSTRUCTION.to_string()),
        response_modality,
        relay_base_url: env_string(ENV_RELAY_BASE_URL),
        relay_secret: env_string(ENV_RELAY_SECRET),
        functions: default_functions(),
        reconnection,
    })
}
