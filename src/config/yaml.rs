use serde::Deserialize;
use std::path::PathBuf;

use crate::core::session::{FunctionDeclaration, ReconnectionConfig};

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present
/// here override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// session:
///   api_key: "your-gemini-key"
///   model: "gemini-2.0-flash-live-001"
///   voice: "Kore"
///   url: "wss://generativelanguage.googleapis.com/ws/..."
///   response_modality: "audio"
///   system_instruction: |
///     You are a voice assistant for the operations team.
///
/// relay:
///   base_url: "https://relay.example.com"
///   secret: "shared-secret"
///
/// functions:
///   - name: "send_message"
///     description: "Send a free-form command to the automation relay"
///     parameters:
///       required: ["message"]
///   - name: "restart_service"
///     description: "Restart a named service"
///     parameters:
///       required: ["service"]
///       optional: ["reason"]
///
/// reconnection:
///   enabled: true
///   max_attempts: 3
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub session: Option<SessionYaml>,
    pub relay: Option<RelayYaml>,
    pub functions: Option<Vec<FunctionDeclaration>>,
    pub reconnection: Option<ReconnectionConfig>,
}

/// Session configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub url: Option<String>,
    pub system_instruction: Option<String>,
    pub response_modality: Option<String>,
}

/// Relay configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RelayYaml {
    pub base_url: Option<String>,
    pub secret: Option<String>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
