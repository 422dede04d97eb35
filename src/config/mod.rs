//! Configuration for the voice relay.
//!
//! Values are resolved in this order (highest priority first):
//! 1. YAML configuration file (when given)
//! 2. Environment variables
//! 3. `.env` file (loaded by the binary via `dotenvy`)
//! 4. Built-in defaults
//!
//! # Example
//! ```rust,ignore
//! use voice_relay::config::BridgeConfig;
//! use std::path::PathBuf;
//!
//! let config = BridgeConfig::from_file(&PathBuf::from("config.yaml"))?;
//! let session_config = config.session_config()?;
//! let relay = config.relay_client()?;
//! ```

mod env;
mod validation;
mod yaml;

pub use env::{
    ENV_GEMINI_API_KEY, ENV_GEMINI_MODEL, ENV_GEMINI_VOICE, ENV_RECONNECT_ENABLED,
    ENV_RELAY_BASE_URL, ENV_RELAY_SECRET, ENV_RESPONSE_MODALITY, ENV_SESSION_URL,
    ENV_SYSTEM_INSTRUCTION,
};
pub use validation::{validate_functions, validate_relay_url, validate_session_url};
pub use yaml::{RelayYaml, SessionYaml, YamlConfig};

use std::path::PathBuf;

use zeroize::Zeroize;

use crate::core::dispatch::SEND_MESSAGE_FUNCTION;
use crate::core::relay::HttpRelayClient;
use crate::core::session::gemini::DEFAULT_GEMINI_MODEL;
use crate::core::session::{
    FunctionDeclaration, ReconnectionConfig, ResponseModality, SessionConfig,
};

/// Instruction used when none is configured.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a concise voice assistant for an \
operations team. When the user asks for something to be done, call the matching \
function. Use send_message for any request that no other function covers, passing \
the request in plain words.";

/// Functions declared when the configuration names none.
pub fn default_functions() -> Vec<FunctionDeclaration> {
    vec![
        FunctionDeclaration::new(
            SEND_MESSAGE_FUNCTION,
            "Forward a free-form request to the automation relay",
        )
        .required("message"),
        FunctionDeclaration::new("create_task", "Create a task on the team board")
            .required("title")
            .optional("notes"),
    ]
}

/// Resolved bridge configuration.
#[derive(Clone)]
pub struct BridgeConfig {
    /// Gemini API key
    pub api_key: Option<String>,
    /// Live model name
    pub model: String,
    /// Prebuilt voice name
    pub voice: Option<String>,
    /// WebSocket endpoint override
    pub session_url: Option<String>,
    /// System prompt sent in the session setup message
    pub system_instruction: String,
    /// Output modality requested from the model (text or audio)
    pub response_modality: ResponseModality,
    /// Relay base URL, e.g. `https://relay.example.com`
    pub relay_base_url: Option<String>,
    /// Shared secret sent in every relay request body
    pub relay_secret: Option<String>,
    /// Declared functions, in declaration order
    pub functions: Vec<FunctionDeclaration>,
    /// Reconnect policy after an unexpected close; disabled by default
    pub reconnection: ReconnectionConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            voice: None,
            session_url: None,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            response_modality: ResponseModality::default(),
            relay_base_url: None,
            relay_secret: None,
            functions: default_functions(),
            reconnection: ReconnectionConfig::default(),
        }
    }
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("session_url", &self.session_url)
            .field("system_instruction", &self.system_instruction)
            .field("response_modality", &self.response_modality)
            .field("relay_base_url", &self.relay_base_url)
            .field("relay_secret", &self.relay_secret.as_ref().map(|_| "<redacted>"))
            .field("functions", &self.functions)
            .field("reconnection", &self.reconnection)
            .finish()
    }
}

impl Drop for BridgeConfig {
    fn drop(&mut self) {
        if let Some(key) = self.api_key.as_mut() {
            key.zeroize();
        }
        if let Some(secret) = self.relay_secret.as_mut() {
            secret.zeroize();
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    /// Returns an error if a variable is malformed or validation fails.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = env::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, with environment variables as
    /// the fallback for anything the file leaves out.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml = YamlConfig::from_file(path)?;
        let mut config = env::load_from_env()?;
        config.merge_yaml(yaml);
        config.validate()?;
        Ok(config)
    }

    fn merge_yaml(&mut self, yaml: YamlConfig) {
        if let Some(session) = yaml.session {
            if let Some(api_key) = session.api_key {
                self.api_key = Some(api_key);
            }
            if let Some(model) = session.model {
                self.model = model;
            }
            if let Some(voice) = session.voice {
                self.voice = Some(voice);
            }
            if let Some(url) = session.url {
                self.session_url = Some(url);
            }
            if let Some(instruction) = session.system_instruction {
                self.system_instruction = instruction;
            }
            if let Some(modality) = session.response_modality {
                self.response_modality = ResponseModality::from_str_or_default(&modality);
            }
        }

        if let Some(relay) = yaml.relay {
            if let Some(base_url) = relay.base_url {
                self.relay_base_url = Some(base_url);
            }
            if let Some(secret) = relay.secret {
                self.relay_secret = Some(secret);
            }
        }

        if let Some(functions) = yaml.functions {
            self.functions = functions;
        }

        if let Some(reconnection) = yaml.reconnection {
            self.reconnection = reconnection;
        }
    }

    /// Check URLs and function declarations.
    pub fn validate(&self) -> Result<(), String> {
        validate_relay_url(self.relay_base_url.as_deref())?;
        validate_session_url(self.session_url.as_deref())?;
        validate_functions(&self.functions)?;
        Ok(())
    }

    /// Whether both relay settings are present.
    pub fn has_relay(&self) -> bool {
        self.relay_base_url.is_some() && self.relay_secret.is_some()
    }

    /// Build the session configuration.
    ///
    /// # Errors
    /// Fails when no API key is configured.
    pub fn session_config(&self) -> Result<SessionConfig, String> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| format!("{ENV_GEMINI_API_KEY} is not set"))?;

        Ok(SessionConfig {
            api_key,
            model: self.model.clone(),
            voice: self.voice.clone(),
            system_instruction: Some(self.system_instruction.clone()),
            response_modality: self.response_modality,
            functions: self.functions.clone(),
            endpoint: self.session_url.clone(),
            reconnection: Some(self.reconnection.clone()),
        })
    }

    /// Build an HTTP relay client.
    ///
    /// # Errors
    /// Fails when the relay URL or secret is missing or the URL is invalid.
    pub fn relay_client(&self) -> Result<HttpRelayClient, Box<dyn std::error::Error>> {
        let base_url = self
            .relay_base_url
            .as_deref()
            .ok_or_else(|| format!("{ENV_RELAY_BASE_URL} is not set"))?;
        let secret = self
            .relay_secret
            .as_deref()
            .ok_or_else(|| format!("{ENV_RELAY_SECRET} is not set"))?;
        Ok(HttpRelayClient::new(base_url, secret)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env as std_env;
    use std::fs;
    use tempfile::TempDir;

    fn cleanup_env_vars() {
        unsafe {
            for name in [
                ENV_GEMINI_API_KEY,
                ENV_GEMINI_MODEL,
                ENV_GEMINI_VOICE,
                ENV_SESSION_URL,
                ENV_SYSTEM_INSTRUCTION,
                ENV_RESPONSE_MODALITY,
                ENV_RELAY_BASE_URL,
                ENV_RELAY_SECRET,
                ENV_RECONNECT_ENABLED,
            ] {
                std_env::remove_var(name);
            }
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();

        let config = BridgeConfig::from_env().unwrap();
        assert!(config.api_key.is_none());
        assert_eq!(config.model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.response_modality, ResponseModality::Audio);
        assert_eq!(config.system_instruction, DEFAULT_SYSTEM_INSTRUCTION);
        assert!(!config.reconnection.enabled);
        assert!(!config.has_relay());

        let names: Vec<&str> = config.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["send_message", "create_task"]);
        assert_eq!(config.functions[1].parameters.optional, vec!["notes"]);
    }

    #[test]
    #[serial]
    fn test_from_env_values() {
        cleanup_env_vars();
        unsafe {
            std_env::set_var(ENV_GEMINI_API_KEY, "env-key");
            std_env::set_var(ENV_GEMINI_MODEL, "gemini-env");
            std_env::set_var(ENV_GEMINI_VOICE, "Kore");
            std_env::set_var(ENV_RESPONSE_MODALITY, "text");
            std_env::set_var(ENV_RELAY_BASE_URL, "https://relay.example.com");
            std_env::set_var(ENV_RELAY_SECRET, "env-secret");
            std_env::set_var(ENV_RECONNECT_ENABLED, "true");
        }

        let config = BridgeConfig::from_env().unwrap();
        assert_eq!(config.api_key.as_deref(), Some("env-key"));
        assert_eq!(config.model, "gemini-env");
        assert_eq!(config.voice.as_deref(), Some("Kore"));
        assert_eq!(config.response_modality, ResponseModality::Text);
        assert!(config.reconnection.enabled);
        assert!(config.has_relay());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_relay_url() {
        cleanup_env_vars();
        unsafe {
            std_env::set_var(ENV_RELAY_BASE_URL, "ftp://relay.example.com");
        }

        assert!(BridgeConfig::from_env().is_err());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_yaml_overrides_env() {
        cleanup_env_vars();
        unsafe {
            std_env::set_var(ENV_GEMINI_API_KEY, "env-key");
            std_env::set_var(ENV_RELAY_SECRET, "env-secret");
            std_env::set_var(ENV_GEMINI_MODEL, "gemini-env");
        }

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
session:
  api_key: "yaml-key"
  response_modality: "text"
relay:
  base_url: "http://127.0.0.1:8080"
functions:
  - name: "restart_service"
    parameters:
      required: ["service"]
"#,
        )
        .unwrap();

        let config = BridgeConfig::from_file(&config_path).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("yaml-key"));
        assert_eq!(config.model, "gemini-env");
        assert_eq!(config.relay_secret.as_deref(), Some("env-secret"));
        assert_eq!(
            config.relay_base_url.as_deref(),
            Some("http://127.0.0.1:8080")
        );
        assert_eq!(config.response_modality, ResponseModality::Text);
        assert_eq!(config.functions.len(), 1);
        assert_eq!(config.functions[0].name, "restart_service");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_rejects_duplicate_functions() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
functions:
  - name: "create_task"
  - name: "create_task"
"#,
        )
        .unwrap();

        let err = BridgeConfig::from_file(&config_path).unwrap_err();
        assert!(err.to_string().contains("Duplicate function"));
    }

    #[test]
    fn test_session_config_requires_api_key() {
        let config = BridgeConfig::default();
        assert!(config.session_config().is_err());

        let mut config = BridgeConfig::default();
        config.api_key = Some("key".to_string());
        config.session_url = Some("ws://127.0.0.1:9000".to_string());
        let session = config.session_config().unwrap();
        assert_eq!(session.api_key, "key");
        assert_eq!(session.endpoint.as_deref(), Some("ws://127.0.0.1:9000"));
        assert_eq!(session.functions.len(), 2);
        assert_eq!(
            session.system_instruction.as_deref(),
            Some(DEFAULT_SYSTEM_INSTRUCTION)
        );
    }

    #[test]
    fn test_relay_client_requires_settings() {
        let mut config = BridgeConfig::default();
        assert!(config.relay_client().is_err());

        config.relay_base_url = Some("https://relay.example.com".to_string());
        assert!(config.relay_client().is_err());

        config.relay_secret = Some("secret".to_string());
        assert!(config.relay_client().is_ok());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = BridgeConfig::default();
        config.api_key = Some("super-secret-key".to_string());
        config.relay_secret = Some("relay-secret".to_string());

        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret-key"));
        assert!(!debug.contains("relay-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
