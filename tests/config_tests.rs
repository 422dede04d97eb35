//! Loading a full configuration file and building clients from it.

use std::env;
use std::fs;

use serial_test::serial;
use tempfile::TempDir;

use voice_relay::config::{BridgeConfig, ENV_GEMINI_API_KEY, ENV_RELAY_BASE_URL, ENV_RELAY_SECRET};
use voice_relay::core::session::{BaseSession, GeminiLiveSession, ResponseModality};

fn cleanup_env_vars() {
    unsafe {
        env::remove_var(ENV_GEMINI_API_KEY);
        env::remove_var(ENV_RELAY_BASE_URL);
        env::remove_var(ENV_RELAY_SECRET);
    }
}

#[test]
#[serial]
fn test_full_yaml_builds_session_and_relay() {
    cleanup_env_vars();

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("voice-relay.yaml");
    fs::write(
        &config_path,
        r#"
session:
  api_key: "yaml-key"
  model: "gemini-live-test"
  voice: "Charon"
  url: "ws://127.0.0.1:9000/ws"
  response_modality: "audio"
  system_instruction: "Answer in one sentence."

relay:
  base_url: "https://relay.example.com/"
  secret: "yaml-secret"

functions:
  - name: "send_message"
    description: "Forward a request"
    parameters:
      required: ["message"]
  - name: "restart_service"
    description: "Restart a service"
    parameters:
      required: ["service"]
      optional: ["reason"]

reconnection:
  enabled: true
  max_attempts: 2
  initial_delay_ms: 250
"#,
    )
    .unwrap();

    let config = BridgeConfig::from_file(&config_path).unwrap();
    assert_eq!(config.response_modality, ResponseModality::Audio);
    assert!(config.reconnection.enabled);
    assert_eq!(config.reconnection.max_attempts, 2);

    let session_config = config.session_config().unwrap();
    let session = GeminiLiveSession::new(session_config).unwrap();
    assert_eq!(session.model(), "models/gemini-live-test");
    assert_eq!(session.voice().as_str(), "Charon");
    assert_eq!(session.endpoint(), "ws://127.0.0.1:9000/ws");

    let info = session.get_provider_info();
    assert_eq!(info["provider"], "gemini");

    let relay = config.relay_client().unwrap();
    assert_eq!(relay.base_url(), "https://relay.example.com");

    // Secrets never show up in debug output
    let debug = format!("{:?}", config);
    assert!(!debug.contains("yaml-key"));
    assert!(!debug.contains("yaml-secret"));
}

#[test]
#[serial]
fn test_env_fills_gaps_in_yaml() {
    cleanup_env_vars();
    unsafe {
        env::set_var(ENV_GEMINI_API_KEY, "env-key");
        env::set_var(ENV_RELAY_BASE_URL, "http://127.0.0.1:7000");
        env::set_var(ENV_RELAY_SECRET, "env-secret");
    }

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("voice-relay.yaml");
    fs::write(&config_path, "session:\n  response_modality: text\n").unwrap();

    let config = BridgeConfig::from_file(&config_path).unwrap();
    assert_eq!(config.api_key.as_deref(), Some("env-key"));
    assert_eq!(config.response_modality, ResponseModality::Text);
    assert!(config.has_relay());
    assert_eq!(config.functions.len(), 2);

    cleanup_env_vars();
}

#[test]
#[serial]
fn test_invalid_relay_url_in_yaml_is_rejected() {
    cleanup_env_vars();

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("voice-relay.yaml");
    fs::write(&config_path, "relay:\n  base_url: \"mailto:ops@example.com\"\n").unwrap();

    let err = BridgeConfig::from_file(&config_path).unwrap_err();
    assert!(err.to_string().contains("http or https"));
}
