//! Gemini Live API configuration types.

use serde::{Deserialize, Serialize};

/// Gemini Live WebSocket endpoint.
pub const GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default model for live sessions.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-live-001";

/// Sample rate the service expects for input audio.
pub const GEMINI_INPUT_SAMPLE_RATE: u32 = 16000;

/// Sample rate of the service's audio output.
pub const GEMINI_OUTPUT_SAMPLE_RATE: u32 = 24000;

/// MIME type for 16 kHz PCM input audio.
pub const GEMINI_INPUT_AUDIO_MIME: &str = "audio/pcm;rate=16000";

/// Resource name for a model, adding the `models/` prefix when missing.
pub fn model_resource(model: &str) -> String {
    let model = model.trim();
    let model = if model.is_empty() {
        DEFAULT_GEMINI_MODEL
    } else {
        model
    };
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

// =============================================================================
// Voices
// =============================================================================

/// Prebuilt voices of the Live API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeminiVoice {
    /// Puck (default)
    #[default]
    Puck,
    /// Charon
    Charon,
    /// Kore
    Kore,
    /// Fenrir
    Fenrir,
    /// Aoede
    Aoede,
    /// Leda
    Leda,
    /// Orus
    Orus,
    /// Zephyr
    Zephyr,
}

impl GeminiVoice {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Puck => "Puck",
            Self::Charon => "Charon",
            Self::Kore => "Kore",
            Self::Fenrir => "Fenrir",
            Self::Aoede => "Aoede",
            Self::Leda => "Leda",
            Self::Orus => "Orus",
            Self::Zephyr => "Zephyr",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "puck" => Self::Puck,
            "charon" => Self::Charon,
            "kore" => Self::Kore,
            "fenrir" => Self::Fenrir,
            "aoede" => Self::Aoede,
            "leda" => Self::Leda,
            "orus" => Self::Orus,
            "zephyr" => Self::Zephyr,
            _ => Self::default(),
        }
    }

    /// Get all available voices.
    pub fn all() -> &'static [GeminiVoice] {
        &[
            Self::Puck,
            Self::Charon,
            Self::Kore,
            Self::Fenrir,
            Self::Aoede,
            Self::Leda,
            Self::Orus,
            Self::Zephyr,
        ]
    }
}

impl std::fmt::Display for GeminiVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
