//! Gemini Live API session.
//!
//! # Supported Voices
//!
//! Puck, Charon, Kore, Fenrir, Aoede, Leda, Orus, Zephyr
//!
//! # Audio Format
//!
//! Input audio is PCM 16-bit signed little-endian at 16kHz; output audio is
//! 24kHz. Audio output is reduced to [`ControlEvent::AudioChunk`] events;
//! playback is left to the caller.
//!
//! [`ControlEvent::AudioChunk`]: crate::core::events::ControlEvent::AudioChunk

mod client;
mod config;
mod messages;

pub use client::GeminiLiveSession;
pub use config::{
    DEFAULT_GEMINI_MODEL, GEMINI_INPUT_AUDIO_MIME, GEMINI_INPUT_SAMPLE_RATE, GEMINI_LIVE_URL,
    GEMINI_OUTPUT_SAMPLE_RATE, GeminiVoice, model_resource,
};
pub use messages::{ClientMessage, ServerMessage, SetupMessage, flatten_args};
