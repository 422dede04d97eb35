//! Gemini Live WebSocket message types.
//!
//! Client messages are externally tagged JSON objects with exactly one
//! top-level key:
//! - `setup` - first frame, carries model, modalities, tools
//! - `realtimeInput` - streamed media chunks
//! - `clientContent` - text turns
//! - `toolResponse` - answers to function calls
//!
//! Server messages carry at most a handful of optional top-level fields and
//! are decoded into [`RawEvent`]s by [`ServerMessage::into_raw_events`].

use std::collections::BTreeMap;

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::events::{ControlEvent, FunctionCallRequest, ModelPart, RawEvent, TextPart};
use crate::core::session::base::{FunctionDeclaration, ResponseModality};

// =============================================================================
// Client Messages
// =============================================================================

/// Message sent to the service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// Session setup
    Setup(SetupMessage),
    /// Streamed media
    RealtimeInput(RealtimeInput),
    /// Conversation content
    ClientContent(ClientContent),
    /// Function call results
    ToolResponse(ToolResponse),
}

impl ClientMessage {
    /// Audio chunk, base64 encoded.
    pub fn audio(data: &[u8], mime_type: &str) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![Blob {
                mime_type: mime_type.to_string(),
                data: BASE64_STANDARD.encode(data),
            }],
        })
    }

    /// Single-part user text turn.
    pub fn user_text(text: &str, turn_complete: bool) -> Self {
        ClientMessage::ClientContent(ClientContent {
            turns: vec![Content::user(text)],
            turn_complete,
        })
    }

    /// Result of one function call.
    pub fn tool_response(id: &str, name: &str, response: serde_json::Value) -> Self {
        ClientMessage::ToolResponse(ToolResponse {
            function_responses: vec![FunctionResponse {
                id: Some(id.to_string()),
                name: name.to_string(),
                response,
            }],
        })
    }
}

/// Session setup.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupMessage {
    /// Model resource name (`models/...`)
    pub model: String,
    /// Generation settings
    pub generation_config: GenerationConfig,
    /// System instruction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    /// Declared tools
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    /// Enable transcription of user audio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<Empty>,
    /// Enable transcription of model audio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<Empty>,
}

impl SetupMessage {
    /// Build the setup frame for a session.
    pub fn new(
        model: String,
        modality: ResponseModality,
        voice: Option<&str>,
        system_instruction: Option<&str>,
        functions: &[FunctionDeclaration],
    ) -> Self {
        let audio = modality == ResponseModality::Audio;
        let speech_config = match (audio, voice) {
            (true, Some(voice)) => Some(SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig {
                        voice_name: voice.to_string(),
                    },
                },
            }),
            _ => None,
        };

        let tools = if functions.is_empty() {
            Vec::new()
        } else {
            vec![Tool {
                function_declarations: functions
                    .iter()
                    .map(|f| WireFunctionDeclaration {
                        name: f.name.clone(),
                        description: f.description.clone(),
                        parameters: f.parameters.to_json_schema(),
                    })
                    .collect(),
            }]
        };

        Self {
            model,
            generation_config: GenerationConfig {
                response_modalities: vec![modality.as_str().to_string()],
                speech_config,
            },
            system_instruction: system_instruction
                .filter(|s| !s.trim().is_empty())
                .map(Content::text),
            tools,
            input_audio_transcription: Some(Empty {}),
            output_audio_transcription: audio.then_some(Empty {}),
        }
    }
}

/// Empty JSON object, used to switch features on.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Empty {}

/// Generation settings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// `AUDIO` or `TEXT`
    pub response_modalities: Vec<String>,
    /// Voice selection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

/// Speech output settings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    /// Voice
    pub voice_config: VoiceConfig,
}

/// Voice settings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    /// Prebuilt voice
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

/// Prebuilt voice reference.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    /// Voice name
    pub voice_name: String,
}

/// Conversation content.
#[derive(Debug, Clone, Serialize)]
pub struct Content {
    /// Speaker role
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Parts
    pub parts: Vec<ContentPart>,
}

impl Content {
    /// Role-less single text part.
    pub fn text(text: &str) -> Self {
        Self {
            role: None,
            parts: vec![ContentPart {
                text: text.to_string(),
            }],
        }
    }

    /// User single text part.
    pub fn user(text: &str) -> Self {
        Self {
            role: Some("user".to_string()),
            ..Self::text(text)
        }
    }
}

/// Text part of client content.
#[derive(Debug, Clone, Serialize)]
pub struct ContentPart {
    /// Text
    pub text: String,
}

/// Tool group.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Declared functions
    pub function_declarations: Vec<WireFunctionDeclaration>,
}

/// Function declaration as sent on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct WireFunctionDeclaration {
    /// Name
    pub name: String,
    /// Description
    pub description: String,
    /// Parameter schema
    pub parameters: serde_json::Value,
}

/// Streamed media.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    /// Media chunks
    pub media_chunks: Vec<Blob>,
}

/// Inline binary data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    /// MIME type
    #[serde(default)]
    pub mime_type: String,
    /// Base64 payload
    #[serde(default)]
    pub data: String,
}

/// Client conversation content.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    /// Turns
    pub turns: Vec<Content>,
    /// Whether the model should respond now
    pub turn_complete: bool,
}

/// Function call results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    /// One response per call
    pub function_responses: Vec<FunctionResponse>,
}

/// Result of one function call.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionResponse {
    /// Call id from the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Function name
    pub name: String,
    /// Result object
    pub response: serde_json::Value,
}

// =============================================================================
// Server Messages
// =============================================================================

/// Message received from the service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    /// Setup acknowledged
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    /// Model output and transcriptions
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    /// Function calls
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
    /// Cancelled function calls
    #[serde(default)]
    pub tool_call_cancellation: Option<ToolCallCancellation>,
    /// Impending disconnect
    #[serde(default)]
    pub go_away: Option<GoAway>,
    /// Token accounting, unused
    #[serde(default)]
    pub usage_metadata: Option<serde_json::Value>,
}

/// Model output and transcriptions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    /// Model turn
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,
    /// Model turn finished
    #[serde(default)]
    pub turn_complete: Option<bool>,
    /// Model interrupted by the user
    #[serde(default)]
    pub interrupted: Option<bool>,
    /// Model finished generating
    #[serde(default)]
    pub generation_complete: Option<bool>,
    /// Transcription of user audio
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    /// Transcription of model audio
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
}

/// Model turn content.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelTurn {
    /// Parts
    #[serde(default)]
    pub parts: Vec<ServerPart>,
}

/// One part of a model turn.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerPart {
    /// Text
    #[serde(default)]
    pub text: Option<String>,
    /// Inline media (audio)
    #[serde(default)]
    pub inline_data: Option<Blob>,
    /// Function call
    #[serde(default)]
    pub function_call: Option<WireFunctionCall>,
}

/// Transcription fragment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Transcription {
    /// Text
    #[serde(default)]
    pub text: Option<String>,
}

/// Function call as received on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireFunctionCall {
    /// Call id
    #[serde(default)]
    pub id: Option<String>,
    /// Function name
    #[serde(default)]
    pub name: String,
    /// Arbitrary JSON arguments
    #[serde(default)]
    pub args: Option<serde_json::Map<String, serde_json::Value>>,
}

impl WireFunctionCall {
    /// Convert into a call request with flattened arguments.
    pub fn into_request(self) -> FunctionCallRequest {
        FunctionCallRequest {
            name: self.name,
            args: flatten_args(self.args.unwrap_or_default()),
            call_id: self.id,
        }
    }
}

/// Function calls.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Calls
    #[serde(default)]
    pub function_calls: Vec<WireFunctionCall>,
}

/// Cancelled function calls.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallCancellation {
    /// Call ids
    #[serde(default)]
    pub ids: Vec<String>,
}

/// Impending disconnect notice.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    /// Remaining time, e.g. `"10s"`
    #[serde(default)]
    pub time_left: Option<String>,
}

/// Flatten JSON arguments to strings: strings verbatim, everything else as
/// its JSON rendering.
pub fn flatten_args(
    args: serde_json::Map<String, serde_json::Value>,
) -> BTreeMap<String, String> {
    args.into_iter()
        .map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, v)
        })
        .collect()
}

impl ServerMessage {
    /// Decode one frame.
    pub fn parse(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Whether the frame acknowledges setup.
    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Convert into zero or more raw events, in frame order.
    pub fn into_raw_events(self) -> Vec<RawEvent> {
        let mut events = Vec::new();

        if self.setup_complete.is_some() {
            events.push(RawEvent::Control(ControlEvent::SetupComplete));
        }

        if let Some(content) = self.server_content {
            if let Some(text) = content.input_transcription.and_then(|t| t.text) {
                events.push(RawEvent::UserTurn {
                    parts: vec![TextPart { text: Some(text) }],
                    turn_complete: false,
                });
            }

            if let Some(turn) = content.model_turn {
                let mut parts = Vec::new();
                for part in turn.parts {
                    if let Some(blob) = part.inline_data {
                        let bytes = BASE64_STANDARD
                            .decode(blob.data.as_bytes())
                            .map(|b| b.len())
                            .unwrap_or(0);
                        events.push(RawEvent::Control(ControlEvent::AudioChunk { bytes }));
                    }
                    if part.text.is_some() || part.function_call.is_some() {
                        parts.push(ModelPart {
                            text: part.text,
                            function_call: part.function_call.map(WireFunctionCall::into_request),
                        });
                    }
                }
                if !parts.is_empty() {
                    events.push(RawEvent::ServerTurn { parts });
                }
            }

            if let Some(text) = content.output_transcription.and_then(|t| t.text) {
                events.push(RawEvent::assistant_text(text));
            }
            if content.interrupted == Some(true) {
                events.push(RawEvent::Control(ControlEvent::Interrupted));
            }
            if content.generation_complete == Some(true) {
                events.push(RawEvent::Control(ControlEvent::GenerationComplete));
            }
            if content.turn_complete == Some(true) {
                events.push(RawEvent::Control(ControlEvent::TurnComplete));
            }
        }

        if let Some(call) = self.tool_call {
            let parts: Vec<ModelPart> = call
                .function_calls
                .into_iter()
                .map(|c| ModelPart::function_call(c.into_request()))
                .collect();
            if !parts.is_empty() {
                events.push(RawEvent::ServerTurn { parts });
            }
        }

        if let Some(cancel) = self.tool_call_cancellation {
            events.push(RawEvent::Control(ControlEvent::ToolCallCancellation {
                ids: cancel.ids,
            }));
        }

        if let Some(go_away) = self.go_away {
            events.push(RawEvent::Control(ControlEvent::GoAway {
                time_left: go_away.time_left,
            }));
        }

        events
    }
}
