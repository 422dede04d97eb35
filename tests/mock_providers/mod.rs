//! Mock servers for integration tests.
//!
//! - `live_mock`: in-process Live API WebSocket server with scripted replies
//!
//! The relay side is mocked with `wiremock` directly in the tests.

// Not every test binary uses every helper
#![allow(dead_code)]

pub mod live_mock;

pub use live_mock::{LiveMockState, Responder, spawn_live_mock};

use serde_json::{Value, json};

/// `serverContent` frame with one model text part.
pub fn model_text(text: &str) -> Value {
    json!({
        "serverContent": {
            "modelTurn": { "parts": [{ "text": text }] }
        }
    })
}

/// `serverContent` frame that closes the model turn.
pub fn turn_complete() -> Value {
    json!({ "serverContent": { "turnComplete": true } })
}

/// `toolCall` frame with a single function call.
pub fn tool_call(id: &str, name: &str, args: Value) -> Value {
    json!({
        "toolCall": {
            "functionCalls": [{ "id": id, "name": name, "args": args }]
        }
    })
}

/// `serverContent` frame with a function call inside the model turn.
pub fn model_function_call(name: &str, args: Value) -> Value {
    json!({
        "serverContent": {
            "modelTurn": { "parts": [{ "functionCall": { "name": name, "args": args } }] }
        }
    })
}

/// Text of a `clientContent` frame, if the frame is one.
pub fn client_text(message: &Value) -> Option<String> {
    message
        .pointer("/clientContent/turns/0/parts/0/text")
        .and_then(|t| t.as_str())
        .map(str::to_string)
}
