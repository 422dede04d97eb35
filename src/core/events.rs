//! Raw session events and the append-only event log.
//!
//! Every frame the session client decodes is turned into one or more
//! [`RawEvent`]s. The bridge appends them to an [`EventLog`] in arrival order;
//! the transcript reducer and the function-call dispatcher only ever read it.
//!
//! # Ordering
//!
//! The log position (`seq`) is the single source of truth for conversation
//! order. Events are immutable once appended.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::watch;

// =============================================================================
// Event Types
// =============================================================================

/// A text fragment of a user turn.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextPart {
    /// Text content, absent for non-text parts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl TextPart {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }
}

/// Structured request from the assistant to perform an external action.
///
/// The issue time of a call is the timestamp of the log entry that carries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCallRequest {
    /// Declared function name
    pub name: String,
    /// Arguments flattened to strings
    #[serde(default)]
    pub args: BTreeMap<String, String>,
    /// Upstream call identifier, used only to answer the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

impl FunctionCallRequest {
    /// Create a call request without an upstream id.
    pub fn new<K, V>(name: impl Into<String>, args: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            args: args
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            call_id: None,
        }
    }

    /// Attach the upstream call id.
    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }
}

/// One part of a model turn.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelPart {
    /// Text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Function call request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallRequest>,
}

impl ModelPart {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            function_call: None,
        }
    }

    /// Create a function call part.
    pub fn function_call(call: FunctionCallRequest) -> Self {
        Self {
            text: None,
            function_call: Some(call),
        }
    }
}

/// Non-content events from the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlEvent {
    /// Session setup acknowledged by the service
    SetupComplete,
    /// The model finished its turn
    TurnComplete,
    /// The model finished generating (audio may still be playing)
    GenerationComplete,
    /// The model was interrupted by user speech
    Interrupted,
    /// Model audio output; only the size is retained
    AudioChunk {
        /// Decoded length in bytes
        bytes: usize,
    },
    /// The service will close the session soon
    GoAway {
        /// Remaining time as reported by the service
        time_left: Option<String>,
    },
    /// Previously issued function calls were cancelled upstream
    ToolCallCancellation {
        /// Cancelled call ids
        ids: Vec<String>,
    },
}

/// A decoded session event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawEvent {
    /// User content (typed text or input transcription)
    UserTurn {
        /// Ordered parts
        parts: Vec<TextPart>,
        /// Whether the user turn is complete
        turn_complete: bool,
    },
    /// Assistant content (text, output transcription, or function calls)
    ServerTurn {
        /// Ordered parts
        parts: Vec<ModelPart>,
    },
    /// Anything else
    Control(ControlEvent),
}

impl RawEvent {
    /// Single-part user turn.
    pub fn user_text(text: impl Into<String>, turn_complete: bool) -> Self {
        RawEvent::UserTurn {
            parts: vec![TextPart::text(text)],
            turn_complete,
        }
    }

    /// Single-part assistant text turn.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        RawEvent::ServerTurn {
            parts: vec![ModelPart::text(text)],
        }
    }

    /// Single-part assistant function call.
    pub fn function_call(call: FunctionCallRequest) -> Self {
        RawEvent::ServerTurn {
            parts: vec![ModelPart::function_call(call)],
        }
    }

    /// Function calls carried by the event, in part order.
    pub fn function_calls(&self) -> impl Iterator<Item = &FunctionCallRequest> {
        self.function_call_parts().map(|(_, call)| call)
    }

    /// Function calls paired with the index of the part carrying them.
    pub fn function_call_parts(&self) -> impl Iterator<Item = (usize, &FunctionCallRequest)> {
        let parts: &[ModelPart] = match self {
            RawEvent::ServerTurn { parts } => parts,
            _ => &[],
        };
        parts
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.function_call.as_ref().map(|call| (i, call)))
    }

    /// Whether the event can produce conversation content.
    pub fn is_content(&self) -> bool {
        !matches!(self, RawEvent::Control(_))
    }
}

/// An event as stored in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedEvent {
    /// Zero-based log position
    pub seq: u64,
    /// Receive time
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    /// The event
    pub event: RawEvent,
}

// =============================================================================
// Event Log
// =============================================================================

/// Append-only, time-ordered event store.
///
/// Cloning yields another handle to the same log. Readers are notified of
/// growth through [`EventLog::subscribe`].
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<LoggedEvent>>>,
    len_tx: Arc<watch::Sender<usize>>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").field("len", &self.len()).finish()
    }
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        let (len_tx, _) = watch::channel(0);
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            len_tx: Arc::new(len_tx),
        }
    }

    /// Append an event stamped with the current time. Returns its position.
    pub fn append(&self, event: RawEvent) -> u64 {
        self.append_at(event, OffsetDateTime::now_utc())
    }

    /// Append an event with an explicit timestamp. Returns its position.
    pub fn append_at(&self, event: RawEvent, at: OffsetDateTime) -> u64 {
        let (seq, len) = {
            let mut events = self.events.write();
            let seq = events.len() as u64;
            events.push(LoggedEvent { seq, at, event });
            (seq, events.len())
        };
        self.len_tx.send_replace(len);
        seq
    }

    /// Run `f` over the current contents without copying them.
    pub fn read<R>(&self, f: impl FnOnce(&[LoggedEvent]) -> R) -> R {
        f(&self.events.read())
    }

    /// Owned copy of the full log.
    pub fn snapshot(&self) -> Vec<LoggedEvent> {
        self.events.read().clone()
    }

    /// Owned copy of the events at positions `>= seq`.
    pub fn since(&self, seq: u64) -> Vec<LoggedEvent> {
        let events = self.events.read();
        let start = (seq as usize).min(events.len());
        events[start..].to_vec()
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Watch the log length.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.len_tx.subscribe()
    }
}
