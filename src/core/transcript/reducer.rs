//! Derives the visible conversation from the raw event log.
//!
//! The reduction is pure: the same log always yields the same entries, so the
//! bridge can rerun it on every log update instead of maintaining it
//! incrementally.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

use crate::core::dispatch::{DispatchOutcome, DispatchRecord, SEND_MESSAGE_FUNCTION};
use crate::core::events::{LoggedEvent, RawEvent};

/// Speaker of a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human side
    User,
    /// The model side, including dispatch announcements
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Origin of a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Reduced from a user or server turn
    Speech,
    /// Announcement that a function call was forwarded to the relay
    Dispatch,
    /// Relay outcome for a dispatched call
    DispatchResult,
}

impl EntryKind {
    fn rank(self) -> u8 {
        match self {
            EntryKind::Speech => 0,
            EntryKind::Dispatch => 1,
            EntryKind::DispatchResult => 2,
        }
    }
}

/// One line of the derived conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    /// Speaker
    pub role: Role,
    /// Text content
    pub text: String,
    /// Timestamp of the originating event (or of the dispatch)
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    /// Log position of the originating event
    pub seq: u64,
    /// Index of the originating part within its event
    pub part: usize,
    /// Origin
    pub kind: EntryKind,
}

/// Bare newlines and whitespace-only fragments are stream artifacts.
fn is_content_text(text: &str) -> bool {
    !text.trim().is_empty()
}

/// Reduce a log to its conversation entries, in log order.
pub fn reduce(events: &[LoggedEvent]) -> Vec<ConversationEntry> {
    let mut entries = Vec::new();

    for logged in events {
        match &logged.event {
            RawEvent::UserTurn { parts, .. } => {
                let texts = parts
                    .iter()
                    .enumerate()
                    .filter_map(|(i, p)| p.text.as_deref().map(|t| (i, t)));
                for (part, text) in texts {
                    if is_content_text(text) {
                        entries.push(ConversationEntry {
                            role: Role::User,
                            text: text.to_string(),
                            time: logged.at,
                            seq: logged.seq,
                            part,
                            kind: EntryKind::Speech,
                        });
                    }
                }
            }
            RawEvent::ServerTurn { parts } => {
                let texts = parts
                    .iter()
                    .enumerate()
                    .filter_map(|(i, p)| p.text.as_deref().map(|t| (i, t)));
                for (part, text) in texts {
                    if is_content_text(text) {
                        entries.push(ConversationEntry {
                            role: Role::Assistant,
                            text: text.to_string(),
                            time: logged.at,
                            seq: logged.seq,
                            part,
                            kind: EntryKind::Speech,
                        });
                    }
                }
            }
            RawEvent::Control(_) => {}
        }
    }

    entries
}

/// Text shown when a call is forwarded to the relay.
pub fn announcement_text(record: &DispatchRecord) -> String {
    if record.name == SEND_MESSAGE_FUNCTION {
        let message = record.args.get("message").map(String::as_str).unwrap_or("");
        return format!("Sending message to relay: \"{}\"", message);
    }

    let args = record
        .args
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v))
        .collect::<Vec<_>>()
        .join(", ");
    format!("Dispatching {}({})", record.name, args)
}

fn outcome_text(record: &DispatchRecord) -> Option<String> {
    let detail = record.message.as_deref().unwrap_or("");
    match record.outcome {
        DispatchOutcome::Pending => None,
        DispatchOutcome::Sent => Some(if detail.is_empty() {
            format!("{} sent", record.name)
        } else {
            format!("{} sent: {}", record.name, detail)
        }),
        DispatchOutcome::Failed => Some(format!("{} failed: {}", record.name, detail)),
    }
}

/// Reduce the log and interleave the dispatch entries.
///
/// Entries are ordered by originating log position, then by part within the
/// event. A call's outcome follows its own announcement.
pub fn compose(events: &[LoggedEvent], records: &[DispatchRecord]) -> Vec<ConversationEntry> {
    let mut entries = reduce(events);

    for record in records {
        entries.push(ConversationEntry {
            role: Role::Assistant,
            text: announcement_text(record),
            time: record.dispatched_at,
            seq: record.seq,
            part: record.part,
            kind: EntryKind::Dispatch,
        });
        if let Some(text) = outcome_text(record) {
            entries.push(ConversationEntry {
                role: Role::Assistant,
                text,
                time: record.completed_at.unwrap_or(record.dispatched_at),
                seq: record.seq,
                part: record.part,
                kind: EntryKind::DispatchResult,
            });
        }
    }

    // Stable: reduced entries keep their relative order within a position.
    entries.sort_by_key(|e| (e.seq, e.part, e.kind.rank()));
    entries
}
