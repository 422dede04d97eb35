//! Conversation derivation and export.

mod export;
mod reducer;

pub use export::{MarkdownExporter, TranscriptExporter};
pub use reducer::{ConversationEntry, EntryKind, Role, announcement_text, compose, reduce};
