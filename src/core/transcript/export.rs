//! Transcript export.
//!
//! Formats the derived conversation as a dated document. Writing the
//! document somewhere is the caller's business.

use time::macros::format_description;
use time::{Date, OffsetDateTime};

use super::reducer::{ConversationEntry, EntryKind};

/// Formats an ordered conversation into a document.
pub trait TranscriptExporter {
    /// Render `entries` as a document dated `date`.
    fn export(&self, entries: &[ConversationEntry], date: Date) -> String;

    /// Suggested file name for a document dated `date`.
    fn file_name(&self, date: Date) -> String;
}

/// Markdown transcript exporter.
#[derive(Debug, Clone)]
pub struct MarkdownExporter {
    title: String,
    include_dispatch: bool,
}

impl Default for MarkdownExporter {
    fn default() -> Self {
        Self {
            title: "Conversation".to_string(),
            include_dispatch: true,
        }
    }
}

impl MarkdownExporter {
    /// Create an exporter with the default title.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the document title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Leave dispatch announcements and outcomes out of the document.
    pub fn speech_only(mut self) -> Self {
        self.include_dispatch = false;
        self
    }
}

fn format_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

fn format_clock(time: OffsetDateTime) -> String {
    time.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default()
}

impl TranscriptExporter for MarkdownExporter {
    fn export(&self, entries: &[ConversationEntry], date: Date) -> String {
        let mut out = format!("# {} - {}\n\n", self.title, format_date(date));

        for entry in entries {
            if !self.include_dispatch && entry.kind != EntryKind::Speech {
                continue;
            }
            let line = match entry.kind {
                EntryKind::Speech => format!(
                    "**{}** ({}): {}\n\n",
                    entry.role,
                    format_clock(entry.time),
                    entry.text
                ),
                EntryKind::Dispatch | EntryKind::DispatchResult => {
                    format!("> _{}_ ({})\n\n", entry.text, format_clock(entry.time))
                }
            };
            out.push_str(&line);
        }

        out
    }

    fn file_name(&self, date: Date) -> String {
        format!("conversation-{}.md", format_date(date))
    }
}
