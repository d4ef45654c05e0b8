//! Core data models used throughout Paper Analyst.
//!
//! These types represent the loaded documents, the conversation, and the
//! token accounting that flow between the loader, the context assembler,
//! and the chat turn.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One loaded unit of text content.
///
/// When a source file was split by the chunker, every part becomes its own
/// `Document` whose filename carries a `" (Part N)"` suffix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub filename: String,
    pub content: String,
}

impl Document {
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }
}

/// Who authored a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single entry in the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Token counters for one turn or for a whole session.
///
/// Only [`UsageStats::record`] mutates the counters, which keeps
/// `total_tokens == input_tokens + output_tokens`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl UsageStats {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
        }
    }

    /// True when `total_tokens` is exactly input plus output.
    pub fn is_consistent(&self) -> bool {
        self.input_tokens.checked_add(self.output_tokens) == Some(self.total_tokens)
    }

    /// Add one turn's counts to the running totals.
    pub fn record(&mut self, input_tokens: u64, output_tokens: u64) {
        *self = Self::new(
            self.input_tokens.saturating_add(input_tokens),
            self.output_tokens.saturating_add(output_tokens),
        );
    }
}

/// Usage snapshot of the most recent committed turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnUsage {
    pub usage: UsageStats,
    /// Input ceiling of the model the turn ran against.
    pub ceiling: u64,
    /// Set when either count came from the character-length fallback.
    pub approximate: bool,
}

impl TurnUsage {
    /// One-line summary: `turn: 150/8000 (in: 120, out: 30) | session total: 150`.
    pub fn summary(&self, session_total: &UsageStats) -> String {
        format!(
            "turn: {}{}/{} (in: {}, out: {}) | session total: {}",
            if self.approximate { "~" } else { "" },
            self.usage.total_tokens,
            self.ceiling,
            self.usage.input_tokens,
            self.usage.output_tokens,
            session_total.total_tokens
        )
    }
}

/// A non-fatal anomaly observed during a load pass.
///
/// Stored in the session as plain strings (via `Display`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    /// The path does not exist or is not a directory.
    InvalidFolder { path: String },
    /// The PDF parsed but carried no text layer.
    ScannedPdf { filename: String },
    /// Non-empty file from which no text could be extracted.
    Unreadable { filename: String },
    /// The file exceeded the chunk limit and was split.
    Split { filename: String, parts: usize },
    /// The folder produced neither documents nor warnings.
    NothingFound,
    /// More documents than the cap were produced; the rest were dropped.
    Truncated { max_documents: usize },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadWarning::InvalidFolder { path } => {
                write!(f, "error: '{}' is not a valid folder", path)
            }
            LoadWarning::ScannedPdf { filename } => write!(
                f,
                "warning: '{}' may be a scanned image PDF with no text layer",
                filename
            ),
            LoadWarning::Unreadable { filename } => write!(
                f,
                "warning: could not extract text from '{}'; the format may be unsupported or the file corrupt",
                filename
            ),
            LoadWarning::Split { filename, parts } => write!(
                f,
                "info: '{}' exceeded the size limit and was split into {} parts",
                filename, parts
            ),
            LoadWarning::NothingFound => {
                write!(f, "no readable files were found in the folder")
            }
            LoadWarning::Truncated { max_documents } => write!(
                f,
                "maximum of {n} documents exceeded; only the first {n} were loaded",
                n = max_documents
            ),
        }
    }
}

/// Result of a load pass: documents in directory order plus warnings.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub warnings: Vec<LoadWarning>,
}

impl LoadReport {
    /// Keep at most `max_documents`, recording one truncation warning if
    /// anything was dropped.
    pub fn cap_documents(&mut self, max_documents: usize) {
        if self.documents.len() > max_documents {
            self.documents.truncate(max_documents);
            self.warnings.push(LoadWarning::Truncated { max_documents });
        }
    }

    pub fn warning_strings(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }
}
