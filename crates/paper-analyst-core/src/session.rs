//! Session state and its JSON snapshot format.
//!
//! A [`SessionContext`] owns everything one analyst session knows: the
//! loaded documents, the conversation, the selected model, and the running
//! token totals. It is passed by reference to the loader and the chat turn;
//! nothing here is global.
//!
//! # Lifecycle
//!
//! ```text
//! new() ──▶ Initial ──replace_documents()/restore_json()──▶ Ready
//!              ▲                                             │
//!              └──────────────────── reset() ◀───────────────┘
//! ```
//!
//! Within `Ready`, [`SessionContext::define_system_role`] must run once
//! before the first [`SessionContext::begin_turn`].
//!
//! # Snapshot format
//!
//! ```json
//! {
//!   "messages": [{"role": "system", "content": "..."}],
//!   "loaded_documents": [{"filename": "a.pdf", "content": "..."}],
//!   "selected_model": "gpt-4.1 (documents)",
//!   "total_usage": {"input_tokens": 0, "output_tokens": 0, "total_tokens": 0},
//!   "load_warnings": []
//! }
//! ```
//!
//! `messages`, `loaded_documents` and `selected_model` are required;
//! `total_usage` and `load_warnings` default to zero / empty.

use serde::{Deserialize, Serialize};

use crate::context::Selection;
use crate::error::{AnalystError, Result};
use crate::models::{Document, LoadReport, Message, Role, TurnUsage, UsageStats};

/// Where the session is in its setup flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AppStatus {
    /// No documents loaded yet.
    #[default]
    Initial,
    /// Documents loaded (or a snapshot restored); chat may begin.
    Ready,
}

/// Serialized form of a session, as written to and read from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub messages: Vec<Message>,
    pub loaded_documents: Vec<Document>,
    pub selected_model: String,
    #[serde(default)]
    pub total_usage: UsageStats,
    #[serde(default)]
    pub load_warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub status: AppStatus,
    pub selected_model: Option<String>,
    pub loaded_documents: Vec<Document>,
    pub load_warnings: Vec<String>,
    pub messages: Vec<Message>,
    pub system_role_defined: bool,
    pub total_usage: UsageStats,
    pub is_generating: bool,
    pub last_usage: Option<TurnUsage>,
    pub selection: Selection,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return every field to its initial value in one step.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn select_model(&mut self, model: impl Into<String>) {
        self.selected_model = Some(model.into());
    }

    /// Replace the document set wholesale with the result of a load pass.
    ///
    /// The selection falls back to "all documents".
    pub fn replace_documents(&mut self, report: LoadReport) -> Result<()> {
        if self.is_generating {
            return Err(AnalystError::GenerationInProgress);
        }
        self.load_warnings = report.warning_strings();
        self.loaded_documents = report.documents;
        self.selection = Selection::All;
        self.status = AppStatus::Ready;
        Ok(())
    }

    /// Set the assistant persona. Allowed once per session.
    pub fn define_system_role(&mut self, prompt: impl Into<String>) -> Result<()> {
        if self.system_role_defined {
            return Err(AnalystError::SystemRoleAlreadyDefined);
        }
        self.messages.insert(0, Message::system(prompt));
        self.system_role_defined = true;
        Ok(())
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
    }

    /// Documents currently selected for the next turn, in list order.
    pub fn selected_documents(&self) -> Vec<&Document> {
        self.selection
            .apply(&self.loaded_documents)
            .into_iter()
            .map(|(_, doc)| doc)
            .collect()
    }

    /// Record the user's question and mark a generation as in flight.
    pub fn begin_turn(&mut self, question: impl Into<String>) -> Result<()> {
        if self.is_generating {
            return Err(AnalystError::GenerationInProgress);
        }
        if !self.system_role_defined {
            return Err(AnalystError::SystemRoleUndefined);
        }
        self.messages.push(Message::user(question));
        self.is_generating = true;
        self.last_usage = None;
        Ok(())
    }

    /// Append the assistant's response and add its usage to the totals.
    ///
    /// An empty response commits nothing.
    pub fn commit_response(&mut self, response: String, turn: TurnUsage) {
        if response.is_empty() {
            return;
        }
        self.messages.push(Message::assistant(response));
        self.total_usage
            .record(turn.usage.input_tokens, turn.usage.output_tokens);
        self.last_usage = Some(turn);
    }

    /// Mark the in-flight generation as resolved.
    pub fn end_turn(&mut self) {
        self.is_generating = false;
    }

    /// Resolve a turn that produced nothing: the pending user question is
    /// removed so history is left as it was before [`begin_turn`](Self::begin_turn).
    pub fn abandon_turn(&mut self) {
        if self.is_generating
            && self.messages.last().is_some_and(|m| m.role == Role::User)
        {
            self.messages.pop();
        }
        self.is_generating = false;
    }

    /// Messages shown to the user (the system persona is hidden).
    pub fn visible_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role != Role::System)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            messages: self.messages.clone(),
            loaded_documents: self.loaded_documents.clone(),
            selected_model: self.selected_model.clone().unwrap_or_default(),
            total_usage: self.total_usage,
            load_warnings: self.load_warnings.clone(),
        }
    }

    /// Pretty-printed snapshot JSON, non-ASCII text kept verbatim.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| AnalystError::SessionFormat(e.to_string()))
    }

    /// Replace this session with a parsed snapshot.
    ///
    /// The snapshot is fully validated before anything is touched: on error
    /// the current session is left exactly as it was.
    pub fn restore_json(&mut self, json: &str) -> Result<()> {
        if self.is_generating {
            return Err(AnalystError::GenerationInProgress);
        }
        let snapshot: SessionSnapshot =
            serde_json::from_str(json).map_err(|e| AnalystError::SessionFormat(e.to_string()))?;
        if !snapshot.total_usage.is_consistent() {
            let usage = snapshot.total_usage;
            return Err(AnalystError::SessionFormat(format!(
                "total_tokens {} does not equal input_tokens {} + output_tokens {}",
                usage.total_tokens, usage.input_tokens, usage.output_tokens
            )));
        }
        self.restore(snapshot);
        Ok(())
    }

    /// Replace this session with an already parsed snapshot. The usage
    /// total is recomputed from its input and output counts.
    pub fn restore(&mut self, snapshot: SessionSnapshot) {
        let usage = snapshot.total_usage;
        *self = Self {
            status: AppStatus::Ready,
            selected_model: Some(snapshot.selected_model),
            loaded_documents: snapshot.loaded_documents,
            load_warnings: snapshot.load_warnings,
            messages: snapshot.messages,
            system_role_defined: true,
            total_usage: UsageStats::new(usage.input_tokens, usage.output_tokens),
            ..Self::default()
        };
    }
}
