//! Streaming-response accumulation with cooperative cancellation.
//!
//! [`accumulate`] drains a [`FragmentStream`] into one string, handing the
//! growing partial text to a callback after every fragment. A shared
//! [`CancelFlag`] is checked before waiting for each fragment and again as
//! soon as one arrives, so cancellation takes effect within one fragment.
//! Whatever was gathered up to that point is kept as the response.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, warn};

use paper_analyst_core::AnalystError;

use crate::client::FragmentStream;

/// Shared stop signal for the in-flight generation.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag before the next turn.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// How the stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    Completed,
    Cancelled,
    Failed(AnalystError),
}

/// Final text plus how it was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    pub text: String,
    pub status: StreamStatus,
}

impl StreamOutcome {
    /// The condition the caller should surface, if any.
    pub fn error(&self) -> Option<AnalystError> {
        match &self.status {
            StreamStatus::Completed => None,
            StreamStatus::Cancelled => Some(AnalystError::GenerationCancelled),
            StreamStatus::Failed(e) => Some(e.clone()),
        }
    }
}

/// Consume `stream` until it ends, fails, or `cancel` is raised.
///
/// `on_partial` sees the accumulated text after each non-empty fragment;
/// it is for display only, never the committed record.
pub async fn accumulate<F>(
    mut stream: FragmentStream,
    cancel: &CancelFlag,
    mut on_partial: F,
) -> StreamOutcome
where
    F: FnMut(&str),
{
    let mut text = String::new();
    let status = loop {
        if cancel.is_cancelled() {
            break StreamStatus::Cancelled;
        }
        let Some(item) = stream.next().await else {
            break StreamStatus::Completed;
        };
        if cancel.is_cancelled() {
            break StreamStatus::Cancelled;
        }
        match item {
            Ok(fragment) => {
                if let Some(content) = fragment.content.filter(|c| !c.is_empty()) {
                    text.push_str(&content);
                    on_partial(&text);
                }
            }
            Err(e) => break StreamStatus::Failed(e),
        }
    };

    match &status {
        StreamStatus::Completed => debug!(chars = text.len(), "stream completed"),
        StreamStatus::Cancelled => info!(chars = text.len(), "generation cancelled"),
        StreamStatus::Failed(e) => warn!(error = %e, chars = text.len(), "stream failed"),
    }
    StreamOutcome { text, status }
}
