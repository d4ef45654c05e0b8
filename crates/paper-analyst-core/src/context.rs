//! Context assembly for a chat turn.
//!
//! The stored conversation keeps the user's question exactly as typed. Only
//! the outgoing copy built here has its last user turn rewritten to carry
//! the selected documents:
//!
//! ```text
//! ### Reference (Document-1: intro.pdf)
//! <content>
//!
//! ---
//!
//! ### Reference (Document-3: data.csv)
//! <content>
//!
//! ---
//!
//! <instruction>
//!
//! Question: <original question>
//! ```
//!
//! Document positions are 1-based indices into the full loaded list, so a
//! document keeps its label regardless of which others are selected.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{AnalystError, Result};
use crate::models::{Document, Message, Role};

/// Default phrase placed between the references and the question.
pub const DEFAULT_INSTRUCTION: &str =
    "Answer the following question based on the reference material above.";

const DOCUMENT_SEPARATOR: &str = "\n\n---\n\n";

/// Which loaded documents are sent with the next turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selection {
    /// Every loaded document. The state before the user narrows anything.
    #[default]
    All,
    /// Only documents whose filename is listed.
    Only(Vec<String>),
}

impl Selection {
    pub fn only<I, S>(filenames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Selection::Only(filenames.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, filename: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(names) => names.iter().any(|n| n == filename),
        }
    }

    /// The selected documents, in document-list order, with their 1-based
    /// position in the full list.
    pub fn apply<'a>(&self, documents: &'a [Document]) -> Vec<(usize, &'a Document)> {
        let wanted: Option<HashSet<&str>> = match self {
            Selection::All => None,
            Selection::Only(names) => Some(names.iter().map(String::as_str).collect()),
        };
        documents
            .iter()
            .enumerate()
            .filter(|(_, doc)| {
                wanted
                    .as_ref()
                    .map_or(true, |set| set.contains(doc.filename.as_str()))
            })
            .map(|(i, doc)| (i + 1, doc))
            .collect()
    }
}

/// Render the augmented prompt for one question.
pub fn compose_prompt(
    documents: &[Document],
    selection: &Selection,
    instruction: &str,
    question: &str,
) -> String {
    let references: Vec<String> = selection
        .apply(documents)
        .into_iter()
        .map(|(position, doc)| {
            format!(
                "### Reference (Document-{}: {})\n{}",
                position, doc.filename, doc.content
            )
        })
        .collect();

    // The separator before the instruction is kept even with no references.
    format!(
        "{}{}{}\n\nQuestion: {}",
        references.join(DOCUMENT_SEPARATOR),
        DOCUMENT_SEPARATOR,
        instruction,
        question
    )
}

/// Build the outgoing message list for the model call.
///
/// Every message is copied unchanged except the final one, which must be a
/// user turn and is replaced by [`compose_prompt`]. `history` itself is
/// never modified.
pub fn assemble_messages(
    history: &[Message],
    documents: &[Document],
    selection: &Selection,
    instruction: &str,
) -> Result<Vec<Message>> {
    let (last, earlier) = history.split_last().ok_or(AnalystError::NoUserTurn)?;
    if last.role != Role::User {
        return Err(AnalystError::NoUserTurn);
    }

    let mut outgoing = earlier.to_vec();
    outgoing.push(Message::user(compose_prompt(
        documents,
        selection,
        instruction,
        &last.content,
    )));
    Ok(outgoing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs() -> Vec<Document> {
        vec![
            Document::new("intro.pdf", "INTRO BODY"),
            Document::new("methods.docx", "METHODS BODY"),
            Document::new("data.csv", "DATA BODY"),
        ]
    }

    fn history() -> Vec<Message> {
        vec![
            Message::system("You are a careful analyst."),
            Message::user("first question"),
            Message::assistant("first answer"),
            Message::user("What is the sample size?"),
        ]
    }

    #[test]
    fn only_last_user_turn_is_rewritten() {
        let history = history();
        let out = assemble_messages(&history, &docs(), &Selection::All, DEFAULT_INSTRUCTION)
            .unwrap();
        assert_eq!(out.len(), history.len());
        assert_eq!(out[..3], history[..3]);
        assert_eq!(out[3].role, Role::User);
        assert!(out[3].content.ends_with("Question: What is the sample size?"));
        assert_eq!(history[3].content, "What is the sample size?");
    }

    #[test]
    fn all_selection_includes_documents_in_order() {
        let prompt = compose_prompt(&docs(), &Selection::All, "Use the refs.", "Q?");
        let intro = prompt.find("INTRO BODY").unwrap();
        let methods = prompt.find("METHODS BODY").unwrap();
        let data = prompt.find("DATA BODY").unwrap();
        assert!(intro < methods && methods < data);
        assert!(prompt.starts_with("### Reference (Document-1: intro.pdf)\nINTRO BODY"));
        assert!(prompt.ends_with("---\n\nUse the refs.\n\nQuestion: Q?"));
    }

    #[test]
    fn unselected_documents_never_appear() {
        let selection = Selection::only(["data.csv"]);
        let prompt = compose_prompt(&docs(), &selection, DEFAULT_INSTRUCTION, "Q?");
        assert!(!prompt.contains("INTRO BODY"));
        assert!(!prompt.contains("METHODS BODY"));
        assert!(!prompt.contains("intro.pdf"));
        assert!(prompt.contains("### Reference (Document-3: data.csv)\nDATA BODY"));
    }

    #[test]
    fn documents_are_separated_by_rule() {
        let selection = Selection::only(["intro.pdf", "methods.docx"]);
        let prompt = compose_prompt(&docs(), &selection, "I", "Q");
        assert!(prompt.contains("INTRO BODY\n\n---\n\n### Reference (Document-2: methods.docx)"));
    }

    #[test]
    fn empty_selection_keeps_leading_separator() {
        let prompt = compose_prompt(&docs(), &Selection::Only(vec![]), "I", "Q");
        assert_eq!(prompt, "\n\n---\n\nI\n\nQuestion: Q");
    }

    #[test]
    fn missing_user_turn_is_rejected() {
        let history = vec![Message::system("s"), Message::assistant("a")];
        let err = assemble_messages(&history, &docs(), &Selection::All, "I").unwrap_err();
        assert_eq!(err, AnalystError::NoUserTurn);
        let err = assemble_messages(&[], &docs(), &Selection::All, "I").unwrap_err();
        assert_eq!(err, AnalystError::NoUserTurn);
    }
}
