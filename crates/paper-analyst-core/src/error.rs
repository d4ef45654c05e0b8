//! Error types for Paper Analyst.
//!
//! Per-file extraction problems never surface here as errors; the loader
//! downgrades them to [`LoadWarning`](crate::models::LoadWarning)s. The
//! variants below are the conditions a caller has to react to.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalystError {
    #[error("'{path}' is not a valid folder")]
    InvalidFolder { path: String },

    #[error("could not extract text from '{filename}': {reason}")]
    ExtractionFailure { filename: String, reason: String },

    #[error("unsupported session format: {0}")]
    SessionFormat(String),

    #[error(
        "input is {tokens} tokens, which exceeds the {ceiling}-token limit of model '{model}'; \
         select fewer documents or shorten the question"
    )]
    TokenBudgetExceeded {
        tokens: u64,
        model: String,
        ceiling: u64,
    },

    #[error("generation was stopped by the user")]
    GenerationCancelled,

    #[error("model call failed: {0}")]
    RemoteCallFailure(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("the system role has already been defined for this session")]
    SystemRoleAlreadyDefined,

    #[error("define the system role before chatting")]
    SystemRoleUndefined,

    #[error("a response is still being generated")]
    GenerationInProgress,

    #[error("the conversation has no user turn to answer")]
    NoUserTurn,
}

pub type Result<T> = std::result::Result<T, AnalystError>;
