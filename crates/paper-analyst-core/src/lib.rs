//! # Paper Analyst Core
//!
//! Pure logic shared by the Paper Analyst binary: data models, the text
//! sanitizer, the fixed-length chunker, context assembly, and the session
//! state object with its snapshot format.
//!
//! This crate does no filesystem, network or async I/O; extraction, token
//! counting and the model client live in the `paper-analyst` crate.

pub mod chunk;
pub mod context;
pub mod error;
pub mod models;
pub mod sanitize;
pub mod session;

pub use error::{AnalystError, Result};
