//! # Paper Analyst
//!
//! Load a folder of research papers, hand them to a chat model as reference
//! material, and ask questions about them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────┐
//! │   Loader     │──▶│   Session   │──▶│  Chat turn   │
//! │ PDF/DOCX/TXT │   │ docs + chat │   │ budget+stream│
//! └──────────────┘   └──────┬──────┘   └──────┬───────┘
//!                           │                 │
//!                           ▼                 ▼
//!                    ┌────────────┐    ┌────────────┐
//!                    │  Snapshot  │    │ Azure      │
//!                    │  (JSON)    │    │ OpenAI SSE │
//!                    └────────────┘    └────────────┘
//! ```
//!
//! Pure logic (sanitizing, chunking, prompt assembly, session state) lives
//! in the [`paper_analyst_core`] crate.
//!
//! ## Quick Start
//!
//! ```bash
//! analyst load ./papers --save session.json
//! analyst ask "What dataset does the second paper use?" --session session.json
//! analyst chat --folder ./papers
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and per-model environment settings |
//! | [`extract`] | Text extraction for PDF, DOCX and plain text |
//! | [`loader`] | Folder scan: extract, sanitize, chunk |
//! | [`ingest`] | Document cap and session replacement |
//! | [`tokens`] | Token counting and input budget check |
//! | [`client`] | Streaming chat-completion client |
//! | [`stream`] | Fragment accumulation and cancellation |
//! | [`chat`] | One question/answer turn |
//! | [`persist`] | Session snapshot files |
//! | [`commands`] | CLI command implementations |

pub mod chat;
pub mod client;
pub mod commands;
pub mod config;
pub mod extract;
pub mod ingest;
pub mod loader;
pub mod persist;
pub mod stream;
pub mod tokens;
