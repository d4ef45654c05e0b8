//! # Paper Analyst CLI (`analyst`)
//!
//! ## Usage
//!
//! ```bash
//! analyst --config ./config/analyst.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `analyst load <folder>` | Load a folder and list the resulting documents |
//! | `analyst ask "<question>"` | Ask one question about a folder or saved session |
//! | `analyst chat` | Interactive conversation |
//! | `analyst count` | Token size of a folder's context against the model limit |
//! | `analyst models` | List configured models and check their settings |
//! | `analyst completions <shell>` | Print a shell completion script |
//!
//! ## Examples
//!
//! ```bash
//! # Load and save a snapshot
//! analyst load ./papers --save papers.json
//!
//! # Ask about two specific files, showing the exact prompt sent
//! analyst ask "Compare the methods" --folder ./papers \
//!     --select a.pdf --select b.pdf --show-prompt
//!
//! # Continue a saved conversation
//! analyst chat --session papers.json --save
//! ```
//!
//! Press Ctrl-C while an answer is streaming to stop it; the partial answer
//! is kept.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use paper_analyst::commands::{self, Source, TurnOptions};
use paper_analyst::config;

/// Paper Analyst: ask a chat model questions about a folder of papers.
///
/// Model credentials are read from the environment; see
/// `config/analyst.example.toml` for the file settings.
#[derive(Parser)]
#[command(
    name = "analyst",
    about = "Ask a chat model questions about a folder of research papers",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/analyst.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where to take documents from, for commands that talk to the model.
#[derive(clap::Args)]
struct SourceArgs {
    /// Folder of PDF, DOCX, TXT, MD or CSV files to load.
    #[arg(long, conflicts_with = "session")]
    folder: Option<PathBuf>,

    /// Saved session snapshot to continue from.
    #[arg(long)]
    session: Option<PathBuf>,

    /// Model to use (defaults to the first configured).
    #[arg(long)]
    model: Option<String>,

    /// Only send the named documents. Repeatable.
    #[arg(long = "select")]
    select: Vec<String>,

    /// Print the assembled messages before sending them.
    #[arg(long)]
    show_prompt: bool,

    /// Save a snapshot afterwards (default name `session_<timestamp>.json`).
    #[arg(long, num_args = 0..=1)]
    save: Option<Option<PathBuf>>,
}

impl SourceArgs {
    fn into_options(self) -> anyhow::Result<TurnOptions> {
        Ok(TurnOptions {
            source: Source::from_args(self.folder, self.session)?,
            model: self.model,
            select: self.select,
            show_prompt: self.show_prompt,
            save: self.save,
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Load a folder and list the documents it produces.
    ///
    /// Prints each document (split parts included) and every warning
    /// raised while reading the folder.
    Load {
        /// Folder to scan (top level only).
        folder: PathBuf,

        /// Save a snapshot of the loaded session.
        #[arg(long, num_args = 0..=1)]
        save: Option<Option<PathBuf>>,
    },

    /// Ask a single question and stream the answer.
    Ask {
        /// The question.
        question: String,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Start an interactive conversation.
    ///
    /// Slash commands: /docs, /select a,b, /usage, /save [file], /reset, /quit.
    Chat {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Count the tokens a folder's context would take.
    Count {
        /// Folder to load.
        #[arg(long)]
        folder: PathBuf,

        /// Model whose input limit to compare against.
        #[arg(long)]
        model: Option<String>,
    },

    /// List configured models and whether their settings are complete.
    Models,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Commands that don't require config
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Load { folder, save } => {
            commands::run_load(&cfg, &folder, save)?;
        }
        Commands::Ask { question, source } => {
            commands::run_ask(&cfg, &question, source.into_options()?).await?;
        }
        Commands::Chat { source } => {
            commands::run_chat(&cfg, source.into_options()?).await?;
        }
        Commands::Count { folder, model } => {
            commands::run_count(&cfg, &folder, model.as_deref())?;
        }
        Commands::Models => {
            commands::run_models(&cfg)?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
