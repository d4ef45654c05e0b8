//! CLI command implementations.
//!
//! Each `run_*` function backs one `analyst` subcommand. They print to
//! stdout (documents, model output, usage lines) and leave diagnostics to
//! `tracing`, which the binary routes to stderr.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use paper_analyst_core::context::Selection;
use paper_analyst_core::models::Message;
use paper_analyst_core::session::SessionContext;
use paper_analyst_core::AnalystError;

use crate::chat::{preview_messages, run_turn, TurnContext, TurnObserver, TurnReport};
use crate::client::AzureOpenAiClient;
use crate::config::{Config, ModelSettings};
use crate::ingest::load_into_session;
use crate::persist::{default_snapshot_path, load_session, save_session};
use crate::stream::CancelFlag;
use crate::tokens::{count_messages, Cl100kCounter};

/// Question used when measuring the size of a context without asking.
const SAMPLE_QUESTION: &str = "What is this document about?";

/// Where a session's documents come from.
#[derive(Debug, Clone)]
pub enum Source {
    Folder(PathBuf),
    Snapshot(PathBuf),
}

impl Source {
    pub fn from_args(folder: Option<PathBuf>, session: Option<PathBuf>) -> Result<Self> {
        match (folder, session) {
            (Some(folder), None) => Ok(Source::Folder(folder)),
            (None, Some(session)) => Ok(Source::Snapshot(session)),
            (Some(_), Some(_)) => bail!("--folder and --session cannot be used together"),
            (None, None) => bail!("either --folder or --session is required"),
        }
    }
}

/// Pick the model to talk to: the requested one, or the first configured.
pub fn resolve_model(config: &Config, requested: Option<&str>) -> Result<String> {
    let names = config.chat.model_names();
    match requested {
        Some(name) if names.is_empty() || names.iter().any(|n| n == name) => Ok(name.to_string()),
        Some(name) => bail!(
            "Unknown model '{}'. Configured models: {}",
            name,
            names.join(", ")
        ),
        None => names.into_iter().next().with_context(|| {
            "No models configured. Set [chat].models in the config file or MODEL_NAMES"
        }),
    }
}

/// Build a ready session from a folder or a saved snapshot.
pub fn open_session(config: &Config, source: &Source, model: &str) -> Result<SessionContext> {
    let mut session = SessionContext::new();
    match source {
        Source::Folder(folder) => {
            session.select_model(model);
            load_into_session(&mut session, folder, &config.loader)?;
        }
        Source::Snapshot(path) => {
            load_session(&mut session, path)?;
            session.select_model(model);
        }
    }
    if !session.system_role_defined {
        session.define_system_role(config.chat.system_prompt.clone())?;
    }
    Ok(session)
}

/// `analyst load`
pub fn run_load(config: &Config, folder: &Path, save: Option<Option<PathBuf>>) -> Result<()> {
    let mut session = SessionContext::new();
    load_into_session(&mut session, folder, &config.loader)?;
    print_documents(&session);
    print_warnings(&session);
    if let Some(path) = save {
        if let Ok(model) = resolve_model(config, None) {
            session.select_model(model);
        }
        save_to(&session, path)?;
    }
    Ok(())
}

/// Options shared by `ask` and `chat`.
pub struct TurnOptions {
    pub source: Source,
    pub model: Option<String>,
    pub select: Vec<String>,
    pub show_prompt: bool,
    pub save: Option<Option<PathBuf>>,
}

/// `analyst ask`
pub async fn run_ask(config: &Config, question: &str, opts: TurnOptions) -> Result<()> {
    let model = resolve_model(config, opts.model.as_deref())?;
    let mut session = open_session(config, &opts.source, &model)?;
    print_warnings(&session);
    if !opts.select.is_empty() {
        session.set_selection(checked_selection(&session, &opts.select));
    }

    let settings = ModelSettings::from_env(&model)?;
    let client = AzureOpenAiClient::new(&settings)?;
    let cancel = CancelFlag::new();

    let report = ask_once(
        &mut session,
        question,
        config,
        &settings,
        &client,
        &cancel,
        opts.show_prompt,
    )
    .await?;
    print_turn_footer(&session, &report);

    if let Some(path) = opts.save {
        save_to(&session, path)?;
    }
    Ok(())
}

/// `analyst chat`
pub async fn run_chat(config: &Config, opts: TurnOptions) -> Result<()> {
    let model = resolve_model(config, opts.model.as_deref())?;
    let mut session = open_session(config, &opts.source, &model)?;
    if !opts.select.is_empty() {
        session.set_selection(checked_selection(&session, &opts.select));
    }
    let settings = ModelSettings::from_env(&model)?;
    let client = AzureOpenAiClient::new(&settings)?;
    let cancel = CancelFlag::new();

    println!("Model: {}", model);
    print_documents(&session);
    print_warnings(&session);
    println!("Type a question, or /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        // Ctrl-C at the idle prompt quits.
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match ReplCommand::parse(line) {
            Some(ReplCommand::Quit) => break,
            Some(ReplCommand::Help) => print_help(),
            Some(ReplCommand::Docs) => print_documents(&session),
            Some(ReplCommand::Usage) => print_usage(&session),
            Some(ReplCommand::Select(names)) => {
                let selection = if names.is_empty() {
                    Selection::All
                } else {
                    checked_selection(&session, &names)
                };
                session.set_selection(selection);
                print_documents(&session);
            }
            Some(ReplCommand::Reset) => {
                session = open_session(config, &opts.source, &model)?;
                println!("Conversation reset.");
            }
            Some(ReplCommand::Save(path)) => {
                if let Err(e) = save_to(&session, path) {
                    eprintln!("Error: {:#}", e);
                }
            }
            Some(ReplCommand::Unknown(cmd)) => {
                println!("Unknown command: {} (try /help)", cmd);
            }
            None => {
                match ask_once(
                    &mut session,
                    line,
                    config,
                    &settings,
                    &client,
                    &cancel,
                    opts.show_prompt,
                )
                .await
                {
                    Ok(report) => print_turn_footer(&session, &report),
                    Err(e) => eprintln!("Error: {:#}", e),
                }
            }
        }
    }

    if let Some(path) = opts.save {
        save_to(&session, path)?;
    }
    Ok(())
}

/// `analyst count`
pub fn run_count(config: &Config, folder: &Path, model: Option<&str>) -> Result<()> {
    let mut session = SessionContext::new();
    load_into_session(&mut session, folder, &config.loader)?;
    session.define_system_role(config.chat.system_prompt.clone())?;
    print_warnings(&session);

    let messages = preview_messages(&session, SAMPLE_QUESTION, &config.chat.instruction)?;
    let count = count_messages(&Cl100kCounter, &messages)?;
    let marker = if count.approximate { "~" } else { "" };

    println!("Documents: {}", session.loaded_documents.len());
    match resolve_model(config, model).and_then(|name| {
        ModelSettings::from_env(&name)
            .map(|s| (name, s.max_input_tokens))
            .map_err(anyhow::Error::from)
    }) {
        Ok((name, ceiling)) => {
            let verdict = if count.tokens > ceiling { "over" } else { "within" };
            println!(
                "Input tokens: {}{} / {} ({} the limit of {})",
                marker, count.tokens, ceiling, verdict, name
            );
        }
        Err(e) => {
            debug!(error = %e, "no model ceiling available");
            println!("Input tokens: {}{}", marker, count.tokens);
        }
    }
    Ok(())
}

/// `analyst models`
pub fn run_models(config: &Config) -> Result<()> {
    let names = config.chat.model_names();
    if names.is_empty() {
        println!("No models configured. Set [chat].models or MODEL_NAMES.");
        return Ok(());
    }
    for name in names {
        match ModelSettings::from_env(&name) {
            Ok(settings) => println!(
                "{:<30} ok (deployment {}, max input tokens {})",
                name, settings.deployment, settings.max_input_tokens
            ),
            Err(e) => println!("{:<30} {}", name, e),
        }
    }
    Ok(())
}

async fn ask_once(
    session: &mut SessionContext,
    question: &str,
    config: &Config,
    settings: &ModelSettings,
    client: &AzureOpenAiClient,
    cancel: &CancelFlag,
    show_prompt: bool,
) -> Result<TurnReport> {
    cancel.reset();
    let ctx = TurnContext {
        client,
        counter: &Cl100kCounter,
        model: &settings.model_name,
        max_input_tokens: settings.max_input_tokens,
        max_completion_tokens: config.chat.max_completion_tokens,
        instruction: &config.chat.instruction,
    };
    let mut observer = ConsoleObserver::new(show_prompt);
    let watcher = spawn_interrupt_watcher(cancel);
    let result = run_turn(session, question, &ctx, cancel, &mut observer).await;
    watcher.abort();
    println!();
    Ok(result?)
}

/// Raise `cancel` on the first Ctrl-C.
fn spawn_interrupt_watcher(cancel: &CancelFlag) -> JoinHandle<()> {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    })
}

/// Streams partial text to stdout as it grows.
struct ConsoleObserver {
    show_prompt: bool,
    printed: usize,
}

impl ConsoleObserver {
    fn new(show_prompt: bool) -> Self {
        Self {
            show_prompt,
            printed: 0,
        }
    }
}

impl TurnObserver for ConsoleObserver {
    fn on_prompt(&mut self, messages: &[Message]) {
        if !self.show_prompt {
            return;
        }
        match serde_json::to_string_pretty(messages) {
            Ok(json) => println!("--- prompt ---\n{}\n--- end prompt ---", json),
            Err(e) => warn!(error = %e, "could not render prompt"),
        }
    }

    fn on_partial(&mut self, text: &str) {
        if let Some(delta) = text.get(self.printed..) {
            print!("{}", delta);
            let _ = std::io::stdout().flush();
        }
        self.printed = text.len();
    }
}

fn print_turn_footer(session: &SessionContext, report: &TurnReport) {
    match &report.interruption {
        Some(AnalystError::GenerationCancelled) => {
            eprintln!("(generation cancelled; partial response kept)")
        }
        Some(e) => eprintln!("Error: {}", e),
        None => {}
    }
    print_usage(session);
}

fn print_usage(session: &SessionContext) {
    match &session.last_usage {
        Some(turn) => println!("{}", turn.summary(&session.total_usage)),
        None => println!("session total: {}", session.total_usage.total_tokens),
    }
}

fn print_documents(session: &SessionContext) {
    if session.loaded_documents.is_empty() {
        println!("No documents loaded.");
        return;
    }
    println!("Documents:");
    for (i, doc) in session.loaded_documents.iter().enumerate() {
        let mark = if session.selection.contains(&doc.filename) {
            "*"
        } else {
            " "
        };
        println!(
            " {} {:>2}. {} ({} chars)",
            mark,
            i + 1,
            doc.filename,
            doc.content.chars().count()
        );
    }
}

fn print_warnings(session: &SessionContext) {
    for warning in &session.load_warnings {
        eprintln!("{}", warning);
    }
}

fn print_help() {
    println!("/docs             list loaded documents (* = selected)");
    println!("/select a, b      send only the named documents (no names = all)");
    println!("/usage            show token usage");
    println!("/save [file]      write a session snapshot");
    println!("/reset            start over from the original source");
    println!("/quit             leave");
}

/// Build a selection from names, warning about ones that are not loaded.
fn checked_selection(session: &SessionContext, names: &[String]) -> Selection {
    for name in names {
        if !session.loaded_documents.iter().any(|d| &d.filename == name) {
            eprintln!("warning: no loaded document named '{}'", name);
        }
    }
    Selection::only(names.iter().cloned())
}

fn save_to(session: &SessionContext, path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(default_snapshot_path);
    save_session(session, &path)?;
    println!("Session saved to {}", path.display());
    Ok(())
}

/// Slash commands understood by the chat loop.
#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    Quit,
    Help,
    Docs,
    Usage,
    Reset,
    Select(Vec<String>),
    Save(Option<PathBuf>),
    Unknown(String),
}

impl ReplCommand {
    /// `None` means the line is a question.
    fn parse(line: &str) -> Option<Self> {
        let rest = line.strip_prefix('/')?;
        let (cmd, arg) = match rest.split_once(char::is_whitespace) {
            Some((cmd, arg)) => (cmd, arg.trim()),
            None => (rest, ""),
        };
        Some(match cmd {
            "quit" | "exit" => ReplCommand::Quit,
            "help" => ReplCommand::Help,
            "docs" => ReplCommand::Docs,
            "usage" => ReplCommand::Usage,
            "reset" => ReplCommand::Reset,
            "select" => ReplCommand::Select(
                arg.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            "save" if arg.is_empty() => ReplCommand::Save(None),
            "save" => ReplCommand::Save(Some(PathBuf::from(arg))),
            other => ReplCommand::Unknown(format!("/{}", other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChatConfig;
    use std::fs;
    use tempfile::TempDir;

    fn config_with_models(models: &[&str]) -> Config {
        Config {
            chat: ChatConfig {
                models: models.iter().map(|m| m.to_string()).collect(),
                ..ChatConfig::default()
            },
            ..Config::default()
        }
    }

    #[test]
    fn questions_are_not_commands() {
        assert_eq!(ReplCommand::parse("what is this?"), None);
    }

    #[test]
    fn select_splits_on_commas() {
        assert_eq!(
            ReplCommand::parse("/select a.pdf, b.txt ,"),
            Some(ReplCommand::Select(vec!["a.pdf".into(), "b.txt".into()]))
        );
        assert_eq!(
            ReplCommand::parse("/select"),
            Some(ReplCommand::Select(vec![]))
        );
    }

    #[test]
    fn save_takes_optional_path() {
        assert_eq!(ReplCommand::parse("/save"), Some(ReplCommand::Save(None)));
        assert_eq!(
            ReplCommand::parse("/save out.json"),
            Some(ReplCommand::Save(Some(PathBuf::from("out.json"))))
        );
        assert_eq!(
            ReplCommand::parse("/frobnicate"),
            Some(ReplCommand::Unknown("/frobnicate".into()))
        );
    }

    #[test]
    fn model_defaults_to_first_configured() {
        let config = config_with_models(&["GPT41 (documents)", "O4MINI (reasoning)"]);
        assert_eq!(resolve_model(&config, None).unwrap(), "GPT41 (documents)");
        assert_eq!(
            resolve_model(&config, Some("O4MINI (reasoning)")).unwrap(),
            "O4MINI (reasoning)"
        );
        assert!(resolve_model(&config, Some("other")).is_err());
    }

    #[test]
    fn source_requires_exactly_one_origin() {
        assert!(Source::from_args(None, None).is_err());
        assert!(Source::from_args(Some("a".into()), Some("b".into())).is_err());
        assert!(matches!(
            Source::from_args(Some("a".into()), None),
            Ok(Source::Folder(_))
        ));
    }

    #[test]
    fn open_session_defines_persona_once() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "alpha").unwrap();
        let config = config_with_models(&["M"]);

        let session = open_session(&config, &Source::Folder(tmp.path().into()), "M").unwrap();
        assert!(session.system_role_defined);
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.selected_model.as_deref(), Some("M"));

        let snapshot = tmp.path().join("s.json");
        save_session(&session, &snapshot).unwrap();
        let restored = open_session(&config, &Source::Snapshot(snapshot), "M").unwrap();
        assert_eq!(restored.messages.len(), 1);
    }
}
