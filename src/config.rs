//! Configuration: TOML file plus per-model environment settings.
//!
//! The TOML file holds loader and chat defaults; every key is optional and a
//! missing file means "all defaults". Credentials never go in the file.
//! They are read from the environment, keyed by a prefix derived from the
//! model name (the text before its first space):
//!
//! ```text
//! MODEL_NAMES="GPT41 (documents), O4MINI (reasoning)"
//! GPT41_AZURE_OPENAI_KEY=...
//! GPT41_AZURE_OPENAI_ENDPOINT=https://example.openai.azure.com
//! GPT41_AZURE_OPENAI_DEPLOYMENT=gpt-4.1
//! GPT41_AZURE_OPENAI_API_VERSION=2025-01-01-preview
//! GPT41_MAX_INPUT_TOKENS=900000
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use paper_analyst_core::context::DEFAULT_INSTRUCTION;
use paper_analyst_core::AnalystError;

pub const MODEL_NAMES_KEY: &str = "MODEL_NAMES";
const KEY_SUFFIX: &str = "AZURE_OPENAI_KEY";
const ENDPOINT_SUFFIX: &str = "AZURE_OPENAI_ENDPOINT";
const DEPLOYMENT_SUFFIX: &str = "AZURE_OPENAI_DEPLOYMENT";
const API_VERSION_SUFFIX: &str = "AZURE_OPENAI_API_VERSION";
const MAX_INPUT_TOKENS_SUFFIX: &str = "MAX_INPUT_TOKENS";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoaderConfig {
    #[serde(default = "default_max_documents")]
    pub max_documents: usize,
    #[serde(default = "default_max_chars_per_chunk")]
    pub max_chars_per_chunk: usize,
    /// Encoding labels tried in order for text, markdown and CSV files.
    #[serde(default = "default_encodings")]
    pub encodings: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_documents: default_max_documents(),
            max_chars_per_chunk: default_max_chars_per_chunk(),
            encodings: default_encodings(),
        }
    }
}

fn default_max_documents() -> usize {
    10
}
fn default_max_chars_per_chunk() -> usize {
    200_000
}
fn default_encodings() -> Vec<String> {
    vec![
        "utf-8".to_string(),
        "shift_jis".to_string(),
        "euc-jp".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Display names of the selectable models. Empty means "read MODEL_NAMES".
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default = "default_max_completion_tokens")]
    pub max_completion_tokens: u32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_instruction")]
    pub instruction: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            max_completion_tokens: default_max_completion_tokens(),
            system_prompt: default_system_prompt(),
            instruction: default_instruction(),
        }
    }
}

fn default_max_completion_tokens() -> u32 {
    2000
}
fn default_system_prompt() -> String {
    "You are a research assistant. Answer questions using the reference documents \
     provided, cite the document you rely on, and say so when the documents do not \
     contain the answer."
        .to_string()
}
fn default_instruction() -> String {
    DEFAULT_INSTRUCTION.to_string()
}

impl ChatConfig {
    /// Configured model names, falling back to the `MODEL_NAMES` variable.
    pub fn model_names(&self) -> Vec<String> {
        if !self.models.is_empty() {
            return self.models.clone();
        }
        std::env::var(MODEL_NAMES_KEY)
            .map(|raw| parse_model_names(&raw))
            .unwrap_or_default()
    }
}

/// Split a comma-separated model list, dropping blanks.
pub fn parse_model_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Endpoint, credentials and input ceiling for one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSettings {
    pub model_name: String,
    pub api_key: String,
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,
    pub max_input_tokens: u64,
}

/// Environment prefix of a model: `"GPT41 (documents)"` → `"GPT41"`.
pub fn model_prefix(model_name: &str) -> &str {
    model_name.split(' ').next().unwrap_or(model_name)
}

impl ModelSettings {
    /// Read the model's settings from the process environment.
    pub fn from_env(model_name: &str) -> Result<Self, AnalystError> {
        Self::from_lookup(model_name, |key| std::env::var(key).ok())
    }

    /// Resolve settings through `lookup`, failing closed on anything missing.
    pub fn from_lookup<F>(model_name: &str, lookup: F) -> Result<Self, AnalystError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = model_prefix(model_name);
        let mut missing = Vec::new();
        let mut get = |suffix: &str| {
            let key = format!("{}_{}", prefix, suffix);
            match lookup(&key).filter(|v| !v.trim().is_empty()) {
                Some(value) => value,
                None => {
                    missing.push(key);
                    String::new()
                }
            }
        };

        let api_key = get(KEY_SUFFIX);
        let endpoint = get(ENDPOINT_SUFFIX);
        let deployment = get(DEPLOYMENT_SUFFIX);
        let api_version = get(API_VERSION_SUFFIX);
        let max_input_tokens = get(MAX_INPUT_TOKENS_SUFFIX);

        if !missing.is_empty() {
            return Err(AnalystError::Config(format!(
                "settings for model '{}' are incomplete; missing: {}",
                model_name,
                missing.join(", ")
            )));
        }

        let max_input_tokens = match max_input_tokens.trim().parse::<u64>() {
            Ok(ceiling) if ceiling > 0 => ceiling,
            _ => {
                return Err(AnalystError::Config(format!(
                    "{}_{} for model '{}' must be a positive integer",
                    prefix, MAX_INPUT_TOKENS_SUFFIX, model_name
                )))
            }
        };

        Ok(Self {
            model_name: model_name.to_string(),
            api_key,
            endpoint,
            deployment,
            api_version,
            max_input_tokens,
        })
    }
}

/// Load and validate the TOML configuration. A missing file yields defaults.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.loader.max_documents == 0 {
        anyhow::bail!("loader.max_documents must be > 0");
    }

    if config.loader.max_chars_per_chunk == 0 {
        anyhow::bail!("loader.max_chars_per_chunk must be > 0");
    }

    if config.loader.encodings.is_empty() {
        anyhow::bail!("loader.encodings must list at least one encoding");
    }

    for label in &config.loader.encodings {
        if encoding_rs::Encoding::for_label(label.as_bytes()).is_none() {
            anyhow::bail!("Unknown encoding in loader.encodings: '{}'", label);
        }
    }

    if config.chat.max_completion_tokens == 0 {
        anyhow::bail!("chat.max_completion_tokens must be > 0");
    }

    Ok(config)
}
