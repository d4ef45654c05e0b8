//! Remote chat-completion client.
//!
//! The chat turn only needs three things from a model backend: ordered
//! delivery of content fragments, eventual termination, and a per-fragment
//! content field that may be empty. [`ChatClient`] captures exactly that;
//! [`AzureOpenAiClient`] implements it over Azure OpenAI's streaming
//! chat-completions endpoint.
//!
//! No retry is attempted. A failed request or an interrupted stream
//! surfaces immediately as [`AnalystError::RemoteCallFailure`].

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, trace, warn};

use paper_analyst_core::models::Message;
use paper_analyst_core::{AnalystError, Result};

use crate::config::ModelSettings;

/// What the client is asked to generate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub max_completion_tokens: u32,
    pub stream: bool,
}

/// One incremental piece of the model's response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub content: Option<String>,
}

impl Fragment {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
        }
    }
}

/// Lazy, finite, non-restartable sequence of fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment>> + Send>>;

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Start a streaming completion. Errors before the first byte of the
    /// response are returned here; later errors arrive inside the stream.
    async fn stream_chat(&self, request: ChatRequest) -> Result<FragmentStream>;
}

/// Azure OpenAI chat-completions client.
pub struct AzureOpenAiClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl AzureOpenAiClient {
    pub fn new(settings: &ModelSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| AnalystError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            url: completions_url(settings),
            api_key: settings.api_key.clone(),
        })
    }
}

/// `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version={v}`
pub fn completions_url(settings: &ModelSettings) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        settings.endpoint.trim_end_matches('/'),
        settings.deployment,
        settings.api_version
    )
}

#[async_trait]
impl ChatClient for AzureOpenAiClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<FragmentStream> {
        debug!(url = %self.url, messages = request.messages.len(), "sending streaming request");

        let response = self
            .http
            .post(&self.url)
            .header("api-key", &self.api_key)
            .header("Accept", "text/event-stream")
            .json(&request)
            .send()
            .await
            .map_err(|e| AnalystError::RemoteCallFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "model call rejected");
            return Err(AnalystError::RemoteCallFailure(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut decoder = SseDecoder::default();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx
                            .send(Err(AnalystError::RemoteCallFailure(e.to_string())))
                            .await;
                        return;
                    }
                };
                if !forward(&tx, decoder.push(&chunk)).await {
                    return;
                }
            }
            forward(&tx, decoder.finish()).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Send decoded lines to the receiver. Returns false once the stream should
/// stop, either at `[DONE]` or because the receiver was dropped.
async fn forward(
    tx: &tokio::sync::mpsc::Sender<Result<Fragment>>,
    lines: Vec<SseLine>,
) -> bool {
    for line in lines {
        match line {
            SseLine::Done => return false,
            SseLine::Fragment(fragment) => {
                if tx.send(Ok(fragment)).await.is_err() {
                    // receiver dropped: the turn stopped listening
                    return false;
                }
            }
            SseLine::Skip => {}
        }
    }
    true
}

/// Reassembles SSE lines from arbitrarily split network chunks.
///
/// Bytes are buffered until a full `\n`-terminated line is available, so a
/// multibyte character split across chunks is decoded intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Append a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseLine> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            lines.push(decode_line(&line[..line_end]));
        }
        lines
    }

    /// Flush a final line the server did not terminate with a newline.
    pub fn finish(&mut self) -> Vec<SseLine> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let line = std::mem::take(&mut self.buffer);
        vec![decode_line(&line)]
    }
}

fn decode_line(raw: &[u8]) -> SseLine {
    match std::str::from_utf8(raw) {
        Ok(line) => parse_sse_line(line.trim_end_matches('\r')),
        Err(e) => {
            warn!(error = %e, "dropping SSE line that is not valid UTF-8");
            SseLine::Skip
        }
    }
}

/// Classification of one server-sent-events line.
#[derive(Debug, PartialEq, Eq)]
pub enum SseLine {
    Fragment(Fragment),
    Done,
    Skip,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Parse a `data: {...}` line. Comments, blank lines, content-free chunks
/// (role headers, content-filter results) and unparseable payloads are
/// skipped.
pub fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<StreamResponse>(data) {
        Ok(resp) => {
            let content = resp
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta)
                .and_then(|delta| delta.content);
            match content {
                Some(text) => SseLine::Fragment(Fragment::text(text)),
                None => SseLine::Skip,
            }
        }
        Err(e) => {
            trace!(data = %data, error = %e, "ignoring unparseable SSE chunk");
            SseLine::Skip
        }
    }
}
