//! Hosted language-model client.
//!
//! `LlmBackend` abstracts over OpenAI-compatible `/chat/completions` APIs
//! (OpenAI for chat, Perplexity for stream summaries). Streaming responses
//! are server-sent events, decoded line by line into a stream of text deltas.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{future, Stream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;

use crate::config::LlmConfig;

/// Text deltas in arrival order.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

// ============================================================================
// LlmBackend trait
// ============================================================================

#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Single completion, returned whole.
    async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError>;

    /// Streaming completion. Errors before the first byte are returned
    /// directly; later failures arrive as stream items.
    async fn stream(&self, request: &GenerateRequest) -> Result<TokenStream, LlmError>;

    /// Model name for logging.
    fn model(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatTurn>,
    pub max_tokens: Option<u32>,
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Missing API key")]
    MissingApiKey,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Stream interrupted: {0}")]
    Stream(String),
}

// ============================================================================
// Wire structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<&'a ChatTurn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ============================================================================
// ChatCompletionsClient
// ============================================================================

/// Client for an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    async fn send(
        &self,
        request: &GenerateRequest,
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let system = request
            .system
            .as_ref()
            .map(|s| ChatTurn::new("system", s.clone()));
        let body = CompletionRequest {
            model: &self.model,
            messages: system.iter().chain(request.messages.iter()).collect(),
            max_tokens: request.max_tokens,
            stream,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(error_body);

            tracing::error!(code = status.as_u16(), message = %message, model = %self.model, "LLM API error");
            return Err(LlmError::Api {
                code: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl LlmBackend for ChatCompletionsClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        let response = self.send(request, false).await?;
        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| LlmError::InvalidResponse("empty choices".to_string()))
    }

    async fn stream(&self, request: &GenerateRequest) -> Result<TokenStream, LlmError> {
        let response = self.send(request, true).await?;

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        let lines = FramedRead::new(StreamReader::new(bytes), LinesCodec::new());

        let tokens = lines
            .map_err(|e| LlmError::Stream(e.to_string()))
            .try_take_while(|line| future::ready(Ok(!is_done_marker(line))))
            .try_filter_map(|line| future::ready(Ok(parse_sse_line(&line))));

        Ok(Box::pin(tokens))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn is_done_marker(line: &str) -> bool {
    sse_data(line) == Some("[DONE]")
}

/// Extract the text delta from one SSE line. Comments, blank lines, other
/// fields and unparseable chunks yield `None`.
fn parse_sse_line(line: &str) -> Option<String> {
    let data = sse_data(line)?;
    let chunk: CompletionChunk = match serde_json::from_str(data) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping unparseable completion chunk");
            return None;
        }
    };
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|c| !c.is_empty())
}

// ============================================================================
// TESTS
// ============================================================================
