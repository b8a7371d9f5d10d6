//! Ollama generator implementation
//!
//! Connects to a local or remote Ollama server and runs one chat completion
//! per call. The exchange is buffer-then-replay: the request asks for a
//! streaming response, but the entire NDJSON body is received before any
//! frame is parsed; the relay downstream paces emission of the already
//! complete chunks. A future incremental reader could parse frames as they
//! arrive without changing this module's output contract.

use crate::config::OllamaConfig;
use crate::error::{GeneratorErrorKind, ParlanceError, Result};
use crate::generator::{ContextMessage, GenerateOptions, Generator, GeneratorOutput};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ollama chat API generator
///
/// # Examples
///
/// ```no_run
/// use parlance::config::OllamaConfig;
/// use parlance::generator::{ContextMessage, GenerateOptions, Generator, OllamaGenerator};
///
/// # async fn example() -> parlance::error::Result<()> {
/// let config = OllamaConfig {
///     host: "http://localhost:11434".to_string(),
///     model: "llama3.2:latest".to_string(),
/// };
/// let generator = OllamaGenerator::new(config)?;
/// let context = vec![ContextMessage::user("Hello!")];
/// let output = generator.generate(&context, &GenerateOptions::default()).await?;
/// # Ok(())
/// # }
/// ```
pub struct OllamaGenerator {
    client: Client,
    config: OllamaConfig,
}

/// Request body for Ollama's /api/chat endpoint
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ContextMessage],
    stream: bool,
    options: ChatOptions,
}

/// Sampling options in Ollama's wire format
#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    num_ctx: usize,
    /// -1 means no output-length cap
    num_predict: i64,
    /// Empty means no stop sequences
    stop: Vec<String>,
}

/// One NDJSON frame of a streamed chat response
#[derive(Debug, Deserialize)]
struct ChatFrame {
    #[serde(default)]
    message: Option<FrameMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FrameMessage {
    #[serde(default)]
    content: String,
}

impl OllamaGenerator {
    /// Create a new Ollama generator
    ///
    /// No request timeout is set on the client beyond connect: generation
    /// length is uncapped by design, and any caller-visible timeout is a
    /// deployment-level transport setting.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client initialization fails
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent("parlance/0.2.0")
            .build()
            .map_err(|e| {
                ParlanceError::GeneratorUnavailable(format!("failed to create HTTP client: {}", e))
            })?;

        tracing::info!(
            "Initialized Ollama generator: host={}, model={}",
            config.host,
            config.model
        );

        Ok(Self { client, config })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(
        &self,
        context: &[ContextMessage],
        options: &GenerateOptions,
    ) -> Result<GeneratorOutput> {
        let url = format!("{}/api/chat", self.config.host);
        let request = ChatRequest {
            model: &self.config.model,
            messages: context,
            stream: true,
            options: ChatOptions {
                temperature: options.temperature,
                top_p: options.top_p,
                top_k: options.top_k,
                num_ctx: options.context_window,
                num_predict: if options.unbounded { -1 } else { 0 },
                stop: Vec::new(),
            },
        };

        tracing::debug!(
            "Sending Ollama request: {} context messages, model={}",
            context.len(),
            self.config.model
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Ollama request failed: {}", e);
                ParlanceError::GeneratorUnavailable(format!("request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Ollama returned error {}: {}", status, body);
            return Err(ParlanceError::Generator {
                kind: kind_for_status(status),
                message: format!("Ollama returned {}: {}", status, body),
            }
            .into());
        }

        // Buffer the complete NDJSON body before parsing a single frame.
        let body = response.text().await.map_err(|e| {
            tracing::error!("Failed to read Ollama response body: {}", e);
            ParlanceError::GeneratorUnavailable(format!("failed to read response body: {}", e))
        })?;

        let output = parse_stream_body(&body)?;
        tracing::debug!(
            "Ollama response: {} chunks, done={}, reason={:?}",
            output.chunks.len(),
            output.done,
            output.done_reason
        );
        Ok(output)
    }
}

/// Map an HTTP status to a user-presentable failure category
fn kind_for_status(status: StatusCode) -> GeneratorErrorKind {
    if status == StatusCode::NOT_FOUND {
        GeneratorErrorKind::ModelNotFound
    } else if status.is_client_error() {
        GeneratorErrorKind::ClientRequest
    } else {
        GeneratorErrorKind::ServerSide
    }
}

/// Parse a buffered NDJSON chat body into ordered chunks plus the done signal
///
/// A frame that cannot be parsed is skipped with a warning; a frame that
/// carries an explicit error signal fails the whole turn.
fn parse_stream_body(body: &str) -> Result<GeneratorOutput> {
    let mut output = GeneratorOutput::default();

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let frame: ChatFrame = match serde_json::from_str(line) {
            Ok(frame) => frame,
            Err(e) => {
                // An unparseable line may still be an explicit error object
                // with a shape we do not model; check before skipping.
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(line) {
                    if let Some(error) = value.get("error").and_then(|v| v.as_str()) {
                        return Err(ParlanceError::MalformedOutput(error.to_string()).into());
                    }
                }
                tracing::warn!("skipping malformed generator frame: {}", e);
                continue;
            }
        };

        if let Some(error) = frame.error {
            return Err(ParlanceError::MalformedOutput(error).into());
        }

        if let Some(message) = frame.message {
            if !message.content.is_empty() {
                output.chunks.push(message.content);
            }
        }

        if frame.done {
            output.done = true;
            output.done_reason = frame.done_reason;
        }
    }

    Ok(output)
}
