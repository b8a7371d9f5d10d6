//! Generator abstraction
//!
//! The engine talks to the upstream language model only through the
//! [`Generator`] trait: a stateless request/response exchange that takes the
//! assembled context and sampling options and returns the buffered output of
//! one generation. Truncation is handled downstream by the completion
//! classifier, so the engine asks for unbounded output with no stop
//! sequences by default.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod ollama;
mod scripted;

pub use ollama::OllamaGenerator;
pub use scripted::ScriptedGenerator;

/// One role/content pair of the generation context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    /// Role tag: "user", "assistant", or "system"
    pub role: String,
    /// Message content
    pub content: String,
}

impl ContextMessage {
    /// Creates a new user context message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Creates a new assistant context message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    /// Creates a new system context message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling and sizing options for one generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling cutoff
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Top-k sampling cutoff
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Context window size in tokens
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// When true, no output-length cap and no stop sequences are applied;
    /// truncation is detected after the fact, never imposed up front
    #[serde(default = "default_unbounded")]
    pub unbounded: bool,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

fn default_top_k() -> u32 {
    40
}

fn default_context_window() -> usize {
    4096
}

fn default_unbounded() -> bool {
    true
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            context_window: default_context_window(),
            unbounded: default_unbounded(),
        }
    }
}

/// Buffered output of one generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratorOutput {
    /// Content deltas in arrival order
    pub chunks: Vec<String>,
    /// Whether the final frame carried an explicit done signal
    pub done: bool,
    /// Stop reason from the final frame, when reported
    pub done_reason: Option<String>,
}

impl GeneratorOutput {
    /// The full generated text
    pub fn text(&self) -> String {
        self.chunks.concat()
    }
}

/// Stateless access to the upstream language model
///
/// # Examples
///
/// ```no_run
/// use parlance::generator::{ContextMessage, GenerateOptions, Generator, ScriptedGenerator};
///
/// # async fn example() -> parlance::error::Result<()> {
/// let generator = ScriptedGenerator::new();
/// generator.push_text("Hello back!");
/// let context = vec![ContextMessage::user("Hello!")];
/// let output = generator.generate(&context, &GenerateOptions::default()).await?;
/// assert_eq!(output.text(), "Hello back!");
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Generator: Send + Sync {
    /// Run one generation over the assembled context
    ///
    /// # Errors
    ///
    /// Returns `GeneratorUnavailable` when the service cannot be reached,
    /// a categorized `Generator` error for non-success responses, and
    /// `MalformedOutput` when a frame carries an explicit error signal.
    async fn generate(
        &self,
        context: &[ContextMessage],
        options: &GenerateOptions,
    ) -> Result<GeneratorOutput>;
}
