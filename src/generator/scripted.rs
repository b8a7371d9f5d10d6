//! In-process scripted generator for unit and integration tests
//!
//! Replaces the real model service with a queue of pre-programmed replies so
//! tests can drive the orchestrator without network access. Each call to
//! [`Generator::generate`] pops the next reply; the contexts the engine sent
//! are recorded for assertion.
//!
//! # Example
//!
//! ```
//! use parlance::generator::{ContextMessage, GenerateOptions, Generator, ScriptedGenerator};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let generator = ScriptedGenerator::new();
//! generator.push_text("Hello back!");
//!
//! let output = generator
//!     .generate(&[ContextMessage::user("Hello!")], &GenerateOptions::default())
//!     .await
//!     .unwrap();
//! assert_eq!(output.text(), "Hello back!");
//! assert_eq!(generator.contexts().len(), 1);
//! # }
//! ```

use crate::error::{ParlanceError, Result};
use crate::generator::{ContextMessage, GenerateOptions, Generator, GeneratorOutput};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

enum Reply {
    Output(GeneratorOutput),
    Failure(ParlanceError),
}

/// Queue-driven generator fake
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Reply>>,
    contexts: Mutex<Vec<Vec<ContextMessage>>>,
}

impl ScriptedGenerator {
    /// Create a generator with an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a full output with explicit done signal and reason
    pub fn push_output(&self, chunks: Vec<String>, done: bool, done_reason: Option<String>) {
        self.push(Reply::Output(GeneratorOutput {
            chunks,
            done,
            done_reason,
        }));
    }

    /// Queue a clean completion of the given text, split into word chunks
    pub fn push_text(&self, text: &str) {
        self.push_output(split_chunks(text), true, Some("stop".to_string()));
    }

    /// Queue a completion that ends without any done signal
    pub fn push_truncated_text(&self, text: &str) {
        self.push_output(split_chunks(text), false, None);
    }

    /// Queue a failure for the next call
    pub fn push_failure(&self, error: ParlanceError) {
        self.push(Reply::Failure(error));
    }

    /// Every context the engine has sent, in call order
    pub fn contexts(&self) -> Vec<Vec<ContextMessage>> {
        self.contexts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn push(&self, reply: Reply) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
    }
}

/// Split text into small deltas so relays see more than one chunk
fn split_chunks(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split_inclusive(' ').map(|s| s.to_string()).collect()
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        context: &[ContextMessage],
        _options: &GenerateOptions,
    ) -> Result<GeneratorOutput> {
        self.contexts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(context.to_vec());

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match reply {
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::Failure(error)) => Err(error.into()),
            None => {
                Err(ParlanceError::GeneratorUnavailable("script exhausted".to_string()).into())
            }
        }
    }
}
