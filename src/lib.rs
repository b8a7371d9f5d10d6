//! Parlance - streaming conversation engine library
//!
//! This library implements a multi-turn conversation engine against a
//! generative language model where every message and every extracted code
//! fragment is addressable by a stable, human-readable identifier, and
//! where apparently truncated replies can be resumed and merged back into
//! history in place.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `ids`: identifier grammars, validation, and store-backed allocation
//! - `store`: the key-value store seam plus sled and in-memory backends
//! - `extract`: fenced code-block extraction into artifacts
//! - `classify`: completion/truncation classification
//! - `relay`: the ordered client event stream
//! - `context`: bounded history and attachment context assembly
//! - `generator`: the model service seam plus Ollama and scripted backends
//! - `engine`: the conversation orchestrator tying it all together
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli`: command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use parlance::engine::{ConversationOrchestrator, EngineConfig};
//! use parlance::generator::OllamaGenerator;
//! use parlance::store::SledStore;
//! use parlance::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml")?;
//!     config.validate()?;
//!
//!     let store = Arc::new(SledStore::open(&config.store.path)?);
//!     let generator = Arc::new(OllamaGenerator::new(config.generator.ollama.clone())?);
//!     let orchestrator = ConversationOrchestrator::new(store, generator, config.engine.clone());
//!
//!     let mut turn = orchestrator.start_turn(None, "hello", vec![]).await?;
//!     while let Some(event) = turn.next_event().await {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod extract;
pub mod generator;
pub mod ids;
pub mod relay;
pub mod store;

// Re-export commonly used types
pub use classify::Completion;
pub use config::Config;
pub use engine::{ConversationOrchestrator, TurnHandle};
pub use error::{ParlanceError, Result};
pub use ids::{ArtifactId, MessageId, Role, SessionId};
pub use relay::TurnEvent;

#[cfg(test)]
pub mod test_utils;
