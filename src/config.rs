//! Configuration management for Parlance
//!
//! This module handles loading, parsing, and validating configuration
//! from YAML files, with per-field defaults so a partial file (or none at
//! all) still yields a working setup.

use crate::engine::EngineConfig;
use crate::error::{ParlanceError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for Parlance
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Generator (model service) configuration
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Engine policy values: context window, classifier thresholds,
    /// relay pacing, sampling
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Generator configuration
///
/// Specifies which generator backend to use and its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Type of generator backend
    #[serde(rename = "type", default = "default_generator_type")]
    pub generator_type: String,

    /// Ollama configuration
    #[serde(default)]
    pub ollama: OllamaConfig,
}

fn default_generator_type() -> String {
    "ollama".to_string()
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            generator_type: default_generator_type(),
            ollama: OllamaConfig::default(),
        }
    }
}

/// Ollama backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama server host
    #[serde(default = "default_ollama_host")]
    pub host: String,

    /// Model to use for generations
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2:latest".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_ollama_model(),
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory of the embedded database
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "data/parlance.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// A missing file is not an error: defaults apply, which keeps first
    /// runs working without any setup.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| ParlanceError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Config = serde_yaml::from_str(&contents)
            .map_err(|e| ParlanceError::Config(format!("failed to parse {}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ParlanceError::Config` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        match self.generator.generator_type.as_str() {
            "ollama" => {}
            other => {
                return Err(ParlanceError::Config(format!(
                    "unknown generator type: {}",
                    other
                ))
                .into());
            }
        }
        if self.generator.ollama.host.is_empty() {
            return Err(ParlanceError::Config("ollama host must not be empty".into()).into());
        }
        if self.generator.ollama.model.is_empty() {
            return Err(ParlanceError::Config("ollama model must not be empty".into()).into());
        }
        if self.store.path.is_empty() {
            return Err(ParlanceError::Config("store path must not be empty".into()).into());
        }
        if self.engine.context.window_messages == 0 {
            return Err(
                ParlanceError::Config("context window_messages must be at least 1".into()).into(),
            );
        }
        if self.engine.channel_capacity == 0 {
            return Err(
                ParlanceError::Config("engine channel_capacity must be at least 1".into()).into(),
            );
        }
        let temperature = self.engine.sampling.temperature;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ParlanceError::Config(format!(
                "sampling temperature {} outside 0.0..=2.0",
                temperature
            ))
            .into());
        }
        Ok(())
    }
}
