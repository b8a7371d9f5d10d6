//! Conversation engine
//!
//! The orchestrator ties the leaf components together: it turns a user turn
//! into a persisted message, drives the generator, classifies completion,
//! relays events to the client, and persists the assistant turn with its
//! extracted artifacts.

use crate::classify::ClassifierConfig;
use crate::context::ContextConfig;
use crate::generator::GenerateOptions;
use crate::relay::RelayConfig;
use serde::{Deserialize, Serialize};

pub mod orchestrator;

pub use orchestrator::{ConversationOrchestrator, TurnHandle};

/// Aggregated engine policy values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// History-window policy for context assembly
    #[serde(default)]
    pub context: ContextConfig,

    /// Truncation-detection thresholds
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Replay pacing
    #[serde(default)]
    pub relay: RelayConfig,

    /// Sampling options passed to the generator
    #[serde(default)]
    pub sampling: GenerateOptions,

    /// Buffered capacity of each turn's event channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            context: ContextConfig::default(),
            classifier: ClassifierConfig::default(),
            relay: RelayConfig::default(),
            sampling: GenerateOptions::default(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.channel_capacity, 64);
        assert_eq!(config.context.window_messages, 10);
        assert_eq!(config.classifier.tail_window, 100);
    }

    #[test]
    fn test_engine_config_partial_yaml() {
        let yaml = "context:\n  window_messages: 4\n";
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.context.window_messages, 4);
        assert_eq!(config.channel_capacity, 64);
    }
}
