//! Error types for Parlance
//!
//! This module defines all error types used throughout the engine,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Category of an upstream generator failure
///
/// Generator errors are always reported to clients in a user-presentable
/// category rather than as raw upstream bodies.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeneratorErrorKind {
    /// Could not reach the model service at all
    #[error("connectivity")]
    Connectivity,
    /// The requested model does not exist on the service
    #[error("model-not-found")]
    ModelNotFound,
    /// The service rejected our request (4xx)
    #[error("client-request")]
    ClientRequest,
    /// The service failed internally (5xx)
    #[error("server-side")]
    ServerSide,
}

impl GeneratorErrorKind {
    /// A short end-user-phrased description for client streams
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Connectivity => "Could not reach the model service. Check that it is running.",
            Self::ModelNotFound => "The configured model is not available on the model service.",
            Self::ClientRequest => "The model service rejected the request.",
            Self::ServerSide => "The model service encountered an internal error.",
        }
    }
}

/// Main error type for Parlance operations
///
/// This enum encompasses all possible errors that can occur while
/// allocating identifiers, talking to the store, driving the generator,
/// and persisting conversation state.
#[derive(Error, Debug)]
pub enum ParlanceError {
    /// A session, message, or artifact id that does not match its grammar.
    /// Rejected at the boundary; never reaches the store.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A session or message that does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transient store failure. Surfaced to the caller without retry;
    /// retry policy belongs to the caller.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The generator could not be reached before any content was produced
    #[error("Generator unavailable: {0}")]
    GeneratorUnavailable(String),

    /// A non-success response from the generator, categorized for clients
    #[error("Generator error ({kind}): {message}")]
    Generator {
        /// User-presentable failure category
        kind: GeneratorErrorKind,
        /// Detail for logs, not for client streams
        message: String,
    },

    /// A generator frame that carried an explicit error signal
    #[error("Malformed generator output: {0}")]
    MalformedOutput(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for Parlance operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
