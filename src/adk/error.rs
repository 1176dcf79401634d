// SPDX-License-Identifier: MIT

//! Typed error handling for outreach-rs
//!
//! Collaborator errors (`ModelError`, `ResearchError`) are absorbed by the
//! workflow steps and never reach a caller. `StorageError` and routing
//! faults surface as an [`EngineError`] naming the failing step.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::outreach::workflow::StepKey;

/// Top-level error type for outreach-rs
#[derive(Debug, Error)]
pub enum OutreachError {
    /// Configuration errors (unparsable env vars, invalid config file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A workflow run failed
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Lead store or outbox errors outside a workflow run
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Model construction or generation errors
    #[error(transparent)]
    Model(#[from] ModelError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

impl OutreachError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<&str> for OutreachError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for OutreachError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

/// Classification of everything that can go wrong during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// A collaborator call exceeded its time bound
    CollaboratorTimeout,
    /// A collaborator call returned an error
    CollaboratorError,
    /// Generated text could not be parsed into a draft
    ParseFailure,
    /// The lead store or outbox failed; fatal
    StorageFailure,
    /// A step routed somewhere the transition table does not allow; fatal
    RoutingFault,
    /// The company identifier was empty; the run never starts
    InvalidInput,
}

impl ErrorKind {
    /// Whether this kind aborts the run instead of degrading to a fallback
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::StorageFailure | ErrorKind::RoutingFault | ErrorKind::InvalidInput
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::CollaboratorTimeout => "COLLABORATOR_TIMEOUT",
            ErrorKind::CollaboratorError => "COLLABORATOR_ERROR",
            ErrorKind::ParseFailure => "PARSE_FAILURE",
            ErrorKind::StorageFailure => "STORAGE_FAILURE",
            ErrorKind::RoutingFault => "ROUTING_FAULT",
            ErrorKind::InvalidInput => "INVALID_INPUT",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run-level failure returned by the engine
#[derive(Debug, Clone, Error, Serialize)]
#[error("step {step} failed ({kind}): {message}")]
pub struct EngineError {
    pub step: StepKey,
    pub kind: ErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(step: StepKey, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            step,
            kind,
            message: message.into(),
        }
    }

    pub fn routing(step: StepKey, message: impl Into<String>) -> Self {
        Self::new(step, ErrorKind::RoutingFault, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(StepKey::Research, ErrorKind::InvalidInput, message)
    }
}

/// Lead store and outbox errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// No row with the given id
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The underlying SQLite call failed
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A previous holder of the connection panicked
    #[error("connection lock poisoned")]
    LockPoisoned,

    /// The blocking database task panicked or was cancelled
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StorageError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// Model/LLM-specific errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Non-success response from the provider
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    /// HTTP transport errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// No generation backend is configured
    #[error("generation provider unavailable: {0}")]
    Unavailable(String),
}

impl ModelError {
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Research provider errors
#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("API key not configured for research backend: {0}")]
    ApiKeyMissing(String),

    #[error("research API error: {0}")]
    Api(String),

    #[error("invalid research response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}
