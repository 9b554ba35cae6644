//! Error types for the outreach engine.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors. Always fatal for a batch.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Unknown operator: {0}")]
    UnknownOperator(String),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Message transport (mail provider) errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Request to {provider} failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("{provider} returned status {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Request to {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Failed to build outbound message: {0}")]
    InvalidMessage(String),

    #[error("Thread {0} not found")]
    ThreadNotFound(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reply pipeline errors. Each one is scoped to a single thread unless the
/// caller says otherwise.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Thread discovery failed: {0}")]
    Discovery(String),

    #[error("Thread {thread_id} is not processable: {reason}")]
    InvalidThread { thread_id: String, reason: String },

    #[error("Reply generation failed: {0}")]
    Generation(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Message {message_id} was sent in thread {thread_id} but not tracked: {reason}")]
    Untracked {
        thread_id: String,
        message_id: String,
        reason: String,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Batch entry point errors, reported in the response envelope.
#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No recipient given and OUTREACH_SIMULATION_RECIPIENT is not set")]
    MissingRecipient,

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl AutomationError {
    /// Whether the caller's request was at fault.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::MissingRecipient | Self::Pipeline(PipelineError::InvalidRecipient(_))
        )
    }
}
