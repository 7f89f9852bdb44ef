// src/errors.rs

//! Crate-wide error type and result alias.

use std::time::Duration;

use thiserror::Error;

use crate::types::QueueKind;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid {kind} payload: {reason}")]
    InvalidPayload { kind: QueueKind, reason: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("{kind} item {id} not found")]
    ItemNotFound { kind: QueueKind, id: u64 },

    #[error("{kind} request failed: {message}")]
    ResourceFailed { kind: QueueKind, message: String },

    #[error("retry budget exceeded after {iterations} iterations, possible loop")]
    RetryBudgetExceeded { iterations: usize },

    #[error("{0}")]
    Operation(String),

    #[error("worker not initialized")]
    NotInitialized,

    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },

    #[error("context closed: {0}")]
    ContextClosed(String),

    #[error("{0}")]
    Remote(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BridgeError>;
