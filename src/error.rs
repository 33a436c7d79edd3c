//! Error types for the dispatcher.

use crate::channel::ChannelDeliveryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for dispatcher operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PubSubError {
    #[error("Handler must be provided")]
    InvalidHandler,

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Why a single handler invocation failed during a publish.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum DeliveryFailure {
    /// Handler returned an error.
    #[error("handler failed: {0}")]
    Failed(String),

    /// Handler panicked and the panic was caught.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// Channel subscriber could not accept the event.
    #[error("channel delivery failed: {0}")]
    Channel(ChannelDeliveryError),
}

/// A handler failure collected by `publish`, keyed by subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryError {
    pub key: String,
    pub failure: DeliveryFailure,
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.key, self.failure)
    }
}

/// Result type for dispatcher operations.
pub type Result<T> = std::result::Result<T, PubSubError>;
