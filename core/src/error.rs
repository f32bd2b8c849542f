//! Error types for the TeamUp client.
//!
//! # Design
//! Every failed call surfaces as one `TeamUpError` carrying a human-readable
//! message. The message is the upstream `error.message` when the API sent
//! one, the transport's own text when it did not, and a fixed generic text
//! for statuses the client does not recognise. Callers that need to branch
//! further inspect the message; the client itself never retries.

use thiserror::Error;

/// Message used when the call completed with an unrecognised status.
pub const UNCATEGORIZED: &str = "Uncategorized Exception";

/// The single error kind returned by `TeamUpClient` operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TeamUpError {
    message: String,
}

impl TeamUpError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn uncategorized() -> Self {
        Self::new(UNCATEGORIZED)
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors raised while loading `TeamUpConfig` from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
}
