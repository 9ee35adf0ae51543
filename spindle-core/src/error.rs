//! Core error types

use thiserror::Error;

/// Errors raised while encoding or decoding a [`crate::State`]
#[derive(Debug, Error)]
pub enum StateError {
    /// The state could not be encoded to JSON
    #[error("Failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),

    /// A delivery body was not a valid state
    #[error("Failed to deserialize state: {0}")]
    Deserialize(#[source] serde_json::Error),
}

/// Errors raised by a [`crate::Collector`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CollectorError {
    #[error("Collector is closed")]
    Closed,
}
