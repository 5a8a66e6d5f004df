//! Error types for the motion engine

use thiserror::Error;

/// Errors that can occur at the engine's edges.
///
/// The per-sample and per-tick core is total and never returns these;
/// they come from stream parsing, configuration validation, and the FFI
/// and CLI surfaces.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Failed to parse sample stream: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid sample at index {index}: {reason}")]
    InvalidSample { index: usize, reason: String },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
