//! Error types for adtrace

use thiserror::Error;

/// Errors that can occur while parsing signal logs or talking to a backend.
///
/// Analytics delivery failures are modeled here so backends can report them
/// honestly, but the sink adapter always swallows `Backend` errors: a tracking
/// fault must never interrupt the ad experience.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("Failed to parse signal payload: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unsupported schema version: {0}")]
    UnsupportedSchema(String),

    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Invalid unit layout: {0}")]
    InvalidLayout(String),

    #[error("Analytics backend failure: {0}")]
    Backend(String),
}
