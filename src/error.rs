//! Error types for hipbench

use thiserror::Error;

/// Hipbench error type
#[derive(Debug, Error)]
pub enum HipError {
    /// A population the protocol depends on is not part of the network
    #[error("Missing layer: {0}")]
    MissingLayer(String),

    /// A pathway the protocol depends on is not part of the network
    #[error("Missing projection: {send} -> {recv}")]
    MissingProjection { send: String, recv: String },

    /// Shape mismatch
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Invalid configuration value
    #[error("Config error: {0}")]
    Config(String),

    /// Training asked for a run beyond the configured count
    #[error("All {0} runs finished")]
    RunsFinished(usize),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HipError {
    pub(crate) fn missing_projection(send: &str, recv: &str) -> Self {
        HipError::MissingProjection {
            send: send.to_string(),
            recv: recv.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HipError>;
