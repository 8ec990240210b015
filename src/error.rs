//! Error types for synheart-mock

use thiserror::Error;

/// Errors surfaced by the mock pipeline and its servers
#[derive(Debug, Error)]
pub enum MockError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Failed to parse scenario file {path}: {source}")]
    ScenarioParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid rate: {0}")]
    InvalidRate(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Recording error: {0}")]
    Recording(String),

    #[error("Replay error: {0}")]
    Replay(String),

    #[error("Output channel closed")]
    ChannelClosed,
}
