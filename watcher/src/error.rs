//! Unified error handling for the watcher.

use crate::config::ConfigError;

/// Watcher error type.
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("Engine error: {0}")]
    Engine(#[from] rill_engine::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Could not decode response: {0}")]
    Decode(String),
}

/// Result type alias for the watcher.
pub type Result<T> = std::result::Result<T, WatcherError>;
