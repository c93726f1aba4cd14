//! Error types for duplex_runtime

use duplex_core::CoreError;
use thiserror::Error;

/// Errors that can occur while driving the runtime
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The render thread is already running
    #[error("render loop already running")]
    AlreadyRunning,

    /// The render thread is not running
    #[error("render loop not running")]
    NotRunning,

    /// Failed to spawn the render thread
    #[error("failed to spawn render thread: {0}")]
    ThreadSpawn(String),

    /// Invalid or unreadable configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Engine error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for RuntimeError {
    fn from(err: anyhow::Error) -> Self {
        RuntimeError::Other(format!("{:#}", err))
    }
}

/// Result type for duplex_runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;
