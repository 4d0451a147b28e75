//! Errors raised while spawning, watching, or stopping the broker process.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn broker process at {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("broker exited before printing a LISTENING PORT= line")]
    NoListeningLine,
    #[error("broker is already running on port {0}")]
    AlreadyRunning(u16),
    #[error("broker is not running")]
    NotRunning,
    #[error("broker did not exit within the shutdown timeout")]
    ShutdownTimeout,
    #[error("HTTP request to the broker failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error while supervising the broker: {0}")]
    Io(#[from] std::io::Error),
}
