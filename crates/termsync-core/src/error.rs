//! Error types for termsync.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TermsyncError {
    #[error("process spawn failed: {0}")]
    SpawnFailed(String),

    #[error("PTY error: {0}")]
    Pty(String),

    #[error("PTY read failed: {0}")]
    ReadFailed(String),

    #[error("PTY write failed: {0}")]
    WriteFailed(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
