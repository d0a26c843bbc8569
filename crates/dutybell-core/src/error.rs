//! Error type shared across DutyBell crates.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DutyBellError {
    #[error("config error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("obligation not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DutyBellError>;
