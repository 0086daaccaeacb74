//! Readwell error types.

use thiserror::Error;

/// Errors surfaced by Readwell components outside of date parsing.
#[derive(Debug, Error)]
pub enum ReadwellError {
    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReadwellError>;
