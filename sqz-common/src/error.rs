//! Common error types for SQZ

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures shared by configuration loading and asset listing
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file unreadable, malformed or out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// Asset directory or file missing
    #[error("Not found: {0}")]
    NotFound(String),
}
