//! Error types for sharpcrate

use thiserror::Error;

/// Main error type for sharpcrate operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type alias for sharpcrate operations
pub type Result<T> = std::result::Result<T, Error>;
