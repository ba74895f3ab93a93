//! Error types for meshlod

use thiserror::Error;

/// Main error type for meshlod operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("Channel error: {0}")]
    Channel(String),
}

/// Result type alias for meshlod operations
pub type Result<T> = std::result::Result<T, Error>;
