//! Error types for simulation setup.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Initial condition selector outside the known range
    #[error("Unknown initial condition: {0}")]
    UnknownInitialCondition(u32),

    /// Invalid parameter value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
