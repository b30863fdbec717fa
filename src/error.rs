//! Error handling for the datastream-rs library
//!
//! This module defines the crate error type and a Result alias used
//! throughout the library.

use thiserror::Error;

/// Main error type for datastream-rs operations
#[derive(Error, Debug)]
pub enum DataStreamError {
    /// Rejected configuration: non-positive tick interval or buffer capacity,
    /// mismatched channel capacities, or streaming started with no channels
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for datastream-rs operations
pub type Result<T> = std::result::Result<T, DataStreamError>;
