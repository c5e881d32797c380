//! Error types for densekv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using DenseError
pub type Result<T> = std::result::Result<T, DenseError>;

/// Unified error type for densekv operations
#[derive(Debug, Error)]
pub enum DenseError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Usage Errors
    // -------------------------------------------------------------------------
    #[error("Negative key {0}: maps only address keys >= 0")]
    NegativeKey(i64),

    #[error("Index {index} out of range for a node of {width} values")]
    IndexOutOfRange { index: usize, width: usize },

    #[error("Value {0} falls in the reserved marker range")]
    ReservedValue(i64),

    #[error("Map '{name}' already defined: {reason}")]
    MapRedefined { name: String, reason: String },

    #[error("Invalid map name '{0}'")]
    InvalidMapName(String),

    #[error("Map '{0}' not found")]
    MapNotFound(String),

    #[error("Map '{name}' is a {found} map, expected {expected}")]
    WrongMapKind {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    // -------------------------------------------------------------------------
    // Unsupported Operations
    // -------------------------------------------------------------------------
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Corrupted storage: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for DenseError {
    fn from(err: bincode::Error) -> Self {
        DenseError::Serialization(err.to_string())
    }
}
