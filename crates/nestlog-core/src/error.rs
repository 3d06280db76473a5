//! Error types for nestlog-core

use thiserror::Error;

use crate::validation::ValidationErrors;

/// Result type alias using nestlog-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in nestlog-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Event not found
    #[error("Event not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Payload rejected by the schema validator
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
