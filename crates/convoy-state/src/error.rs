//! Error types for the persistence layer.

use thiserror::Error;

/// Errors that can occur while talking to the state backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend connection error
    #[error("storage connection failed: {0}")]
    Connection(String),

    /// Backend query error
    #[error("storage query failed: {0}")]
    Query(String),

    /// Record serialization error
    #[error("state serialization failed: {0}")]
    Serialization(String),

    /// Requested record does not exist
    #[error("state record not found: {key}")]
    NotFound { key: String },
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
