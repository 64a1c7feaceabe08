//! Error types for the pipeline layer.

use thiserror::Error;

use convoy_engine::ChainError;
use convoy_state::StorageError;

/// Hard errors from pipeline construction and driving.
///
/// Remote call failures never appear here; they are converted to node
/// failures inside the tree. Only construction problems and the driving
/// loop's own storage I/O propagate to the caller.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Plan construction failed (configuration/programming error)
    #[error("plan construction failed: {0}")]
    Plan(#[from] ChainError),

    /// State backend error
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Persisted state could not be decoded
    #[error("state decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}
