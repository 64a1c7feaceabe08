//! Error types for plan construction.

use thiserror::Error;

/// Errors raised while assembling a plan tree.
///
/// These are configuration/programming errors: they surface at build time,
/// before any tick occurs, and are never caught by node-level handling.
#[derive(Error, Debug)]
pub enum ChainError {
    /// No qualifying anchor Sequence exists in the chain being extended.
    #[error("no anchor sequence found in chain '{chain}'")]
    AnchorNotFound { chain: String },

    /// `link_all` was called with nothing to link.
    #[error("cannot link an empty list of chains")]
    EmptyChain,
}
