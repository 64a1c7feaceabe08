//! Storage trait definition for Convoy.
//!
//! The execution core persists one opaque structured record per release and
//! coordinates concurrent runs through a single advisory lock. Both concerns
//! are backend-agnostic; an in-memory fake lives in the `fakes` module and a
//! SurrealDB implementation in `surreal`.

use async_trait::async_trait;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Key/value state storage with an advisory lock.
///
/// Guarantees:
/// - `put` overwrites; `get` returns the last value put for the key, or
///   `None` if the key was never written.
/// - `acquire_lock` uses create-if-absent semantics: of any number of
///   concurrent callers for one key, at most one observes `true`.
/// - `release_lock` removes the holder record and reports whether one
///   existed. Releasing an unheld lock is not an error.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch the state record stored under `key`, if any.
    async fn get(&self, key: &str) -> StorageResult<Option<serde_json::Value>>;

    /// Store `value` under `key`, replacing any previous record.
    async fn put(&self, key: &str, value: serde_json::Value) -> StorageResult<()>;

    /// Try to take the advisory lock for `key`. `false` means another
    /// holder already has it, which is an expected outcome, not an error.
    async fn acquire_lock(&self, key: &str) -> StorageResult<bool>;

    /// Drop the advisory lock for `key`. Returns whether a holder record
    /// was actually removed.
    async fn release_lock(&self, key: &str) -> StorageResult<bool>;
}
