//! Persistence boundary for Convoy.
//!
//! The execution core treats storage as two narrow concerns: an opaque
//! per-release state record, and an advisory lock that keeps concurrent
//! runs for the same release from racing. [`StateStore`] captures both;
//! [`SurrealStateStore`] is the production backend and
//! [`fakes::MemoryStateStore`] the test double.

pub mod error;
pub mod fakes;
pub mod store;
pub mod surreal;

pub use error::StorageError;
pub use store::{StateStore, StorageResult};
pub use surreal::SurrealStateStore;
