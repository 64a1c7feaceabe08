//! Domain records shared by the plan's leaf behaviors.
//!
//! Records are shared by reference (`Shared<T>`) and constructor-injected
//! into every leaf that needs them. Write discipline: each goal fragment
//! writes only its own fields; sibling branches read, never write.

pub mod job;
pub mod package;
pub mod state;

use std::sync::{Arc, Mutex};

/// Shared-by-reference mutable record.
pub type Shared<T> = Arc<Mutex<T>>;

/// Wrap a record for constructor injection into leaves.
pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}
