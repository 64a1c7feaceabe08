//! Convoy Engine: behavior-tree execution core.
//!
//! Provides the declarative plan machinery the release orchestrator runs on:
//!
//! - `Node` and its composites (Sequence, Selector, ParallelBarrier) and
//!   decorators (Inverter, Retry, Timeout, Guard, Cache)
//! - `Goal`: the postcondition / precondition / action fragment idiom
//! - `link` / `link_all`: the backchain linker that splices fragments into
//!   one re-entrant plan
//! - `OpPool`: background operations for slow external calls
//! - `Ticker`: the cooperative scheduler that drives a plan to completion
//!
//! The engine knows nothing about CI jobs or packages; those live in
//! `convoy-core` and plug in as leaves over shared records.

mod chain;
mod error;
mod goal;
mod leaf;
mod node;
mod ops;
mod snapshot;
mod status;
mod ticker;

pub use chain::{link, link_all};
pub use error::ChainError;
pub use goal::Goal;
pub use leaf::{Condition, Leaf, Task};
pub use node::{Node, Tick};
pub use ops::{OpHandle, OpPool, OpState};
pub use snapshot::{render_ascii, TreeSnapshot};
pub use status::Status;
pub use ticker::{Ticker, DEFAULT_TICK_INTERVAL};
