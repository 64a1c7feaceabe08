//! Leaf behaviors: the only nodes that do real work.
//!
//! A leaf follows the three-phase contract: `initialise` runs once on entry
//! and may start a background operation through [`Tick::ops`]; `update` runs
//! every tick, must not block, and reads settled operations; `terminate`
//! runs exactly once per activation when the leaf leaves `Running` or the
//! parent aborts it, and must cancel anything the leaf started.

use crate::node::Tick;
use crate::status::Status;

/// A unit of behavior driven by the tick loop.
pub trait Leaf: Send {
    /// Called once when the node enters active evaluation.
    fn initialise(&mut self, ctx: &mut Tick<'_>) {
        let _ = ctx;
    }

    /// Called every tick while active. Must return immediately.
    fn update(&mut self, ctx: &mut Tick<'_>) -> Status;

    /// Called when the node leaves `Running` for any terminal status, or
    /// when a parent aborts the subtree (status is then `Cancelled`).
    fn terminate(&mut self, ctx: &mut Tick<'_>, status: Status) {
        let _ = (ctx, status);
    }

    /// Structural label used for snapshot rendering and chain linking.
    fn kind_label(&self) -> &'static str {
        "action"
    }
}

/// Pure check over shared records. Succeeds or fails within one tick.
pub struct Condition {
    check: Box<dyn FnMut() -> bool + Send>,
}

impl Condition {
    pub fn new(check: impl FnMut() -> bool + Send + 'static) -> Self {
        Self {
            check: Box::new(check),
        }
    }
}

impl Leaf for Condition {
    fn update(&mut self, _ctx: &mut Tick<'_>) -> Status {
        if (self.check)() {
            Status::Success
        } else {
            Status::Failure
        }
    }

    fn kind_label(&self) -> &'static str {
        "condition"
    }
}

/// Pure single-tick action expressed as a closure returning a status.
pub struct Task {
    run: Box<dyn FnMut() -> Status + Send>,
}

impl Task {
    pub fn new(run: impl FnMut() -> Status + Send + 'static) -> Self {
        Self { run: Box::new(run) }
    }
}

impl Leaf for Task {
    fn update(&mut self, _ctx: &mut Tick<'_>) -> Status {
        (self.run)()
    }
}
