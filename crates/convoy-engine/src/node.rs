//! The execution primitive: a named node with a tri-state result, lifecycle
//! hooks, and a closed set of structural kinds.
//!
//! Every node is owned by exactly one parent (strict tree). Composites and
//! decorators are expressed as [`NodeKind`] variants so that plan surgery
//! (backchain linking) is a typed operation instead of a runtime type probe.

use std::time::{Duration, Instant};

use tracing::warn;

use crate::leaf::{Condition, Leaf, Task};
use crate::ops::OpPool;
use crate::status::Status;

/// Per-tick context handed down the tree.
pub struct Tick<'a> {
    /// Pool for background operations started by leaf actions.
    pub ops: &'a OpPool,
}

/// A node in a plan tree.
pub struct Node {
    pub(crate) name: String,
    pub(crate) status: Status,
    pub(crate) kind: NodeKind,
}

/// Structural kind of a node.
pub(crate) enum NodeKind {
    /// All children must succeed, in order; short-circuits.
    Sequence {
        memory: bool,
        children: Vec<Node>,
        cursor: usize,
    },
    /// First succeeding child wins; fails only if all fail.
    Selector {
        memory: bool,
        children: Vec<Node>,
        cursor: usize,
    },
    /// Barrier: every child must succeed; already-terminal children are not
    /// re-ticked within one activation.
    Parallel {
        children: Vec<Node>,
        done: Vec<Status>,
    },
    /// Flips Success/Failure, passes Running through.
    Inverter { child: Box<Node> },
    /// Re-runs a failing child up to `limit` total attempts.
    Retry {
        child: Box<Node>,
        limit: u32,
        attempts: u32,
    },
    /// Fails the child if it is still running past `limit` from entry,
    /// setting a caller-supplied flag.
    Timeout {
        child: Box<Node>,
        limit: Duration,
        entered: Option<Instant>,
        on_timeout: Box<dyn FnMut() + Send>,
    },
    /// Ticks the child only until the predicate first becomes true, then
    /// permanently returns `verdict` without ticking the child again.
    Guard {
        child: Box<Node>,
        predicate: Box<dyn FnMut() -> bool + Send>,
        latched: bool,
        verdict: Status,
    },
    /// Like `Guard`, but the decided value lives in an external slot so the
    /// decision survives process restarts once persisted.
    Cache {
        child: Box<Node>,
        read: Box<dyn Fn() -> Option<Status> + Send>,
        write: Box<dyn FnMut(Status) + Send>,
    },
    /// A leaf behavior.
    Leaf { leaf: Box<dyn Leaf> },
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Node {
    fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            status: Status::Unset,
            kind,
        }
    }

    pub fn sequence(name: impl Into<String>, memory: bool, children: Vec<Node>) -> Self {
        Self::new(
            name,
            NodeKind::Sequence {
                memory,
                children,
                cursor: 0,
            },
        )
    }

    pub fn selector(name: impl Into<String>, memory: bool, children: Vec<Node>) -> Self {
        Self::new(
            name,
            NodeKind::Selector {
                memory,
                children,
                cursor: 0,
            },
        )
    }

    pub fn parallel(name: impl Into<String>, children: Vec<Node>) -> Self {
        let done = vec![Status::Unset; children.len()];
        Self::new(name, NodeKind::Parallel { children, done })
    }

    pub fn inverter(name: impl Into<String>, child: Node) -> Self {
        Self::new(
            name,
            NodeKind::Inverter {
                child: Box::new(child),
            },
        )
    }

    pub fn retry(name: impl Into<String>, limit: u32, child: Node) -> Self {
        Self::new(
            name,
            NodeKind::Retry {
                child: Box::new(child),
                limit,
                attempts: 0,
            },
        )
    }

    pub fn timeout(
        name: impl Into<String>,
        limit: Duration,
        on_timeout: impl FnMut() + Send + 'static,
        child: Node,
    ) -> Self {
        Self::new(
            name,
            NodeKind::Timeout {
                child: Box::new(child),
                limit,
                entered: None,
                on_timeout: Box::new(on_timeout),
            },
        )
    }

    pub fn guard(
        name: impl Into<String>,
        verdict: Status,
        predicate: impl FnMut() -> bool + Send + 'static,
        child: Node,
    ) -> Self {
        Self::new(
            name,
            NodeKind::Guard {
                child: Box::new(child),
                predicate: Box::new(predicate),
                latched: false,
                verdict,
            },
        )
    }

    pub fn cache(
        name: impl Into<String>,
        read: impl Fn() -> Option<Status> + Send + 'static,
        write: impl FnMut(Status) + Send + 'static,
        child: Node,
    ) -> Self {
        Self::new(
            name,
            NodeKind::Cache {
                child: Box::new(child),
                read: Box::new(read),
                write: Box::new(write),
            },
        )
    }

    pub fn leaf(name: impl Into<String>, leaf: impl Leaf + 'static) -> Self {
        Self::new(
            name,
            NodeKind::Leaf {
                leaf: Box::new(leaf),
            },
        )
    }

    pub fn condition(
        name: impl Into<String>,
        check: impl FnMut() -> bool + Send + 'static,
    ) -> Self {
        Self::leaf(name, Condition::new(check))
    }

    pub fn task(name: impl Into<String>, run: impl FnMut() -> Status + Send + 'static) -> Self {
        Self::leaf(name, Task::new(run))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Structural label; leaf labels come from [`Leaf::kind_label`].
    pub fn kind_label(&self) -> &'static str {
        match &self.kind {
            NodeKind::Sequence { .. } => "sequence",
            NodeKind::Selector { .. } => "selector",
            NodeKind::Parallel { .. } => "parallel",
            NodeKind::Inverter { .. } => "inverter",
            NodeKind::Retry { .. } => "retry",
            NodeKind::Timeout { .. } => "timeout",
            NodeKind::Guard { .. } => "guard",
            NodeKind::Cache { .. } => "cache",
            NodeKind::Leaf { leaf } => leaf.kind_label(),
        }
    }

    pub fn children(&self) -> &[Node] {
        match &self.kind {
            NodeKind::Sequence { children, .. }
            | NodeKind::Selector { children, .. }
            | NodeKind::Parallel { children, .. } => children,
            NodeKind::Inverter { child }
            | NodeKind::Retry { child, .. }
            | NodeKind::Timeout { child, .. }
            | NodeKind::Guard { child, .. }
            | NodeKind::Cache { child, .. } => std::slice::from_ref(child.as_ref()),
            NodeKind::Leaf { .. } => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> &mut [Node] {
        match &mut self.kind {
            NodeKind::Sequence { children, .. }
            | NodeKind::Selector { children, .. }
            | NodeKind::Parallel { children, .. } => children,
            NodeKind::Inverter { child }
            | NodeKind::Retry { child, .. }
            | NodeKind::Timeout { child, .. }
            | NodeKind::Guard { child, .. }
            | NodeKind::Cache { child, .. } => std::slice::from_mut(child.as_mut()),
            NodeKind::Leaf { .. } => &mut [],
        }
    }

    /// Whether this node is a composite holding more than one child.
    pub(crate) fn is_multi_composite(&self) -> bool {
        matches!(
            &self.kind,
            NodeKind::Sequence { children, .. }
            | NodeKind::Selector { children, .. }
            | NodeKind::Parallel { children, .. }
                if children.len() > 1
        )
    }

    /// One synchronous evaluation pass of this subtree.
    pub fn tick(&mut self, ctx: &mut Tick<'_>) -> Status {
        if self.status != Status::Running {
            self.enter(ctx);
        }
        let next = self.update(ctx);
        if next != Status::Running {
            self.exit(ctx, next);
        }
        self.status = next;
        next
    }

    /// Forcibly terminate a still-running subtree, children first.
    pub fn abort(&mut self, ctx: &mut Tick<'_>) {
        if self.status != Status::Running {
            return;
        }
        for child in self.children_mut() {
            child.abort(ctx);
        }
        if let NodeKind::Leaf { leaf } = &mut self.kind {
            leaf.terminate(ctx, Status::Cancelled);
        }
        self.status = Status::Cancelled;
    }

    fn enter(&mut self, ctx: &mut Tick<'_>) {
        match &mut self.kind {
            NodeKind::Sequence { cursor, .. } | NodeKind::Selector { cursor, .. } => *cursor = 0,
            NodeKind::Parallel { children, done } => {
                *done = vec![Status::Unset; children.len()];
            }
            NodeKind::Retry { attempts, .. } => *attempts = 0,
            NodeKind::Timeout { entered, .. } => *entered = Some(Instant::now()),
            // The guard latch survives re-entry on purpose.
            NodeKind::Inverter { .. } | NodeKind::Guard { .. } | NodeKind::Cache { .. } => {}
            NodeKind::Leaf { leaf } => leaf.initialise(ctx),
        }
    }

    fn exit(&mut self, ctx: &mut Tick<'_>, status: Status) {
        match &mut self.kind {
            NodeKind::Leaf { leaf } => leaf.terminate(ctx, status),
            _ => {
                for child in self.children_mut() {
                    child.abort(ctx);
                }
            }
        }
    }

    fn update(&mut self, ctx: &mut Tick<'_>) -> Status {
        let name = self.name.clone();
        match &mut self.kind {
            NodeKind::Sequence {
                memory,
                children,
                cursor,
            } => {
                let mut idx = if *memory { *cursor } else { 0 };
                let mut decided = Status::Success;
                while idx < children.len() {
                    match children[idx].tick(ctx) {
                        Status::Success => idx += 1,
                        Status::Running => {
                            if *memory {
                                *cursor = idx;
                            }
                            decided = Status::Running;
                            break;
                        }
                        _ => {
                            decided = Status::Failure;
                            break;
                        }
                    }
                }
                abort_after(children, idx, ctx);
                decided
            }
            NodeKind::Selector {
                memory,
                children,
                cursor,
            } => {
                let mut idx = if *memory { *cursor } else { 0 };
                let mut decided = Status::Failure;
                while idx < children.len() {
                    match children[idx].tick(ctx) {
                        Status::Success => {
                            decided = Status::Success;
                            break;
                        }
                        Status::Running => {
                            if *memory {
                                *cursor = idx;
                            }
                            decided = Status::Running;
                            break;
                        }
                        _ => idx += 1,
                    }
                }
                abort_after(children, idx, ctx);
                decided
            }
            NodeKind::Parallel { children, done } => {
                let mut any_failure = false;
                let mut all_success = true;
                for (idx, child) in children.iter_mut().enumerate() {
                    if done[idx].is_terminal() {
                        if done[idx] != Status::Success {
                            all_success = false;
                        }
                        continue;
                    }
                    let status = child.tick(ctx);
                    if status.is_terminal() {
                        done[idx] = status;
                    }
                    match status {
                        Status::Success => {}
                        Status::Running => all_success = false,
                        _ => {
                            any_failure = true;
                            all_success = false;
                        }
                    }
                }
                if any_failure {
                    for child in children.iter_mut() {
                        child.abort(ctx);
                    }
                    Status::Failure
                } else if all_success {
                    Status::Success
                } else {
                    Status::Running
                }
            }
            NodeKind::Inverter { child } => match child.tick(ctx) {
                Status::Success => Status::Failure,
                Status::Running => Status::Running,
                _ => Status::Success,
            },
            NodeKind::Retry {
                child,
                limit,
                attempts,
            } => match child.tick(ctx) {
                Status::Running => Status::Running,
                Status::Success => Status::Success,
                _ => {
                    *attempts += 1;
                    if *attempts >= *limit {
                        Status::Failure
                    } else {
                        Status::Running
                    }
                }
            },
            NodeKind::Timeout {
                child,
                limit,
                entered,
                on_timeout,
            } => {
                let status = child.tick(ctx);
                if status == Status::Running {
                    let expired = entered.map_or(false, |t| t.elapsed() >= *limit);
                    if expired {
                        warn!(node = %name, "subtree timed out; cancelling");
                        child.abort(ctx);
                        (on_timeout)();
                        return Status::Failure;
                    }
                }
                demote(status)
            }
            NodeKind::Guard {
                child,
                predicate,
                latched,
                verdict,
            } => {
                if *latched {
                    return *verdict;
                }
                if (predicate)() {
                    *latched = true;
                    child.abort(ctx);
                    return *verdict;
                }
                demote(child.tick(ctx))
            }
            NodeKind::Cache { child, read, write } => {
                if let Some(decided) = (read)() {
                    child.abort(ctx);
                    return decided;
                }
                let status = demote(child.tick(ctx));
                if status.is_terminal() {
                    (write)(status);
                }
                status
            }
            NodeKind::Leaf { leaf } => {
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    leaf.update(ctx)
                }));
                match outcome {
                    Ok(status) => demote(status),
                    Err(_) => {
                        warn!(node = %name, "leaf panicked during update; reporting failure");
                        Status::Failure
                    }
                }
            }
        }
    }
}

/// A tick result never carries `Cancelled` upward.
fn demote(status: Status) -> Status {
    match status {
        Status::Cancelled | Status::Unset => Status::Failure,
        other => other,
    }
}

/// Abort children after the decision point that are still running from an
/// earlier pass (memoryless rescan switching branches).
fn abort_after(children: &mut [Node], decided_at: usize, ctx: &mut Tick<'_>) {
    for child in children.iter_mut().skip(decided_at + 1) {
        if child.status == Status::Running {
            child.abort(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn tick(node: &mut Node) -> Status {
        let pool = OpPool::new();
        let mut ctx = Tick { ops: &pool };
        node.tick(&mut ctx)
    }

    fn counted_task(
        counter: &Arc<AtomicUsize>,
        mut results: Vec<Status>,
    ) -> impl FnMut() -> Status + Send {
        let counter = Arc::clone(counter);
        results.reverse();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            results.pop().unwrap_or(Status::Success)
        }
    }

    #[test]
    fn test_sequence_all_succeed() {
        let mut seq = Node::sequence(
            "all",
            false,
            vec![
                Node::task("a", || Status::Success),
                Node::task("b", || Status::Success),
            ],
        );
        assert_eq!(tick(&mut seq), Status::Success);
    }

    #[test]
    fn test_sequence_short_circuits_on_failure() {
        let reached = Arc::new(AtomicUsize::new(0));
        let mut seq = Node::sequence(
            "stop early",
            false,
            vec![
                Node::task("fails", || Status::Failure),
                Node::task("unreached", counted_task(&reached, vec![])),
            ],
        );
        assert_eq!(tick(&mut seq), Status::Failure);
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_selector_short_circuits_on_success() {
        let reached = Arc::new(AtomicUsize::new(0));
        let mut sel = Node::selector(
            "pick",
            false,
            vec![
                Node::task("fails", || Status::Failure),
                Node::task("wins", || Status::Success),
                Node::task("unreached", counted_task(&reached, vec![])),
            ],
        );
        assert_eq!(tick(&mut sel), Status::Success);
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_sequence_memory_skips_decided_children() {
        let first = Arc::new(AtomicUsize::new(0));
        let mut seq = Node::sequence(
            "resume",
            true,
            vec![
                Node::task("first", counted_task(&first, vec![Status::Success])),
                Node::task(
                    "second",
                    {
                        let mut calls = 0;
                        move || {
                            calls += 1;
                            if calls < 3 {
                                Status::Running
                            } else {
                                Status::Success
                            }
                        }
                    },
                ),
            ],
        );
        assert_eq!(tick(&mut seq), Status::Running);
        assert_eq!(tick(&mut seq), Status::Running);
        assert_eq!(tick(&mut seq), Status::Success);
        // Memory: the first child was only ever evaluated once.
        assert_eq!(first.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_memoryless_sequence_rescans_from_first_child() {
        let first = Arc::new(AtomicUsize::new(0));
        let mut seq = Node::sequence(
            "rescan",
            false,
            vec![
                Node::task("first", counted_task(&first, vec![])),
                Node::task("second", {
                    let mut calls = 0;
                    move || {
                        calls += 1;
                        if calls < 2 {
                            Status::Running
                        } else {
                            Status::Success
                        }
                    }
                }),
            ],
        );
        assert_eq!(tick(&mut seq), Status::Running);
        assert_eq!(tick(&mut seq), Status::Success);
        assert_eq!(first.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_parallel_skips_terminal_children() {
        let fast = Arc::new(AtomicUsize::new(0));
        let slow = Arc::new(AtomicUsize::new(0));
        let mut barrier = Node::parallel(
            "barrier",
            vec![
                Node::task("fast", counted_task(&fast, vec![Status::Success])),
                Node::task(
                    "slow",
                    counted_task(&slow, vec![Status::Running, Status::Running, Status::Success]),
                ),
            ],
        );
        assert_eq!(tick(&mut barrier), Status::Running);
        assert_eq!(tick(&mut barrier), Status::Running);
        assert_eq!(tick(&mut barrier), Status::Success);
        // Update call count equals ticks spent non-terminal, never more.
        assert_eq!(fast.load(Ordering::SeqCst), 1);
        assert_eq!(slow.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_parallel_fails_fast_and_aborts_siblings() {
        let mut barrier = Node::parallel(
            "barrier",
            vec![
                Node::task("stuck", || Status::Running),
                Node::task("breaks", || Status::Failure),
            ],
        );
        assert_eq!(tick(&mut barrier), Status::Failure);
        assert_eq!(barrier.children()[0].status(), Status::Cancelled);
    }

    #[test]
    fn test_empty_parallel_succeeds() {
        let mut barrier = Node::parallel("empty", vec![]);
        assert_eq!(tick(&mut barrier), Status::Success);
    }

    #[test]
    fn test_inverter() {
        let mut inverted = Node::inverter("not", Node::task("yes", || Status::Success));
        assert_eq!(tick(&mut inverted), Status::Failure);
        let mut inverted = Node::inverter("not", Node::task("no", || Status::Failure));
        assert_eq!(tick(&mut inverted), Status::Success);
        let mut inverted = Node::inverter("not", Node::task("busy", || Status::Running));
        assert_eq!(tick(&mut inverted), Status::Running);
    }

    #[test]
    fn test_retry_succeeds_within_budget() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut retried = Node::retry(
            "retry",
            3,
            Node::task(
                "flaky",
                counted_task(&calls, vec![Status::Failure, Status::Failure, Status::Success]),
            ),
        );
        assert_eq!(tick(&mut retried), Status::Running);
        assert_eq!(tick(&mut retried), Status::Running);
        assert_eq!(tick(&mut retried), Status::Success);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retry_exhausts_budget() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut retried = Node::retry("retry", 2, Node::task("broken", counted_task(&calls, vec![
            Status::Failure,
            Status::Failure,
            Status::Failure,
        ])));
        assert_eq!(tick(&mut retried), Status::Running);
        assert_eq!(tick(&mut retried), Status::Failure);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_retry_counter_resets_between_activations() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut retried = Node::retry(
            "retry",
            2,
            Node::task(
                "flaky",
                counted_task(
                    &calls,
                    vec![Status::Failure, Status::Success, Status::Failure, Status::Success],
                ),
            ),
        );
        assert_eq!(tick(&mut retried), Status::Running);
        assert_eq!(tick(&mut retried), Status::Success);
        // Fresh activation gets the full budget again.
        assert_eq!(tick(&mut retried), Status::Running);
        assert_eq!(tick(&mut retried), Status::Success);
    }

    #[test]
    fn test_guard_latches_and_stops_ticking_child() {
        let child_calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(AtomicUsize::new(0));
        let gate_read = Arc::clone(&gate);
        let mut guarded = Node::guard(
            "freeze once satisfied",
            Status::Success,
            move || gate_read.load(Ordering::SeqCst) > 0,
            Node::task("checked", counted_task(&child_calls, vec![Status::Running; 8])),
        );
        assert_eq!(tick(&mut guarded), Status::Running);
        assert_eq!(tick(&mut guarded), Status::Running);
        gate.store(1, Ordering::SeqCst);
        assert_eq!(tick(&mut guarded), Status::Success);
        assert_eq!(tick(&mut guarded), Status::Success);
        assert_eq!(child_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_returns_external_decision_without_ticking() {
        use std::sync::Mutex;
        let slot: Arc<Mutex<Option<Status>>> = Arc::new(Mutex::new(None));
        let child_calls = Arc::new(AtomicUsize::new(0));
        let read_slot = Arc::clone(&slot);
        let write_slot = Arc::clone(&slot);
        let mut cached = Node::cache(
            "latched branch",
            move || *read_slot.lock().unwrap(),
            move |status| *write_slot.lock().unwrap() = Some(status),
            Node::task("work", counted_task(&child_calls, vec![Status::Running, Status::Success])),
        );
        assert_eq!(tick(&mut cached), Status::Running);
        assert_eq!(tick(&mut cached), Status::Success);
        assert_eq!(*slot.lock().unwrap(), Some(Status::Success));
        // Decision now comes from the slot; the child is never ticked again.
        assert_eq!(tick(&mut cached), Status::Success);
        assert_eq!(child_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_honors_preexisting_decision() {
        use std::sync::Mutex;
        let slot: Arc<Mutex<Option<Status>>> = Arc::new(Mutex::new(Some(Status::Failure)));
        let child_calls = Arc::new(AtomicUsize::new(0));
        let read_slot = Arc::clone(&slot);
        let mut cached = Node::cache(
            "restored branch",
            move || *read_slot.lock().unwrap(),
            |_| {},
            Node::task("work", counted_task(&child_calls, vec![])),
        );
        assert_eq!(tick(&mut cached), Status::Failure);
        assert_eq!(child_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_leaf_panic_downgrades_to_failure() {
        let mut node = Node::task("explodes", || panic!("boom"));
        assert_eq!(tick(&mut node), Status::Failure);
    }

    #[test]
    fn test_timeout_expires_and_sets_flag() {
        use std::sync::Mutex;
        let flag = Arc::new(Mutex::new(false));
        let flag_set = Arc::clone(&flag);
        let cleanups = Arc::new(AtomicUsize::new(0));
        let cleanup_count = Arc::clone(&cleanups);

        struct Stuck {
            cleanups: Arc<AtomicUsize>,
        }
        impl Leaf for Stuck {
            fn update(&mut self, _ctx: &mut Tick<'_>) -> Status {
                Status::Running
            }
            fn terminate(&mut self, _ctx: &mut Tick<'_>, status: Status) {
                assert_eq!(status, Status::Cancelled);
                self.cleanups.fetch_add(1, Ordering::SeqCst);
            }
        }

        let mut timed = Node::timeout(
            "bounded",
            Duration::from_millis(20),
            move || *flag_set.lock().unwrap() = true,
            Node::leaf(
                "stuck",
                Stuck {
                    cleanups: cleanup_count,
                },
            ),
        );
        assert_eq!(tick(&mut timed), Status::Running);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(tick(&mut timed), Status::Failure);
        assert!(*flag.lock().unwrap());
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        // The child's cleanup ran exactly once.
        assert_eq!(tick(&mut timed), Status::Running);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }
}
