//! Cooperative scheduler: drives an assembled plan until it settles.
//!
//! The tree is ticked synchronously; concurrency lives only in the
//! background operations that leaf actions start. Between ticks the loop
//! blocks until at least one outstanding operation settles, so status
//! changes are absorbed promptly without spinning. The loop ends when the
//! root holds a terminal status across two consecutive ticks with no
//! operation outstanding; the second tick absorbs any work the first one's
//! status flip might have started.

use std::time::Duration;

use tracing::debug;

use crate::node::{Node, Tick};
use crate::ops::OpPool;
use crate::snapshot::TreeSnapshot;
use crate::status::Status;

/// Default pause before re-ticking a tree that is running but has nothing
/// outstanding (time-gated subtrees waiting on a timeout clock).
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Drives one plan tree to completion.
pub struct Ticker {
    root: Node,
    pool: OpPool,
    tick_interval: Duration,
}

impl Ticker {
    pub fn new(root: Node) -> Self {
        Self {
            root,
            pool: OpPool::new(),
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn pool(&self) -> &OpPool {
        &self.pool
    }

    /// Snapshot of the tree as of the latest tick.
    pub fn snapshot(&self) -> TreeSnapshot {
        self.root.snapshot()
    }

    /// One synchronous evaluation pass.
    pub fn tick_once(&mut self) -> Status {
        let mut ctx = Tick { ops: &self.pool };
        self.root.tick(&mut ctx)
    }

    /// Run the driving loop to completion.
    pub async fn settle(&mut self) -> Status {
        match self
            .settle_with(|_| async { Ok::<(), std::convert::Infallible>(()) })
            .await
        {
            Ok(status) => status,
            Err(never) => match never {},
        }
    }

    /// Run the driving loop, invoking `after_tick` after every tick (state
    /// persistence hooks). An error from the hook aborts the loop and
    /// propagates to the caller as a hard error.
    pub async fn settle_with<F, Fut, E>(&mut self, mut after_tick: F) -> Result<Status, E>
    where
        F: FnMut(Status) -> Fut,
        Fut: std::future::Future<Output = Result<(), E>>,
    {
        let mut idle_ticks = 0u32;
        loop {
            let status = self.tick_once();
            after_tick(status).await?;

            if self.pool.outstanding() > 0 {
                idle_ticks = 0;
                self.pool.wait_one().await;
                continue;
            }

            idle_ticks += 1;
            if idle_ticks >= 2 {
                if status.is_terminal() {
                    debug!(status = %status, "plan settled");
                    return Ok(status);
                }
                // Still running with nothing outstanding: a subtree is
                // gated on wall-clock time. Pace the re-tick.
                tokio::time::sleep(self.tick_interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::Goal;
    use crate::leaf::Leaf;
    use crate::ops::{OpHandle, OpState};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Action that resolves through a background operation and records its
    /// completion in a shared flag, so a postcondition can short-circuit
    /// later passes.
    struct SlowAction {
        delay: Duration,
        op: Option<OpHandle<Status>>,
        updates: Arc<AtomicUsize>,
        done: Arc<AtomicBool>,
    }

    impl Leaf for SlowAction {
        fn initialise(&mut self, ctx: &mut Tick<'_>) {
            let delay = self.delay;
            self.op = Some(ctx.ops.submit(async move {
                tokio::time::sleep(delay).await;
                Status::Success
            }));
        }

        fn update(&mut self, _ctx: &mut Tick<'_>) -> Status {
            self.updates.fetch_add(1, Ordering::SeqCst);
            match self.op.as_mut().map(OpHandle::try_take) {
                Some(OpState::Ready(status)) => {
                    self.done.store(true, Ordering::SeqCst);
                    status
                }
                Some(OpState::Pending) => Status::Running,
                _ => Status::Failure,
            }
        }

        fn terminate(&mut self, _ctx: &mut Tick<'_>, _status: Status) {
            if let Some(op) = self.op.take() {
                op.cancel();
            }
        }
    }

    /// `ensure <name>` goal around a slow action, idempotent on re-entry.
    fn slow_goal(name: &str, delay: Duration, updates: &Arc<AtomicUsize>) -> Node {
        let done = Arc::new(AtomicBool::new(false));
        let check = Arc::clone(&done);
        let action = SlowAction {
            delay,
            op: None,
            updates: Arc::clone(updates),
            done,
        };
        Goal::new(format!("ensure {name}"), Node::leaf(name.to_string(), action))
            .postcondition(Node::condition(format!("{name} done"), move || {
                check.load(Ordering::SeqCst)
            }))
            .build()
    }

    #[tokio::test]
    async fn test_settles_single_async_action() {
        let updates = Arc::new(AtomicUsize::new(0));
        let root = slow_goal("slow", Duration::from_millis(20), &updates);
        let mut ticker = Ticker::new(root).with_tick_interval(Duration::from_millis(5));
        assert_eq!(ticker.settle().await, Status::Success);
        assert!(updates.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_settles_parallel_actions_of_differing_durations() {
        let fast = Arc::new(AtomicUsize::new(0));
        let slow = Arc::new(AtomicUsize::new(0));
        let root = Node::parallel(
            "both",
            vec![
                slow_goal("fast", Duration::from_millis(10), &fast),
                slow_goal("slow", Duration::from_millis(60), &slow),
            ],
        );
        let mut ticker = Ticker::new(root).with_tick_interval(Duration::from_millis(5));
        assert_eq!(ticker.settle().await, Status::Success);
        // The fast branch stops being ticked once terminal.
        assert!(fast.load(Ordering::SeqCst) < slow.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_after_tick_hook_runs_every_tick() {
        let updates = Arc::new(AtomicUsize::new(0));
        let root = slow_goal("slow", Duration::from_millis(10), &updates);
        let mut ticker = Ticker::new(root).with_tick_interval(Duration::from_millis(5));
        let hook_calls = Arc::new(AtomicUsize::new(0));
        let hook_counter = Arc::clone(&hook_calls);
        let status = ticker
            .settle_with(move |_| {
                let counter = Arc::clone(&hook_counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), std::convert::Infallible>(())
                }
            })
            .await
            .unwrap();
        assert_eq!(status, Status::Success);
        assert!(hook_calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_hook_error_propagates() {
        let root = Node::task("instant", || Status::Success);
        let mut ticker = Ticker::new(root);
        let result: Result<Status, &'static str> =
            ticker.settle_with(|_| async { Err("storage down") }).await;
        assert_eq!(result.unwrap_err(), "storage down");
    }

    #[tokio::test]
    async fn test_terminal_root_requires_two_idle_ticks() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let root = Node::task("instant", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Status::Success
        });
        let mut ticker = Ticker::new(root);
        assert_eq!(ticker.settle().await, Status::Success);
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }
}
