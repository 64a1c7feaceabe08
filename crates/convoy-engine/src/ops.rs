//! Background operation pool.
//!
//! Leaf actions that need a slow external call start it here during
//! `initialise` and poll the returned [`OpHandle`] on every `update` tick.
//! The pool tracks how many operations are outstanding so the scheduler can
//! block between ticks until at least one settles, instead of spinning.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, Notify};
use tokio::task::AbortHandle;

/// Shared pool of in-flight background operations.
///
/// Cloning is cheap; all clones observe the same outstanding count.
#[derive(Clone, Default)]
pub struct OpPool {
    outstanding: Arc<AtomicUsize>,
    settled: Arc<Notify>,
}

/// Decrements the outstanding count when the spawned task finishes for any
/// reason, including abort (the drop runs when the task future is dropped).
struct Settle {
    outstanding: Arc<AtomicUsize>,
    settled: Arc<Notify>,
}

impl Drop for Settle {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.settled.notify_waiters();
    }
}

impl OpPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a background operation onto the runtime.
    ///
    /// The returned handle is the only way to observe the result; dropping it
    /// does not cancel the operation (call [`OpHandle::cancel`] for that).
    pub fn submit<T, F>(&self, fut: F) -> OpHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let settle = Settle {
            outstanding: Arc::clone(&self.outstanding),
            settled: Arc::clone(&self.settled),
        };
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let _settle = settle;
            let _ = tx.send(fut.await);
        });
        OpHandle {
            rx,
            abort: task.abort_handle(),
        }
    }

    /// Number of operations that have been submitted but not yet settled.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Wait until at least one operation settles.
    ///
    /// Returns immediately if nothing is outstanding.
    pub async fn wait_one(&self) {
        let notified = self.settled.notified();
        if self.outstanding() == 0 {
            return;
        }
        notified.await;
    }
}

/// Observed state of a background operation.
#[derive(Debug)]
pub enum OpState<T> {
    /// Still running; poll again next tick.
    Pending,
    /// Finished; the value is handed over exactly once.
    Ready(T),
    /// The task was aborted or panicked; no value will ever arrive.
    Gone,
}

/// Handle to one background operation.
pub struct OpHandle<T> {
    rx: oneshot::Receiver<T>,
    abort: AbortHandle,
}

impl<T> OpHandle<T> {
    /// Non-blocking poll. Never waits; safe to call from `update`.
    pub fn try_take(&mut self) -> OpState<T> {
        match self.rx.try_recv() {
            Ok(value) => OpState::Ready(value),
            Err(oneshot::error::TryRecvError::Empty) => OpState::Pending,
            Err(oneshot::error::TryRecvError::Closed) => OpState::Gone,
        }
    }

    /// Abort the underlying task. Best-effort; any remote side effect the
    /// operation already issued is not rolled back.
    pub fn cancel(&self) {
        self.abort.abort();
    }
}
