//! Debounced write coalescing.
//!
//! The debouncer holds a single pending slot. Scheduling while a write is
//! pending aborts the pending timer and replaces its payload, so only the
//! most recent payload is written once the quiet window passes. Every caller
//! whose request was coalesced receives the outcome of that one write.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

struct Pending {
    generation: u64,
    timer: JoinHandle<()>,
    waiters: Vec<oneshot::Sender<bool>>,
}

#[derive(Default)]
struct Slot {
    pending: Option<Pending>,
    next_generation: u64,
}

/// Coalesces bursts of writes into one write after a quiet period.
#[derive(Clone)]
pub struct SaveDebouncer {
    window: Duration,
    slot: Arc<Mutex<Slot>>,
}

impl SaveDebouncer {
    /// Creates a debouncer with the given quiet window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// Returns the quiet window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns true if a write is waiting for its quiet window to pass.
    pub fn is_pending(&self) -> bool {
        self.slot.lock().pending.is_some()
    }

    /// Schedules `write(payload)` after the quiet window.
    ///
    /// Any pending write is superseded. The returned future resolves to the
    /// outcome of the write that eventually runs, or `false` if it is
    /// cancelled. Must be called from within a tokio runtime.
    pub fn schedule<P, W, Fut>(&self, payload: P, write: W) -> impl Future<Output = bool>
    where
        P: Send + 'static,
        W: FnOnce(P) -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        {
            let mut slot = self.slot.lock();
            let mut waiters = match slot.pending.take() {
                Some(previous) => {
                    previous.timer.abort();
                    debug!(
                        coalesced = previous.waiters.len() + 1,
                        "superseding pending save"
                    );
                    previous.waiters
                }
                None => Vec::new(),
            };
            waiters.push(tx);

            let generation = slot.next_generation;
            slot.next_generation = slot.next_generation.wrapping_add(1);

            let timer = tokio::spawn(Self::fire(
                Arc::clone(&self.slot),
                generation,
                self.window,
                payload,
                write,
            ));

            slot.pending = Some(Pending {
                generation,
                timer,
                waiters,
            });
        }

        async move { rx.await.unwrap_or(false) }
    }

    async fn fire<P, W, Fut>(
        slot: Arc<Mutex<Slot>>,
        generation: u64,
        window: Duration,
        payload: P,
        write: W,
    ) where
        W: FnOnce(P) -> Fut,
        Fut: Future<Output = bool>,
    {
        tokio::time::sleep(window).await;

        let waiters = {
            let mut slot = slot.lock();
            match slot.pending.take() {
                Some(pending) if pending.generation == generation => pending.waiters,
                other => {
                    // Superseded between wake-up and lock.
                    slot.pending = other;
                    return;
                }
            }
        };

        debug!(waiters = waiters.len(), "quiet window elapsed, writing");
        let outcome = write(payload).await;
        for waiter in waiters {
            let _ = waiter.send(outcome);
        }
    }

    /// Cancels the pending write, if any. Its callers resolve to `false`.
    ///
    /// Returns true if a write was cancelled. A write whose quiet window has
    /// already elapsed runs to completion.
    pub fn cancel(&self) -> bool {
        match self.slot.lock().pending.take() {
            Some(pending) => {
                pending.timer.abort();
                debug!(waiters = pending.waiters.len(), "cancelled pending save");
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for SaveDebouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveDebouncer")
            .field("window", &self.window)
            .field("pending", &self.is_pending())
            .finish()
    }
}
