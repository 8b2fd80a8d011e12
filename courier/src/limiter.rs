//! Global concurrency admission.
//!
//! The limiter bounds the number of in-flight operations and serves
//! queued waiters strictly first-in first-out. Everything that reaches
//! the transport — first attempts, retries, refresh re-sends submitted
//! by the pipeline, individual upload chunks and polling iterations —
//! passes through one shared limiter, so a single file upload cannot
//! monopolise the slot budget.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use courier_core::ConcurrencyLimit;

#[derive(Debug, Default)]
struct LimiterState {
    active: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

#[derive(Debug)]
struct LimiterInner {
    limit: ConcurrencyLimit,
    state: Mutex<LimiterState>,
}

/// FIFO admission gate over a fixed slot budget.
///
/// Cheap to clone; all clones share the same budget.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    inner: Arc<LimiterInner>,
}

impl ConcurrencyLimiter {
    /// Creates a limiter with the given budget. `None` is pass-through.
    pub fn new(limit: ConcurrencyLimit) -> Self {
        Self {
            inner: Arc::new(LimiterInner {
                limit,
                state: Mutex::new(LimiterState::default()),
            }),
        }
    }

    /// A limiter that admits `limit` concurrent operations.
    pub fn bounded(limit: NonZeroUsize) -> Self {
        Self::new(Some(limit))
    }

    /// A pass-through limiter.
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Runs a task under admission.
    ///
    /// If a slot is free the task starts immediately; otherwise the call
    /// queues behind earlier waiters. The slot is released when the task
    /// settles, success or failure, and handed to the next waiter. A
    /// task may itself call `run` and will queue like any other caller.
    pub async fn run<T>(&self, task: impl Future<Output = T>) -> T {
        let _slot = self.acquire().await;
        task.await
    }

    /// Operations currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().expect("limiter lock").active
    }

    /// Callers waiting for a slot.
    pub fn queued(&self) -> usize {
        self.inner.state.lock().expect("limiter lock").waiters.len()
    }

    async fn acquire(&self) -> Option<SlotGuard> {
        let Some(limit) = self.inner.limit else {
            return None;
        };
        let waiter = {
            let mut state = self.inner.state.lock().expect("limiter lock");
            if state.active < limit.get() {
                state.active += 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Some(Waiter {
                    rx: Some(rx),
                    inner: Arc::clone(&self.inner),
                })
            }
        };
        if let Some(mut waiter) = waiter {
            // The releasing task transfers its slot before signalling, so
            // a successful recv means the slot is already ours. The
            // sender is never dropped without sending.
            let _ = waiter.rx.as_mut().expect("waiter channel").await;
            // Consumed; the waiter's drop must not release it again.
            waiter.rx = None;
        }
        Some(SlotGuard {
            inner: Arc::clone(&self.inner),
        })
    }
}

/// Hands one slot to the oldest live waiter, or frees it.
fn release_slot(inner: &LimiterInner) {
    let mut state = inner.state.lock().expect("limiter lock");
    while let Some(tx) = state.waiters.pop_front() {
        // A waiter whose future was dropped has a closed channel; skip
        // it and try the next.
        if tx.send(()).is_ok() {
            return;
        }
    }
    state.active -= 1;
}

/// A queued waiter. Dropping it after a donor already transferred a
/// slot into the channel passes the orphaned slot on instead of
/// leaking it.
struct Waiter {
    rx: Option<oneshot::Receiver<()>>,
    inner: Arc<LimiterInner>,
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            // Exactly one of these holds: the donor's send failed (we
            // closed first) or the donated slot is sitting in the
            // channel and must be released.
            if rx.try_recv().is_ok() {
                release_slot(&self.inner);
            }
        }
    }
}

/// Releases one slot on drop, handing it to the oldest live waiter.
struct SlotGuard {
    inner: Arc<LimiterInner>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        release_slot(&self.inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn slot_released_on_task_panic_free_error() {
        let limiter = ConcurrencyLimiter::bounded(NonZeroUsize::new(1).unwrap());
        let result: Result<(), &str> = limiter.run(async { Err("boom") }).await;
        assert!(result.is_err());
        assert_eq!(limiter.in_flight(), 0);
        // The slot must be reusable after a failed task.
        let ok: Result<(), &str> = limiter.run(async { Ok(()) }).await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn unbounded_mode_never_queues() {
        let limiter = ConcurrencyLimiter::unbounded();
        let peak = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let limiter = limiter.clone();
            let peak = Arc::clone(&peak);
            let active = Arc::clone(&active);
            handles.push(tokio::spawn(async move {
                limiter
                    .run(async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 16);
        assert_eq!(limiter.queued(), 0);
    }

    #[tokio::test]
    async fn slot_donated_to_a_dropped_waiter_is_passed_on() {
        let limiter = ConcurrencyLimiter::bounded(NonZeroUsize::new(1).unwrap());
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let holder = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter
                    .run(async move {
                        let _ = release_rx.await;
                    })
                    .await;
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(limiter.in_flight(), 1);

        {
            // Queue a waiter with a single poll, then let the holder
            // donate its slot while the waiter is never polled again.
            let waiter = limiter.run(async {});
            tokio::pin!(waiter);
            assert!(futures::poll!(waiter.as_mut()).is_pending());
            assert_eq!(limiter.queued(), 1);

            release_tx.send(()).unwrap();
            holder.await.unwrap();
            // The waiter future drops here holding the donated slot.
        }

        // The orphaned slot was released, not leaked.
        assert_eq!(limiter.in_flight(), 0);
        limiter.run(async {}).await;
    }

    #[tokio::test]
    async fn dropped_waiter_does_not_leak_slot() {
        let limiter = ConcurrencyLimiter::bounded(NonZeroUsize::new(1).unwrap());
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let holder = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter
                    .run(async move {
                        let _ = release_rx.await;
                    })
                    .await;
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(limiter.in_flight(), 1);

        // Queue a waiter, then drop it before it is served.
        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter.run(async {}).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        waiter.abort();
        let _ = waiter.await;

        release_tx.send(()).unwrap();
        holder.await.unwrap();

        // The slot skipped the dead waiter and was released.
        assert_eq!(limiter.in_flight(), 0);
        limiter.run(async {}).await;
    }
}
