//! Per-key debounce and throttle.
//!
//! Both operate on the canonical [`RequestKey`], so two calls that share
//! a URL but differ in body are never conflated.
//!
//! - **Debounce** is trailing and cancelling: only the latest intent for
//!   a key survives the quiescence window; superseded callers observe a
//!   first-class `Cancelled(debounce)` outcome, not a network failure.
//! - **Throttle** is leading: a call is admitted immediately when the
//!   interval since the last admission has elapsed, and rejected with
//!   `Cancelled(throttle)` otherwise. No buffering.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::oneshot;
use tracing::debug;

use courier_core::{CancelKind, Error, RequestKey, Result};

struct DebounceSlot {
    seq: u64,
    cancel: oneshot::Sender<CancelKind>,
}

/// Per-key debounce/throttle state shared by all pipeline clones.
#[derive(Default)]
pub(crate) struct Coalescer {
    debounce_slots: DashMap<RequestKey, DebounceSlot>,
    throttle_marks: DashMap<RequestKey, Instant>,
    seq: AtomicU64,
}

impl Coalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits out the quiescence window for this key.
    ///
    /// Resolves after `delay` if no newer call with the same key arrives
    /// in the meantime; otherwise fails with `Cancelled(debounce)` the
    /// moment the newer call supersedes this one.
    pub async fn debounce(&self, key: &RequestKey, delay: Duration) -> Result<()> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        if let Some(previous) = self
            .debounce_slots
            .insert(key.clone(), DebounceSlot { seq, cancel: tx })
        {
            debug!(%key, "debounce superseding pending call");
            let _ = previous.cancel.send(CancelKind::Debounce);
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                self.debounce_slots.remove_if(key, |_, slot| slot.seq == seq);
                Ok(())
            }
            kind = rx => {
                Err(Error::Cancelled(kind.unwrap_or(CancelKind::ManagerCleared)))
            }
        }
    }

    /// Admits or rejects this key under the leading throttle.
    pub fn throttle(&self, key: &RequestKey, interval: Duration) -> Result<()> {
        let now = Instant::now();
        let admitted = match self.throttle_marks.entry(key.clone()) {
            Entry::Occupied(mut mark) => {
                if now.duration_since(*mark.get()) >= interval {
                    mark.insert(now);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        };
        if admitted {
            Ok(())
        } else {
            Err(Error::Cancelled(CancelKind::Throttle))
        }
    }

    /// Shutdown: rejects every pending debounce with
    /// `Cancelled(manager-cleared)` and forgets throttle marks.
    pub fn clear(&self) {
        let keys: Vec<RequestKey> = self
            .debounce_slots
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for key in keys {
            if let Some((_, slot)) = self.debounce_slots.remove(&key) {
                let _ = slot.cancel.send(CancelKind::ManagerCleared);
            }
        }
        self.throttle_marks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::Request;
    use std::sync::Arc;

    fn key() -> RequestKey {
        RequestKey::of(&Request::get("/debounced"))
    }

    #[tokio::test]
    async fn debounce_rejects_superseded_caller() {
        let coalescer = Arc::new(Coalescer::new());
        let first = {
            let coalescer = Arc::clone(&coalescer);
            tokio::spawn(async move { coalescer.debounce(&key(), Duration::from_millis(50)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = coalescer.debounce(&key(), Duration::from_millis(50)).await;
        let first = first.await.unwrap();
        assert_eq!(first.unwrap_err().cancel_kind(), Some(CancelKind::Debounce));
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn throttle_admits_leading_call_only() {
        let coalescer = Coalescer::new();
        let interval = Duration::from_millis(100);
        assert!(coalescer.throttle(&key(), interval).is_ok());
        assert_eq!(
            coalescer.throttle(&key(), interval).unwrap_err().cancel_kind(),
            Some(CancelKind::Throttle)
        );
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(coalescer.throttle(&key(), interval).is_ok());
    }

    #[tokio::test]
    async fn clear_rejects_pending_with_manager_cleared() {
        let coalescer = Arc::new(Coalescer::new());
        let pending = {
            let coalescer = Arc::clone(&coalescer);
            tokio::spawn(async move { coalescer.debounce(&key(), Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        coalescer.clear();
        let outcome = pending.await.unwrap();
        assert_eq!(
            outcome.unwrap_err().cancel_kind(),
            Some(CancelKind::ManagerCleared)
        );
    }
}
