//! Keyed response cache with per-entry TTL.
//!
//! Bodies are stored against their [`RequestKey`] together with an
//! absolute expiry instant. Expiry is enforced twice: moka evicts
//! entries through a per-entry [`Expiry`] policy, and `get` re-checks
//! the instant so a stale entry read in the eviction window still
//! reports a miss and is removed.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use moka::Expiry;
use moka::future::Cache;
use tracing::debug;

use courier_core::{RequestKey, ResponseBody};

/// A cached body with its absolute expiry instant.
///
/// `expire == None` means the entry never expires.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub body: ResponseBody,
    pub expire: Option<DateTime<Utc>>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire.is_some_and(|expire| expire <= now)
    }
}

/// Expiration policy computing moka TTLs from the entry's absolute
/// expiry instant.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Expiration;

impl Expiry<RequestKey, CacheEntry> for Expiration {
    fn expire_after_create(
        &self,
        _key: &RequestKey,
        entry: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Self::remaining_ttl(entry)
    }

    fn expire_after_update(
        &self,
        _key: &RequestKey,
        entry: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        // Always derive from the NEW entry: the default would keep the
        // old expiry and expire refreshed entries prematurely.
        Self::remaining_ttl(entry)
    }
}

impl Expiration {
    fn remaining_ttl(entry: &CacheEntry) -> Option<Duration> {
        entry.expire.map(|expire| {
            let millis = (expire - Utc::now()).num_milliseconds();
            if millis <= 0 {
                Duration::ZERO
            } else {
                Duration::from_millis(millis as u64)
            }
        })
    }
}

/// In-memory response store used by the pipeline's cache stages.
#[derive(Clone)]
pub(crate) struct ResponseCache {
    store: Cache<RequestKey, CacheEntry>,
    default_ttl: Option<Duration>,
}

impl ResponseCache {
    pub fn new(max_capacity: u64, default_ttl: Option<Duration>) -> Self {
        let store = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(Expiration)
            .build();
        Self { store, default_ttl }
    }

    /// Returns the cached body iff the entry is live; expired entries
    /// are removed and reported as misses.
    pub async fn get(&self, key: &RequestKey) -> Option<ResponseBody> {
        let entry = self.store.get(key).await?;
        if entry.is_expired(Utc::now()) {
            debug!(%key, "cache entry expired, removing");
            self.store.invalidate(key).await;
            return None;
        }
        Some(entry.body)
    }

    /// Stores a body under the key with the given TTL (falling back to
    /// the configured default).
    pub async fn set(&self, key: RequestKey, body: ResponseBody, ttl: Option<Duration>) {
        let ttl = ttl.or(self.default_ttl);
        let expire = ttl.and_then(|ttl| {
            chrono::TimeDelta::from_std(ttl)
                .ok()
                .map(|delta| Utc::now() + delta)
        });
        self.store.insert(key, CacheEntry { body, expire }).await;
    }

    /// Removes one entry.
    pub async fn invalidate(&self, key: &RequestKey) {
        self.store.invalidate(key).await;
    }

    /// Empties the store.
    pub fn clear(&self) {
        self.store.invalidate_all();
    }
}
