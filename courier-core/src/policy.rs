//! Plain-data behavior policies.
//!
//! These types carry no callbacks and derive `serde`, so embedders can
//! load them from configuration files; durations accept humantime
//! strings ("250ms", "5s", "1m").

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Response cache settings when caching is enabled.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct EnabledCachePolicy {
    /// Time-to-live for cached bodies. `None` means entries never expire.
    #[serde(default, with = "humantime_serde")]
    pub ttl: Option<Duration>,
    /// Maximum number of entries before eviction.
    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,
}

fn default_cache_capacity() -> u64 {
    10_000
}

impl Default for EnabledCachePolicy {
    fn default() -> Self {
        Self {
            ttl: Some(Duration::from_secs(60)),
            max_capacity: default_cache_capacity(),
        }
    }
}

/// Whether responses are cached, and how.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub enum CachePolicy {
    /// Cache successful response bodies keyed by request key.
    Enabled(EnabledCachePolicy),
    /// Never read or write the cache.
    Disabled,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::Disabled
    }
}

impl CachePolicy {
    /// The enabled settings, if caching is on.
    pub fn enabled(&self) -> Option<&EnabledCachePolicy> {
        match self {
            CachePolicy::Enabled(policy) => Some(policy),
            CachePolicy::Disabled => None,
        }
    }
}

/// Per-key request coalescing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct CoalescePolicy {
    /// Trailing debounce delay. `None` disables debouncing.
    #[serde(default, with = "humantime_serde")]
    pub debounce: Option<Duration>,
    /// Leading throttle interval. `None` disables throttling.
    #[serde(default, with = "humantime_serde")]
    pub throttle: Option<Duration>,
}

/// Bounded retry with fixed delay.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Maximum retries after the initial attempt.
    pub times: u32,
    /// Fixed delay between attempts.
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            times: 3,
            delay: Duration::from_millis(500),
        }
    }
}

/// Global admission limit for in-flight operations.
///
/// `None` means unconstrained pass-through.
pub type ConcurrencyLimit = Option<NonZeroUsize>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_policy_parses_humantime_ttl() {
        let json = r#"{"Enabled": {"ttl": "5s", "max_capacity": 128}}"#;
        let policy: CachePolicy = serde_json::from_str(json).unwrap();
        let enabled = policy.enabled().unwrap();
        assert_eq!(enabled.ttl, Some(Duration::from_secs(5)));
        assert_eq!(enabled.max_capacity, 128);
    }

    #[test]
    fn coalesce_policy_defaults_off() {
        let policy = CoalescePolicy::default();
        assert!(policy.debounce.is_none());
        assert!(policy.throttle.is_none());
    }
}
