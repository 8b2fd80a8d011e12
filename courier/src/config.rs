//! Facade configuration.
//!
//! Behavior knobs are plain data ([`courier_core::policy`]); callback
//! slots are trait objects and function objects. Use
//! [`CourierConfig::builder`] to assemble a configuration.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use courier_core::{
    CachePolicy, CoalescePolicy, ConcurrencyLimit, EnabledCachePolicy, Error, Interceptor,
    RefreshFn, Response, Result, RetryPolicy, TokenProvider,
};

/// Global error hook, invoked once per logical request after retry is
/// exhausted, never for cancellations.
pub type ErrorHook = Arc<dyn Fn(&Error) + Send + Sync>;

/// Global response mapper applied to every response before code
/// handling. May rewrite or reject the response.
pub type ResponseHandler = Arc<dyn Fn(Response) -> Result<Response> + Send + Sync>;

/// Side-effect handler for one business code (toast, redirect).
pub type CodeHandler = Arc<dyn Fn(&Response) + Send + Sync>;

/// Side effect run when the refresh token expires or renewal fails.
pub type RefreshExpiredHook = Arc<dyn Fn() + Send + Sync>;

/// Receives downloaded files; the save mechanism (filesystem, DOM
/// anchor glue) is the embedder's concern.
pub trait DownloadSink: Send + Sync {
    /// Persists one downloaded payload under the suggested filename.
    fn save(&self, filename: &str, data: &Bytes);
}

/// Dual-token (access/refresh) recovery settings.
#[derive(Clone)]
pub struct DualTokenConfig {
    /// Renews the access token; must resolve to a non-empty string.
    pub refresh_access_token: RefreshFn,
    /// Business codes signalling an expired access token.
    pub access_expired_codes: Vec<i64>,
    /// Business codes signalling an expired refresh token. Terminal.
    pub refresh_expired_codes: Vec<i64>,
    /// Side effect invoked on refresh expiry or renewal failure.
    pub on_refresh_expired: Option<RefreshExpiredHook>,
}

/// Aggregate configuration consumed by [`Courier::new`].
///
/// [`Courier::new`]: crate::Courier::new
#[derive(Clone, Default)]
pub struct CourierConfig {
    /// Global admission limit. `None` is unconstrained.
    pub max_concurrent: ConcurrencyLimit,
    /// Response caching policy.
    pub cache: CachePolicy,
    /// Per-key debounce/throttle policy.
    pub coalesce: CoalescePolicy,
    /// Retry policy. `None` disables retry.
    pub retry: Option<RetryPolicy>,
    /// Bearer-token source for the injection stage.
    pub token_provider: Option<Arc<dyn TokenProvider>>,
    /// Dual-token recovery. `None` disables expiry detection.
    pub dual_token: Option<DualTokenConfig>,
    /// Global error hook.
    pub on_error: Option<ErrorHook>,
    /// Global response mapper.
    pub response_handler: Option<ResponseHandler>,
    /// Business-code side-effect handlers.
    pub code_handlers: HashMap<i64, CodeHandler>,
    /// User request/response middleware.
    pub interceptor: Option<Arc<dyn Interceptor>>,
    /// Download glue for `download_file`.
    pub download_sink: Option<Arc<dyn DownloadSink>>,
}

impl std::fmt::Debug for CourierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CourierConfig")
            .field("max_concurrent", &self.max_concurrent)
            .field("cache", &self.cache)
            .field("coalesce", &self.coalesce)
            .field("retry", &self.retry)
            .field("token_provider", &self.token_provider.is_some())
            .field("dual_token", &self.dual_token.is_some())
            .field("code_handlers", &self.code_handlers.len())
            .finish()
    }
}

impl CourierConfig {
    /// Creates a new [`CourierConfigBuilder`].
    pub fn builder() -> CourierConfigBuilder {
        CourierConfigBuilder::default()
    }
}

/// Builder for [`CourierConfig`].
#[derive(Default)]
pub struct CourierConfigBuilder {
    config: CourierConfig,
}

impl CourierConfigBuilder {
    /// Bounds in-flight operations to `limit`.
    pub fn max_concurrent(mut self, limit: usize) -> Self {
        self.config.max_concurrent = NonZeroUsize::new(limit);
        self
    }

    /// Enables caching with the given policy.
    pub fn cache(mut self, policy: EnabledCachePolicy) -> Self {
        self.config.cache = CachePolicy::Enabled(policy);
        self
    }

    /// Enables caching with the given TTL and default capacity.
    pub fn cache_ttl(self, ttl: Duration) -> Self {
        self.cache(EnabledCachePolicy {
            ttl: Some(ttl),
            ..EnabledCachePolicy::default()
        })
    }

    /// Enables trailing debounce with the given quiescence delay.
    pub fn debounce(mut self, delay: Duration) -> Self {
        self.config.coalesce.debounce = Some(delay);
        self
    }

    /// Enables leading throttle with the given interval.
    pub fn throttle(mut self, interval: Duration) -> Self {
        self.config.coalesce.throttle = Some(interval);
        self
    }

    /// Enables retry: up to `times` re-admissions spaced by `delay`.
    pub fn retry(mut self, times: u32, delay: Duration) -> Self {
        self.config.retry = Some(RetryPolicy { times, delay });
        self
    }

    /// Sets the bearer-token source.
    pub fn token_provider(mut self, provider: impl TokenProvider + 'static) -> Self {
        self.config.token_provider = Some(Arc::new(provider));
        self
    }

    /// Enables dual-token recovery.
    pub fn dual_token(mut self, dual: DualTokenConfig) -> Self {
        self.config.dual_token = Some(dual);
        self
    }

    /// Sets the global error hook.
    pub fn on_error(mut self, hook: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.config.on_error = Some(Arc::new(hook));
        self
    }

    /// Sets the global response mapper.
    pub fn response_handler(
        mut self,
        handler: impl Fn(Response) -> Result<Response> + Send + Sync + 'static,
    ) -> Self {
        self.config.response_handler = Some(Arc::new(handler));
        self
    }

    /// Registers a side-effect handler for one business code.
    pub fn code_handler(
        mut self,
        code: i64,
        handler: impl Fn(&Response) + Send + Sync + 'static,
    ) -> Self {
        self.config.code_handlers.insert(code, Arc::new(handler));
        self
    }

    /// Sets the user middleware.
    pub fn interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.config.interceptor = Some(Arc::new(interceptor));
        self
    }

    /// Sets the download glue.
    pub fn download_sink(mut self, sink: impl DownloadSink + 'static) -> Self {
        self.config.download_sink = Some(Arc::new(sink));
        self
    }

    /// Finalises the configuration.
    pub fn build(self) -> CourierConfig {
        self.config
    }
}
