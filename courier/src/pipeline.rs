//! The request-processing pipeline.
//!
//! Every logical request runs two ordered stage chains around the
//! transport:
//!
//! Request side: bearer injection → cache lookup → debounce → throttle
//! → user request middleware. A cache hit short-circuits onto the
//! *success* path as a synthesised response, so response-side stages
//! observe cached data exactly like live data.
//!
//! Response side: global response mapper → business-code handler under
//! a per-code lock → dual-token expiry recovery → user response
//! middleware → cache write.
//!
//! Cancellations bypass retry and the global error hook; all other
//! failures feed the retry policy, which re-admits the request through
//! the concurrency limiter with a fixed delay.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use courier_core::{
    CachePolicy, CancelKind, Error, Request, RequestKey, Response, Result, Transport,
};

use crate::cache::ResponseCache;
use crate::cancel::CancelRegistry;
use crate::coalescer::Coalescer;
use crate::config::{CourierConfig, DualTokenConfig};
use crate::limiter::ConcurrencyLimiter;
use crate::refresh::RefreshFlight;

/// How long a business-code handler stays locked after firing.
///
/// The lock suppresses re-entrant invocations of the same handler (e.g.
/// a burst of responses all carrying a login-redirect code) within this
/// window; a spawned timer releases it.
const CODE_LOCK_WINDOW: Duration = Duration::from_secs(1);

/// Per-code invocation locks released by timers.
#[derive(Default)]
struct CodeLocks {
    locked: Arc<DashMap<i64, ()>>,
}

impl CodeLocks {
    /// Takes the lock for `code`. Returns false while a prior
    /// invocation's window is still open.
    fn acquire(&self, code: i64) -> bool {
        match self.locked.entry(code) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(());
                let locked = Arc::clone(&self.locked);
                tokio::spawn(async move {
                    tokio::time::sleep(CODE_LOCK_WINDOW).await;
                    locked.remove(&code);
                });
                true
            }
        }
    }
}

/// Outcome of the request-side chain.
enum RequestFlow {
    /// Send through the transport.
    Forward,
    /// Cache hit: continue on the response side with this synthesised
    /// response.
    CacheHit(Response),
}

/// The stage runner and its cooperating managers.
///
/// Cheap to clone; all clones share the same managers.
#[derive(Clone)]
pub(crate) struct Pipeline {
    transport: Arc<dyn Transport>,
    config: Arc<CourierConfig>,
    limiter: ConcurrencyLimiter,
    cache: Option<ResponseCache>,
    coalescer: Arc<Coalescer>,
    cancels: CancelRegistry,
    refresh: Arc<RefreshFlight>,
    code_locks: Arc<CodeLocks>,
}

impl Pipeline {
    pub fn new(transport: Arc<dyn Transport>, config: Arc<CourierConfig>) -> Self {
        let cache = match &config.cache {
            CachePolicy::Enabled(policy) => {
                Some(ResponseCache::new(policy.max_capacity, policy.ttl))
            }
            CachePolicy::Disabled => None,
        };
        Self {
            limiter: ConcurrencyLimiter::new(config.max_concurrent),
            cache,
            coalescer: Arc::new(Coalescer::new()),
            cancels: CancelRegistry::new(),
            refresh: Arc::new(RefreshFlight::new()),
            code_locks: Arc::new(CodeLocks::default()),
            transport,
            config,
        }
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    pub fn cancels(&self) -> &CancelRegistry {
        &self.cancels
    }

    pub fn coalescer(&self) -> &Coalescer {
        &self.coalescer
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    /// Runs one logical request to completion: registration, admission,
    /// both stage chains, retry, and cancel-handle cleanup.
    pub async fn dispatch(&self, request: Request) -> Result<Response> {
        let span = info_span!(
            "request",
            method = %request.method,
            url = %request.url,
            cancel_id = request.cancel_id.as_deref().unwrap_or(""),
        );
        let cancel = CancellationToken::new();
        let registered_id = request.cancel_id.clone();
        if let Some(id) = &registered_id {
            self.cancels.set(id.clone(), cancel.clone());
        }
        let result = self.drive(request, &cancel).instrument(span).await;
        // Settlement removes the registry entry regardless of outcome.
        if let Some(id) = &registered_id {
            self.cancels.delete(id);
        }
        result
    }

    /// The retry loop. Each attempt is re-admitted through the limiter;
    /// cancellations and non-retryable failures exit immediately.
    async fn drive(&self, mut request: Request, cancel: &CancellationToken) -> Result<Response> {
        loop {
            // The race also covers time spent queued for admission.
            let attempt = tokio::select! {
                outcome = self.limiter.run(self.attempt(&mut request, cancel)) => outcome,
                _ = cancel.cancelled() => Err(Error::Cancelled(CancelKind::Manual)),
            };
            let error = match attempt {
                Ok(response) => return Ok(response),
                Err(error) if error.is_cancelled() => return Err(error),
                Err(error) => error,
            };
            if let Some(retry) = self.config.retry
                && error.is_retryable()
                && request.retry_count() < retry.times
            {
                request.mark_retry();
                debug!(
                    attempt = request.retry_count(),
                    max = retry.times,
                    "retrying after failure: {error}"
                );
                tokio::select! {
                    _ = tokio::time::sleep(retry.delay) => continue,
                    _ = cancel.cancelled() => {
                        return Err(Error::Cancelled(CancelKind::Manual));
                    }
                }
            }
            if let Some(on_error) = &self.config.on_error {
                on_error(&error);
            }
            return Err(error);
        }
    }

    /// One admission-scoped attempt: request side, transport, response
    /// side.
    async fn attempt(&self, request: &mut Request, cancel: &CancellationToken) -> Result<Response> {
        let key = RequestKey::of(request);
        let flow = match self.request_side(request, &key).await {
            Ok(flow) => flow,
            Err(error) => {
                if !error.is_cancelled()
                    && let Some(interceptor) = &self.config.interceptor
                {
                    interceptor.on_request_error(&error).await;
                }
                return Err(error);
            }
        };
        let response = match flow {
            RequestFlow::CacheHit(response) => {
                debug!(%key, "cache hit");
                response
            }
            RequestFlow::Forward => self.send_transport(request.clone(), cancel).await?,
        };
        self.response_side(response, &key, request, cancel).await
    }

    /// Request-side chain, in order: bearer injection, cache lookup,
    /// debounce, throttle, user request middleware.
    async fn request_side(&self, request: &mut Request, key: &RequestKey) -> Result<RequestFlow> {
        if let Some(provider) = &self.config.token_provider {
            let token = provider.token().await?;
            request.set_bearer(&token);
        }

        // The key is header-independent, so a hit stays valid across
        // login/logout without per-entry invalidation.
        if let Some(cache) = &self.cache
            && let Some(body) = cache.get(key).await
        {
            return Ok(RequestFlow::CacheHit(Response::from_cached(body)));
        }

        if let Some(delay) = self.config.coalesce.debounce {
            self.coalescer.debounce(key, delay).await?;
        }
        if let Some(interval) = self.config.coalesce.throttle {
            self.coalescer.throttle(key, interval)?;
        }

        if let Some(interceptor) = &self.config.interceptor {
            *request = interceptor.on_request(request.clone()).await?;
        }
        Ok(RequestFlow::Forward)
    }

    /// Sends through the transport, racing the cancel handle. Attaches
    /// the originating descriptor to the response.
    async fn send_transport(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let descriptor = request.clone();
        let response = tokio::select! {
            outcome = self.transport.send(request) => outcome?,
            _ = cancel.cancelled() => {
                debug!("transport call cancelled");
                return Err(Error::Cancelled(CancelKind::Manual));
            }
        };
        Ok(response.with_request(descriptor))
    }

    /// Response-side chain, in order: global response mapper, code
    /// handler under lock, dual-token recovery, user response
    /// middleware, cache write.
    async fn response_side(
        &self,
        response: Response,
        key: &RequestKey,
        request: &mut Request,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let from_cache = response.is_from_cache();
        let mut result = Ok(if response.request.is_none() {
            response.with_request(request.clone())
        } else {
            response
        });

        if let Some(handler) = &self.config.response_handler {
            result = result.and_then(|response| handler(response));
        }

        // Code handling re-inspects the response a refresh retry brings
        // back; the refresh-attempted flag on the descriptor bounds the
        // loop to a single recovery.
        loop {
            let business = match &result {
                Ok(response) => response
                    .business_code()
                    .filter(|&code| code != 0)
                    .map(|code| (code, response.business_message())),
                Err(_) => None,
            };
            let Some((code, message)) = business else { break };

            if let Some(handler) = self.config.code_handlers.get(&code)
                && self.code_locks.acquire(code)
                && let Ok(response) = &result
            {
                debug!(code, "invoking business-code handler");
                handler(response);
            }

            match &self.config.dual_token {
                Some(dual) if dual.refresh_expired_codes.contains(&code) => {
                    warn!(code, "refresh token expired");
                    if let Some(hook) = &dual.on_refresh_expired {
                        hook();
                    }
                    result = Err(Error::RefreshExpired { reason: message });
                    break;
                }
                Some(dual) if dual.access_expired_codes.contains(&code) => {
                    result = self.recover_access(request, dual, cancel).await;
                    if result.is_err() {
                        break;
                    }
                    // Re-sent response: detect again.
                }
                _ => {
                    result = Err(Error::BusinessCode { code, message });
                    break;
                }
            }
        }

        if let Some(interceptor) = &self.config.interceptor {
            result = match result {
                Ok(response) => interceptor.on_response(response).await,
                Err(error) if !error.is_cancelled() => {
                    interceptor.on_response_error(error).await
                }
                Err(cancelled) => Err(cancelled),
            };
        }

        if let Ok(response) = &result
            && !from_cache
            && !response.is_from_cache()
            && let Some(cache) = &self.cache
        {
            let ttl = self.config.cache.enabled().and_then(|policy| policy.ttl);
            cache.set(key.clone(), response.body.clone(), ttl).await;
        }

        result
    }

    /// Access-token recovery: join the single-flight renewal, rewrite
    /// the bearer and re-send via the transport. The re-send skips the
    /// request-side chain so it is neither debounced nor served from
    /// cache.
    async fn recover_access(
        &self,
        request: &mut Request,
        dual: &DualTokenConfig,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        if request.refresh_attempted() {
            warn!("access token still expired after refresh retry");
            return Err(Error::TokenExpired);
        }
        request.mark_refresh_attempted();

        let token = match self.refresh.renew(&dual.refresh_access_token).await {
            Ok(token) => token,
            Err(error) => {
                if let Some(hook) = &dual.on_refresh_expired {
                    hook();
                }
                return Err(error);
            }
        };
        request.set_bearer(&token);
        self.send_transport(request.clone(), cancel).await
    }
}
