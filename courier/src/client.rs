//! The facade.
//!
//! [`Courier`] binds a configuration to a transport and exposes the
//! request, upload, download, polling, cancellation and cache
//! operations. It is cheap to clone; all clones share the same
//! managers.

use std::sync::Arc;

use http::Method;
use smol_str::SmolStr;
use tracing::debug;

use courier_core::{
    Body, Params, Request, RequestKey, Response, ResponseKind, Result, Transport,
};

use crate::config::CourierConfig;
use crate::pipeline::Pipeline;
use crate::polling::{PollingConfig, PollingScheduler};
use crate::upload::{ChunkSource, UploadCoordinator, UploadOptions, UploadOutcome};

/// Per-call overrides for the verb helpers.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Named cancellation handle id.
    pub cancel_id: Option<SmolStr>,
    /// Extra headers merged into the request.
    pub headers: http::HeaderMap,
    /// Query parameters.
    pub params: Params,
    /// Response decoding override.
    pub response_kind: Option<ResponseKind>,
}

impl CallOptions {
    fn apply(self, mut request: Request) -> Request {
        for (name, value) in self.headers.iter() {
            request.headers.insert(name.clone(), value.clone());
        }
        request.params.extend(self.params);
        if let Some(kind) = self.response_kind {
            request.response_kind = kind;
        }
        request.cancel_id = self.cancel_id;
        request
    }
}

struct CourierInner {
    pipeline: Pipeline,
    uploads: UploadCoordinator,
    polling: PollingScheduler,
}

/// A configured request orchestration client.
#[derive(Clone)]
pub struct Courier {
    inner: Arc<CourierInner>,
}

impl Courier {
    /// Binds `config` to `transport`.
    pub fn new(transport: Arc<dyn Transport>, config: CourierConfig) -> Self {
        let config = Arc::new(config);
        let pipeline = Pipeline::new(Arc::clone(&transport), Arc::clone(&config));
        let uploads = UploadCoordinator::new(
            transport,
            config,
            pipeline.limiter().clone(),
            pipeline.cancels().clone(),
        );
        let polling = PollingScheduler::new(pipeline.clone());
        Self {
            inner: Arc::new(CourierInner {
                pipeline,
                uploads,
                polling,
            }),
        }
    }

    /// Dispatches a fully-shaped request through the pipeline.
    pub async fn request(&self, request: Request) -> Result<Response> {
        self.inner.pipeline.dispatch(request).await
    }

    /// GET helper.
    pub async fn get(&self, url: &str, options: CallOptions) -> Result<Response> {
        self.request(options.apply(Request::get(url))).await
    }

    /// POST helper.
    pub async fn post(
        &self,
        url: &str,
        body: Option<Body>,
        options: CallOptions,
    ) -> Result<Response> {
        let mut request = Request::post(url);
        request.body = body;
        self.request(options.apply(request)).await
    }

    /// PUT helper.
    pub async fn put(
        &self,
        url: &str,
        body: Option<Body>,
        options: CallOptions,
    ) -> Result<Response> {
        let mut request = Request::put(url);
        request.body = body;
        self.request(options.apply(request)).await
    }

    /// DELETE helper.
    pub async fn delete(&self, url: &str, options: CallOptions) -> Result<Response> {
        self.request(options.apply(Request::delete(url))).await
    }

    /// Uploads a file in resumable chunks.
    pub async fn upload_file(
        &self,
        url: &str,
        source: Arc<dyn ChunkSource>,
        options: UploadOptions,
    ) -> Result<UploadOutcome> {
        self.inner.uploads.upload(url, source, options).await
    }

    /// Fetches a binary response and hands it to the configured
    /// download sink. The filename falls back to the URL's last path
    /// segment.
    pub async fn download_file(
        &self,
        url: &str,
        method: Option<Method>,
        filename: Option<&str>,
        options: CallOptions,
    ) -> Result<Response> {
        let request = options
            .apply(Request::new(method.unwrap_or(Method::GET), url))
            .response_kind(ResponseKind::Bytes);
        let response = self.request(request).await?;
        if let Some(sink) = &self.inner.pipeline.config().download_sink
            && let Some(data) = response.body.as_bytes()
        {
            let name = filename
                .map(str::to_owned)
                .unwrap_or_else(|| filename_from_url(url));
            debug!(%name, bytes = data.len(), "handing download to sink");
            sink.save(&name, data);
        }
        Ok(response)
    }

    /// Starts (or restarts) a named polling task.
    pub fn start_polling(&self, config: PollingConfig) {
        self.inner.polling.start(config);
    }

    /// Stops a named polling task. Returns whether it existed.
    pub fn stop_polling(&self, key: &str) -> bool {
        self.inner.polling.stop(key)
    }

    /// Cancels the in-flight request registered under `id`.
    pub fn cancel_request(&self, id: &str) -> bool {
        self.inner.pipeline.cancels().cancel_by_id(id)
    }

    /// Cancels every registered request.
    pub fn cancel_all_requests(&self) {
        self.inner.pipeline.cancels().cancel_all();
    }

    /// Empties the response cache.
    pub fn clear_cache(&self) {
        if let Some(cache) = self.inner.pipeline.cache() {
            cache.clear();
        }
    }

    /// Removes the single cache entry for this request shape.
    pub async fn invalidate(&self, request: &Request) {
        if let Some(cache) = self.inner.pipeline.cache() {
            cache.invalidate(&RequestKey::of(request)).await;
        }
    }

    /// Full shutdown: pending debounces are rejected with
    /// `manager-cleared`, in-flight requests are cancelled, polling
    /// tasks stop.
    pub fn shutdown(&self) {
        self.inner.pipeline.coalescer().clear();
        self.inner.pipeline.cancels().cancel_all();
        self.inner.polling.stop_all();
    }

    /// Registered cancel handles (settled requests are removed).
    pub fn pending_cancel_handles(&self) -> usize {
        self.inner.pipeline.cancels().len()
    }
}

fn filename_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or("download")
        .to_owned()
}
