//! The logical request descriptor.

use std::collections::BTreeMap;
use std::sync::Arc;

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use smol_str::SmolStr;

use crate::body::{Body, ResponseKind};

/// Per-chunk byte progress callback: `(bytes_sent, total_bytes)`.
///
/// Invoked by transports that support streamed upload progress.
pub type ProgressHandler = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Query parameters with unique, order-insensitive keys.
pub type Params = BTreeMap<String, serde_json::Value>;

/// A logical request, created per call and destroyed when the pipeline
/// settles.
///
/// The descriptor carries two pipeline-owned fields: the retry attempt
/// counter and the refresh-attempted flag. Both are crate-external
/// read-only; the pipeline mutates them as the request moves through
/// retry and token recovery.
#[derive(Clone)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Target URL.
    pub url: String,
    /// Query parameters. Key order never affects the request key.
    pub params: Params,
    /// Optional payload.
    pub body: Option<Body>,
    /// Header mapping; names are case-insensitive.
    pub headers: HeaderMap,
    /// How the response body should be decoded.
    pub response_kind: ResponseKind,
    /// Cancellation handle id, when the caller wants named cancellation.
    pub cancel_id: Option<SmolStr>,
    /// Streamed upload progress callback, when the transport supports it.
    pub upload_progress: Option<ProgressHandler>,
    retry_count: u32,
    refresh_attempted: bool,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("params", &self.params)
            .field("body", &self.body)
            .field("headers", &self.headers)
            .field("response_kind", &self.response_kind)
            .field("cancel_id", &self.cancel_id)
            .field("retry_count", &self.retry_count)
            .field("refresh_attempted", &self.refresh_attempted)
            .finish()
    }
}

impl Request {
    /// Creates a request with the given method and URL.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: Params::new(),
            body: None,
            headers: HeaderMap::new(),
            response_kind: ResponseKind::default(),
            cancel_id: None,
            upload_progress: None,
            retry_count: 0,
            refresh_attempted: false,
        }
    }

    /// Shorthand for a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Shorthand for a POST request.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Shorthand for a PUT request.
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    /// Shorthand for a DELETE request.
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Sets the payload.
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Adds a query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Adds a header. Invalid names or values are ignored.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name),
            HeaderValue::try_from(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Sets the response decoding hint.
    pub fn response_kind(mut self, kind: ResponseKind) -> Self {
        self.response_kind = kind;
        self
    }

    /// Associates the request with a named cancellation handle.
    pub fn cancel_id(mut self, id: impl Into<SmolStr>) -> Self {
        self.cancel_id = Some(id.into());
        self
    }

    /// Sets the streamed upload progress callback.
    pub fn upload_progress(mut self, handler: ProgressHandler) -> Self {
        self.upload_progress = Some(handler);
        self
    }

    /// Retry attempts performed so far (0 on the first attempt).
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Whether a post-refresh retry was already performed.
    pub fn refresh_attempted(&self) -> bool {
        self.refresh_attempted
    }

    /// Records one more retry attempt. Pipeline-owned.
    pub fn mark_retry(&mut self) {
        self.retry_count += 1;
    }

    /// Records that a post-refresh retry happened. Pipeline-owned.
    pub fn mark_refresh_attempted(&mut self) {
        self.refresh_attempted = true;
    }

    /// Replaces the bearer token in the `Authorization` header.
    pub fn set_bearer(&mut self, token: &str) {
        if let Ok(value) = HeaderValue::try_from(format!("Bearer {token}")) {
            self.headers.insert(http::header::AUTHORIZATION, value);
        }
    }
}
