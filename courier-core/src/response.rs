//! The response descriptor.

use http::{HeaderMap, StatusCode};

use crate::body::ResponseBody;
use crate::request::Request;

/// A response as seen by response-side middleware and the caller.
///
/// Cache-synthesised responses carry the `from_cache` marker and flow
/// through the same response-side stages as live responses.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Decoded payload, typed by the request's response kind.
    pub body: ResponseBody,
    /// The originating request descriptor, attached by the pipeline.
    pub request: Option<Box<Request>>,
    from_cache: bool,
}

impl Response {
    /// Creates a successful response around a body.
    pub fn new(status: StatusCode, headers: HeaderMap, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            body,
            request: None,
            from_cache: false,
        }
    }

    /// Synthesises a cache-hit response for the given body.
    ///
    /// Status is `200 OK`; the marker distinguishes it from live
    /// responses so the pipeline skips the cache write.
    pub fn from_cached(body: ResponseBody) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body,
            request: None,
            from_cache: true,
        }
    }

    /// Whether this response was synthesised by the cache.
    pub fn is_from_cache(&self) -> bool {
        self.from_cache
    }

    /// Canonical reason phrase for the status code.
    pub fn status_text(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }

    /// Attaches the originating request descriptor.
    pub fn with_request(mut self, request: Request) -> Self {
        self.request = Some(Box::new(request));
        self
    }

    /// The business code carried in a JSON body's `code` field, if any.
    pub fn business_code(&self) -> Option<i64> {
        self.body.as_json()?.get("code")?.as_i64()
    }

    /// The message accompanying a business code, empty when absent.
    pub fn business_message(&self) -> String {
        self.body
            .as_json()
            .and_then(|value| value.get("message"))
            .and_then(|value| value.as_str())
            .unwrap_or_default()
            .to_owned()
    }

    /// Deserialises a JSON body into a concrete type.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match self.body.as_json() {
            Some(value) => serde_json::from_value(value.clone()),
            None => serde_json::from_value(serde_json::Value::Null),
        }
    }
}
