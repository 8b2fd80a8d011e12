//! Shared test fixtures: a scriptable in-memory transport.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};

use courier::{Error, Request, Response, ResponseBody, Result, Transport};

/// Builds a `200 OK` response with a JSON body.
pub fn json_response(value: serde_json::Value) -> Response {
    Response::new(StatusCode::OK, HeaderMap::new(), ResponseBody::Json(value))
}

/// Builds the conventional success envelope `{"code": 0, "data": ...}`.
pub fn ok_envelope(data: serde_json::Value) -> Response {
    json_response(serde_json::json!({"code": 0, "data": data}))
}

type Handler = dyn Fn(u64, &Request) -> Result<Response> + Send + Sync;

/// Scriptable transport recording every request it sees.
pub struct MockTransport {
    handler: Box<Handler>,
    delay: Option<Duration>,
    calls: AtomicU64,
    log: Mutex<Vec<Request>>,
}

impl MockTransport {
    /// A transport driven by `handler(sequence, request)`; the sequence
    /// starts at 0.
    pub fn with_handler(
        handler: impl Fn(u64, &Request) -> Result<Response> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            delay: None,
            calls: AtomicU64::new(0),
            log: Mutex::new(Vec::new()),
        })
    }

    /// Always answers with the same JSON envelope.
    pub fn ok(data: serde_json::Value) -> Arc<Self> {
        Self::with_handler(move |_, _| Ok(ok_envelope(data.clone())))
    }

    /// Always fails with a transport error.
    pub fn failing(message: &'static str) -> Arc<Self> {
        Self::with_handler(move |_, _| Err(Error::transport(message)))
    }

    /// Adds a fixed service delay before each answer.
    pub fn delayed(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        let inner = Arc::try_unwrap(self).unwrap_or_else(|_| panic!("transport already shared"));
        Arc::new(Self {
            delay: Some(delay),
            ..inner
        })
    }

    /// Number of `send` calls observed.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Clones of every request seen, in arrival order.
    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().unwrap().clone()
    }

    /// The bearer tokens seen, in arrival order.
    pub fn bearer_tokens(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|request| {
                request
                    .headers
                    .get(http::header::AUTHORIZATION)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_owned)
            })
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let seq = self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(seq, &request)
    }
}
