//! User middleware hooks.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;

/// User-supplied middleware with success/failure hooks on both sides of
/// the exchange.
///
/// All methods default to passthrough. Request hooks run after the
/// built-in request-side stages (token injection, cache lookup,
/// debounce, throttle); response hooks run after the built-in
/// response-side stages and before the cache write, so they observe
/// cache-synthesised responses exactly like live ones.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Transforms the outgoing request.
    async fn on_request(&self, request: Request) -> Result<Request> {
        Ok(request)
    }

    /// Observes a request-side failure. The error continues to
    /// propagate afterwards.
    async fn on_request_error(&self, _error: &Error) {}

    /// Transforms the incoming response.
    async fn on_response(&self, response: Response) -> Result<Response> {
        Ok(response)
    }

    /// Handles a response-side failure; may recover by returning a
    /// response.
    async fn on_response_error(&self, error: Error) -> Result<Response> {
        Err(error)
    }
}
