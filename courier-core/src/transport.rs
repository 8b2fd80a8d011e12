//! The transport seam.
//!
//! The orchestration core never talks to the network itself; it hands
//! fully-shaped [`Request`]s to a [`Transport`] and interprets the
//! [`Response`]s that come back. Adapter crates (e.g. `courier-reqwest`)
//! bind this trait to a concrete HTTP client.

use async_trait::async_trait;

use crate::error::Result;
use crate::request::Request;
use crate::response::Response;

/// An async HTTP transport.
///
/// Implementations must honour the request's `response_kind` when
/// decoding the body and should invoke `upload_progress` while streaming
/// request payloads. Cancellation is cooperative: the pipeline drops the
/// returned future when the call is cancelled, so implementations must
/// be drop-safe mid-flight.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one request and decodes the response.
    async fn send(&self, request: Request) -> Result<Response>;
}
