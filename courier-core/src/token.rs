//! Token acquisition contracts.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::Result;

/// Supplies the bearer token injected into outgoing requests.
///
/// Token storage is an external concern; the pipeline only asks for the
/// current token at send time, so login/logout take effect without
/// touching cached responses.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// The current access token, or an error when none is available.
    async fn token(&self) -> Result<String>;
}

#[async_trait]
impl<F> TokenProvider for F
where
    F: Fn() -> Result<String> + Send + Sync,
{
    async fn token(&self) -> Result<String> {
        (self)()
    }
}

/// Renews the access token in dual-token mode.
///
/// Must resolve to a non-empty access token; the refresh controller
/// treats an empty string as a configuration failure.
pub type RefreshFn = Arc<dyn Fn() -> BoxFuture<'static, Result<String>> + Send + Sync>;
