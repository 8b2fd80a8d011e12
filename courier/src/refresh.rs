//! Single-flight access-token renewal.
//!
//! Concurrent requests that observe an access-expired code while a
//! renewal is already running attach to the same ticket and share its
//! outcome. The ticket is stored *before* the renewal starts (the
//! shared future is lazy, so late observers cannot race a second
//! renewal into existence) and cleared on settlement, so the next
//! expiry observed after settlement starts a fresh ticket.

use std::sync::Mutex;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{debug, warn};

use courier_core::{Error, RefreshFn, Result};

/// Cloneable renewal failure carried inside the shared ticket.
#[derive(Debug, Clone)]
enum RenewalFailure {
    /// The refresh function is misconfigured (empty token, config error).
    Config(String),
    /// The renewal itself failed; the session is over.
    Terminal(String),
}

impl RenewalFailure {
    fn into_error(self) -> Error {
        match self {
            RenewalFailure::Config(message) => Error::Config(message),
            RenewalFailure::Terminal(reason) => Error::RefreshExpired { reason },
        }
    }
}

type Ticket = Shared<BoxFuture<'static, Result<String, RenewalFailure>>>;

/// Owner of the optional in-flight renewal ticket.
#[derive(Default)]
pub(crate) struct RefreshFlight {
    ticket: Mutex<Option<Ticket>>,
}

impl RefreshFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the in-flight renewal, starting one if none exists.
    ///
    /// Resolves to the new access token. Failures are terminal for the
    /// session; the caller runs the refresh-expired side effect.
    pub async fn renew(&self, refresh: &RefreshFn) -> Result<String> {
        let ticket = {
            let mut slot = self.ticket.lock().expect("refresh flight lock");
            match slot.as_ref() {
                Some(existing) => {
                    debug!("attaching to in-flight token renewal");
                    existing.clone()
                }
                None => {
                    let renewal = (refresh)();
                    let ticket: Ticket = async move {
                        match renewal.await {
                            Ok(token) if token.is_empty() => Err(RenewalFailure::Config(
                                "refresh function returned an empty token".into(),
                            )),
                            Ok(token) => Ok(token),
                            Err(Error::Config(message)) => Err(RenewalFailure::Config(message)),
                            Err(other) => Err(RenewalFailure::Terminal(other.to_string())),
                        }
                    }
                    .boxed()
                    .shared();
                    *slot = Some(ticket.clone());
                    ticket
                }
            }
        };

        let outcome = ticket.clone().await;

        // Clear the stored ticket before returning, but only if it is
        // still ours; a later renewal may already occupy the slot.
        {
            let mut slot = self.ticket.lock().expect("refresh flight lock");
            if slot.as_ref().is_some_and(|current| current.ptr_eq(&ticket)) {
                *slot = None;
            }
        }

        match outcome {
            Ok(token) => Ok(token),
            Err(failure) => {
                warn!("token renewal failed: {failure:?}");
                Err(failure.into_error())
            }
        }
    }

    /// Whether a renewal is currently outstanding.
    #[cfg(test)]
    pub fn in_flight(&self) -> bool {
        self.ticket.lock().expect("refresh flight lock").is_some()
    }
}
