//! Error types for request orchestration.
//!
//! The taxonomy separates *intentional abandonment* ([`Error::Cancelled`])
//! from genuine failures. Pipeline stages match on variants: cancellations
//! bypass retry and the global error hook, transport failures feed the retry
//! policy, token-expiry variants are consumed by the refresh controller.

use http::StatusCode;
use thiserror::Error;

/// Why a call was intentionally abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelKind {
    /// Superseded by a newer call with the same request key before the
    /// debounce delay elapsed.
    Debounce,
    /// Rejected because the per-key throttle interval had not elapsed.
    Throttle,
    /// Cancelled through the registry (`cancel_request` / `cancel_all`).
    Manual,
    /// The coalescer was shut down while the call was pending.
    ManagerCleared,
}

impl CancelKind {
    /// Stable lowercase label, used in error messages and tracing fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelKind::Debounce => "debounce",
            CancelKind::Throttle => "throttle",
            CancelKind::Manual => "manual",
            CancelKind::ManagerCleared => "manager-cleared",
        }
    }
}

impl std::fmt::Display for CancelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for all orchestrated operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The call was intentionally abandoned. Never retried, never reported
    /// to the global error hook.
    #[error("request cancelled ({0})")]
    Cancelled(CancelKind),

    /// The transport failed to produce a usable response.
    #[error("transport error: {message}")]
    Transport {
        /// Human-readable description from the transport.
        message: String,
        /// HTTP status, when the failure carries one.
        status: Option<StatusCode>,
    },

    /// The access token expired and a retry after refresh was already
    /// attempted for this request.
    #[error("access token expired after refresh retry")]
    TokenExpired,

    /// The refresh token itself expired, or renewal failed. Terminal.
    #[error("refresh token expired: {reason}")]
    RefreshExpired {
        /// What ended the session.
        reason: String,
    },

    /// The response carried an unhandled business code.
    #[error("business code {code}: {message}")]
    BusinessCode {
        /// Code extracted from the response body.
        code: i64,
        /// Message accompanying the code, empty when absent.
        message: String,
    },

    /// Invalid or missing configuration (e.g. dual-token mode without a
    /// refresh function). Terminal, never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Local I/O failure while reading an upload source.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a transport failure without a status code.
    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            message: message.into(),
            status: None,
        }
    }

    /// Shorthand for a transport failure carrying an HTTP status.
    pub fn transport_status(message: impl Into<String>, status: StatusCode) -> Self {
        Error::Transport {
            message: message.into(),
            status: Some(status),
        }
    }

    /// Whether this error is an intentional cancellation.
    ///
    /// Cancellations short-circuit retry and the global error hook.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }

    /// The cancellation kind, if this is a cancellation.
    pub fn cancel_kind(&self) -> Option<CancelKind> {
        match self {
            Error::Cancelled(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Whether the retry policy may re-admit a request that failed with
    /// this error. Cancellations, business codes and terminal
    /// conditions are excluded.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport { .. } | Error::Io(_))
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T, E = Error> = std::result::Result<T, E>;
