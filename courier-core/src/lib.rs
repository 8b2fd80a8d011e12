#![warn(missing_docs)]
//! # courier-core
//!
//! Core descriptors and contracts for the Courier request orchestration
//! library.
//!
//! This crate defines the vocabulary shared by the orchestrator
//! (`courier`) and transport adapters (`courier-reqwest`):
//!
//! - **Describe** logical requests and responses ([`Request`],
//!   [`Response`], [`Body`], [`ResponseBody`])
//! - **Fingerprint** them canonically ([`RequestKey`])
//! - **Classify** failures ([`Error`], [`CancelKind`])
//! - **Bridge** to the network ([`Transport`])
//! - **Acquire** credentials ([`TokenProvider`], [`RefreshFn`])
//! - **Hook** user middleware ([`Interceptor`])
//! - **Configure** behavior with plain data ([`policy`])

pub mod body;
pub mod error;
pub mod interceptor;
pub mod key;
pub mod policy;
pub mod request;
pub mod response;
pub mod token;
pub mod transport;

pub use body::{Body, FormPart, MultipartForm, ResponseBody, ResponseKind};
pub use error::{CancelKind, Error, Result};
pub use interceptor::Interceptor;
pub use key::RequestKey;
pub use policy::{CachePolicy, CoalescePolicy, ConcurrencyLimit, EnabledCachePolicy, RetryPolicy};
pub use request::{Params, ProgressHandler, Request};
pub use response::Response;
pub use token::{RefreshFn, TokenProvider};
pub use transport::Transport;
