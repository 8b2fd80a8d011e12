#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Named cancellation handles.
///
/// [`CancelRegistry`](cancel::CancelRegistry) maps caller-supplied ids
/// to in-flight cancellation tokens; cancelling by id aborts the
/// transport call and any pending retry delay.
pub mod cancel;

/// The facade and per-call options.
pub mod client;

/// Per-key debounce and throttle.
///
/// Only the latest intent for a request key survives the debounce
/// window; superseded callers observe a first-class Cancelled outcome.
pub mod coalescer;

/// Facade configuration and callback slots.
pub mod config;

/// Named-instance registry.
pub mod factory;

/// Global FIFO concurrency admission.
pub mod limiter;

/// The request-processing pipeline: ordered request/response stage
/// chains around the transport, with cache-hit short-circuiting, token
/// recovery and retry.
mod pipeline;

/// Named periodic request tasks.
pub mod polling;

/// Single-flight access-token renewal.
mod refresh;

/// Chunked, resumable, content-addressed uploads.
pub mod upload;

mod cache;

pub use cancel::CancelRegistry;
pub use client::{CallOptions, Courier};
pub use config::{
    CodeHandler, CourierConfig, CourierConfigBuilder, DownloadSink, DualTokenConfig, ErrorHook,
    RefreshExpiredHook, ResponseHandler,
};
pub use factory::CourierRegistry;
pub use limiter::ConcurrencyLimiter;
pub use polling::{PollingConfig, PollSuccessHook, PollErrorHook};
pub use upload::{
    BytesSource, ChunkProgressHook, ChunkSource, DEFAULT_CHUNK_SIZE, FileSource,
    OverallProgressHook, UploadOptions, UploadOutcome,
};

pub use courier_core::{
    Body, CachePolicy, CancelKind, CoalescePolicy, EnabledCachePolicy, Error, FormPart,
    Interceptor, MultipartForm, Params, ProgressHandler, RefreshFn, Request, RequestKey, Response,
    ResponseBody, ResponseKind, Result, RetryPolicy, TokenProvider, Transport,
};
