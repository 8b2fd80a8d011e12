//! Chunked, resumable, content-addressed uploads.
//!
//! An upload fingerprints the whole file off-thread, asks the server
//! which chunks it already holds (resume discovery), then uploads the
//! remaining chunks as multipart forms in bounded parallel — every
//! chunk attempt is admitted through the shared concurrency limiter, so
//! one file cannot monopolise the slot budget. A single cancel handle
//! covers all chunks of a file.

pub mod fingerprint;
pub mod source;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use smol_str::SmolStr;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use courier_core::{
    CancelKind, Error, MultipartForm, Request, Response, ResponseKind, Result, Transport,
};

use crate::cancel::CancelRegistry;
use crate::config::CourierConfig;
use crate::limiter::ConcurrencyLimiter;

pub use source::{BytesSource, ChunkSource, FileSource};

/// Default chunk size: 5 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Per-chunk byte progress: `(chunk_index, bytes_sent, chunk_len)`.
pub type ChunkProgressHook = Arc<dyn Fn(u64, u64, u64) + Send + Sync>;

/// Overall progress: `(finished_chunks, total_chunks)`. Incremented
/// only after the server acknowledges a chunk.
pub type OverallProgressHook = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Per-upload options.
#[derive(Clone)]
pub struct UploadOptions {
    /// Chunk size in bytes.
    pub chunk_size: u64,
    /// Query the server for already-acknowledged chunks before
    /// uploading.
    pub enable_resume: bool,
    /// Attach a per-chunk md5 alongside the file fingerprint.
    pub compute_chunk_hash: bool,
    /// Endpoint answering `GET ?fileMd5=<hex>` with `{"uploaded": [..]}`.
    pub resume_query_url: Option<String>,
    /// Cancel handle id covering every chunk of this upload.
    pub cancel_id: Option<SmolStr>,
    /// Per-chunk byte progress callback.
    pub on_chunk_progress: Option<ChunkProgressHook>,
    /// Overall finished-chunk callback.
    pub on_overall_progress: Option<OverallProgressHook>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            enable_resume: false,
            compute_chunk_hash: false,
            resume_query_url: None,
            cancel_id: None,
            on_chunk_progress: None,
            on_overall_progress: None,
        }
    }
}

/// Result of a completed upload. Merge notification is the caller's
/// concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Hex md5 of the whole file.
    pub file_md5: String,
    /// Number of chunks the file was split into.
    pub total_chunks: u64,
}

#[derive(Debug, Deserialize)]
struct ResumeAnswer {
    #[serde(default)]
    uploaded: Vec<u64>,
}

/// Runs chunked uploads against the shared transport and limiter.
#[derive(Clone)]
pub(crate) struct UploadCoordinator {
    transport: Arc<dyn Transport>,
    config: Arc<CourierConfig>,
    limiter: ConcurrencyLimiter,
    cancels: CancelRegistry,
}

impl UploadCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: Arc<CourierConfig>,
        limiter: ConcurrencyLimiter,
        cancels: CancelRegistry,
    ) -> Self {
        Self {
            transport,
            config,
            limiter,
            cancels,
        }
    }

    /// Uploads one file. See the module docs for the stages.
    pub async fn upload(
        &self,
        url: &str,
        source: Arc<dyn ChunkSource>,
        options: UploadOptions,
    ) -> Result<UploadOutcome> {
        let span = info_span!("upload", url, chunk_size = options.chunk_size);
        let cancel = CancellationToken::new();
        let registered_id = options.cancel_id.clone();
        if let Some(id) = &registered_id {
            self.cancels.set(id.clone(), cancel.clone());
        }
        let result = self
            .run(url, source, &options, &cancel)
            .instrument(span)
            .await;
        if let Some(id) = &registered_id {
            self.cancels.delete(id);
        }
        result
    }

    async fn run(
        &self,
        url: &str,
        source: Arc<dyn ChunkSource>,
        options: &UploadOptions,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome> {
        if options.chunk_size == 0 {
            return Err(Error::Config("upload chunk size must be positive".into()));
        }

        let len = {
            let source = Arc::clone(&source);
            tokio::task::spawn_blocking(move || source.len())
                .await
                .map_err(|join| Error::Io(std::io::Error::other(join)))??
        };
        let total_chunks = len.div_ceil(options.chunk_size);

        let file_md5 = tokio::select! {
            digest = fingerprint::file_digest(Arc::clone(&source), options.chunk_size) => digest?,
            _ = cancel.cancelled() => return Err(Error::Cancelled(CancelKind::Manual)),
        };

        if total_chunks == 0 {
            return Ok(UploadOutcome {
                file_md5,
                total_chunks,
            });
        }

        let acknowledged = if options.enable_resume
            && let Some(query_url) = &options.resume_query_url
        {
            self.discover_uploaded(query_url, &file_md5, cancel).await
        } else {
            HashSet::new()
        };

        let finished = AtomicU64::new(acknowledged.len() as u64);
        if let Some(hook) = &options.on_overall_progress {
            hook(finished.load(Ordering::SeqCst), total_chunks);
        }

        let pending: Vec<u64> = (0..total_chunks)
            .filter(|index| !acknowledged.contains(index))
            .collect();
        debug!(
            total_chunks,
            resumed = acknowledged.len(),
            pending = pending.len(),
            "upload plan ready"
        );

        // try_join_all drops sibling futures on the first terminal
        // failure, aborting their in-flight transport calls.
        futures::future::try_join_all(pending.iter().map(|&index| {
            self.upload_chunk(
                url,
                Arc::clone(&source),
                index,
                total_chunks,
                len,
                &file_md5,
                options,
                cancel,
                &finished,
            )
        }))
        .await?;

        Ok(UploadOutcome {
            file_md5,
            total_chunks,
        })
    }

    /// Resume discovery. Failures degrade to a full upload.
    async fn discover_uploaded(
        &self,
        query_url: &str,
        file_md5: &str,
        cancel: &CancellationToken,
    ) -> HashSet<u64> {
        let mut request = Request::get(query_url)
            .param("fileMd5", file_md5)
            .response_kind(ResponseKind::Json);
        if let Err(error) = self.inject_bearer(&mut request).await {
            warn!("resume query skipped, token unavailable: {error}");
            return HashSet::new();
        }
        let outcome = tokio::select! {
            outcome = self.transport.send(request) => outcome,
            _ = cancel.cancelled() => return HashSet::new(),
        };
        match outcome.and_then(|response| {
            response
                .json::<ResumeAnswer>()
                .map_err(|e| Error::transport(format!("malformed resume answer: {e}")))
        }) {
            Ok(answer) => answer.uploaded.into_iter().collect(),
            Err(error) => {
                warn!("resume query failed, uploading all chunks: {error}");
                HashSet::new()
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn upload_chunk(
        &self,
        url: &str,
        source: Arc<dyn ChunkSource>,
        index: u64,
        total_chunks: u64,
        len: u64,
        file_md5: &str,
        options: &UploadOptions,
        cancel: &CancellationToken,
        finished: &AtomicU64,
    ) -> Result<()> {
        let retry = self.config.retry;
        let mut attempts = 0u32;
        loop {
            let outcome = self
                .try_chunk(url, &source, index, total_chunks, len, file_md5, options, cancel)
                .await;
            let error = match outcome {
                Ok(()) => {
                    let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(hook) = &options.on_overall_progress {
                        hook(done, total_chunks);
                    }
                    return Ok(());
                }
                Err(error) if error.is_cancelled() => return Err(error),
                Err(error) => error,
            };
            if let Some(retry) = retry
                && error.is_retryable()
                && attempts < retry.times
            {
                attempts += 1;
                debug!(index, attempts, "retrying chunk after failure: {error}");
                tokio::select! {
                    _ = tokio::time::sleep(retry.delay) => continue,
                    _ = cancel.cancelled() => {
                        return Err(Error::Cancelled(CancelKind::Manual));
                    }
                }
            }
            warn!(index, "chunk failed terminally: {error}");
            return Err(error);
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn try_chunk(
        &self,
        url: &str,
        source: &Arc<dyn ChunkSource>,
        index: u64,
        total_chunks: u64,
        len: u64,
        file_md5: &str,
        options: &UploadOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let offset = index * options.chunk_size;
        let take = options.chunk_size.min(len - offset) as usize;
        let compute_chunk_hash = options.compute_chunk_hash;

        let (data, chunk_md5) = {
            let source = Arc::clone(source);
            tokio::task::spawn_blocking(move || -> Result<_> {
                let data = source.read_chunk(offset, take)?;
                let chunk_md5 = compute_chunk_hash.then(|| courier_core::key::hex_digest(&data));
                Ok((data, chunk_md5))
            })
            .await
            .map_err(|join| Error::Io(std::io::Error::other(join)))??
        };
        let chunk_len = data.len() as u64;

        let filename = source
            .name()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("chunk-{index}"));
        let mut form = MultipartForm::new()
            .blob("file", data, Some(filename))
            .text("chunkIndex", index.to_string())
            .text("totalChunks", total_chunks.to_string())
            .text("fileMd5", file_md5);
        if let Some(chunk_md5) = chunk_md5 {
            form = form.text("chunkMd5", chunk_md5);
        }

        let mut request = Request::post(url)
            .body(form)
            .response_kind(ResponseKind::Json);
        self.inject_bearer(&mut request).await?;
        if let Some(hook) = &options.on_chunk_progress {
            let hook = Arc::clone(hook);
            request = request
                .upload_progress(Arc::new(move |sent, _total| hook(index, sent, chunk_len)));
        }

        let response = self
            .limiter
            .run(async {
                tokio::select! {
                    outcome = self.transport.send(request) => outcome,
                    _ = cancel.cancelled() => Err(Error::Cancelled(CancelKind::Manual)),
                }
            })
            .await?;
        Self::check_ack(&response, index)
    }

    /// A chunk counts as acknowledged only when the server answered
    /// without a failing business code.
    fn check_ack(response: &Response, index: u64) -> Result<()> {
        match response.business_code() {
            Some(code) if code != 0 => Err(Error::BusinessCode {
                code,
                message: response.business_message(),
            }),
            _ => {
                debug!(index, "chunk acknowledged");
                Ok(())
            }
        }
    }

    async fn inject_bearer(&self, request: &mut Request) -> Result<()> {
        if let Some(provider) = &self.config.token_provider {
            let token = provider.token().await?;
            request.set_bearer(&token);
        }
        Ok(())
    }
}
