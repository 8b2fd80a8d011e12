//! Named periodic request tasks.
//!
//! Each polling task repeatedly dispatches a request through the full
//! pipeline (and therefore through concurrency admission). The next
//! iteration is scheduled `interval` after the previous one *settles*,
//! not after it starts; the stopped flag is checked before scheduling,
//! so a stopped task never fires again.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use smol_str::SmolStr;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span};

use courier_core::{Error, Request, Response};

use crate::pipeline::Pipeline;

/// Success callback for one polling iteration.
pub type PollSuccessHook = Arc<dyn Fn(Response) + Send + Sync>;

/// Error callback for one polling iteration.
pub type PollErrorHook = Arc<dyn Fn(&Error) + Send + Sync>;

/// Description of a named periodic task.
#[derive(Clone)]
pub struct PollingConfig {
    /// Caller-chosen identifier; starting a task under an existing key
    /// stops the old task first.
    pub key: SmolStr,
    /// The request dispatched each iteration.
    pub request: Request,
    /// Delay between one iteration settling and the next starting.
    pub interval: Duration,
    /// Total invocation bound. `None` polls until stopped.
    pub max_polling_times: Option<u32>,
    /// Invoked when an iteration resolves.
    pub on_success: Option<PollSuccessHook>,
    /// Invoked when an iteration fails.
    pub on_error: Option<PollErrorHook>,
}

impl PollingConfig {
    /// Creates a config polling `request` every `interval` until
    /// stopped.
    pub fn new(key: impl Into<SmolStr>, request: Request, interval: Duration) -> Self {
        Self {
            key: key.into(),
            request,
            interval,
            max_polling_times: None,
            on_success: None,
            on_error: None,
        }
    }

    /// Bounds the total number of invocations.
    pub fn max_polling_times(mut self, times: u32) -> Self {
        self.max_polling_times = Some(times);
        self
    }

    /// Sets the per-iteration success callback.
    pub fn on_success(mut self, hook: impl Fn(Response) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(hook));
        self
    }

    /// Sets the per-iteration error callback.
    pub fn on_error(mut self, hook: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }
}

struct PollTask {
    generation: u64,
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

/// Registry and runner of polling tasks. At most one live task per key.
#[derive(Clone)]
pub(crate) struct PollingScheduler {
    pipeline: Pipeline,
    tasks: Arc<DashMap<SmolStr, PollTask>>,
    generation: Arc<AtomicU64>,
}

impl PollingScheduler {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            tasks: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Starts a task, stopping any existing task under the same key.
    pub fn start(&self, config: PollingConfig) {
        self.stop(&config.key);

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let stop = CancellationToken::new();
        let key = config.key.clone();
        let span = info_span!("polling", key = %key);

        let pipeline = self.pipeline.clone();
        let tasks = Arc::clone(&self.tasks);
        let task_stop = stop.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(
            async move {
                let mut invocations = 0u32;
                loop {
                    let outcome = tokio::select! {
                        outcome = pipeline.dispatch(config.request.clone()) => outcome,
                        _ = task_stop.cancelled() => break,
                    };
                    if task_stop.is_cancelled() {
                        break;
                    }
                    match outcome {
                        Ok(response) => {
                            if let Some(hook) = &config.on_success {
                                hook(response);
                            }
                        }
                        Err(error) => {
                            if let Some(hook) = &config.on_error {
                                hook(&error);
                            }
                        }
                    }
                    invocations += 1;
                    if let Some(max) = config.max_polling_times
                        && invocations >= max
                    {
                        debug!(invocations, "polling bound reached");
                        break;
                    }
                    // Stopped flag wins over the pending timer.
                    tokio::select! {
                        _ = tokio::time::sleep(config.interval) => {}
                        _ = task_stop.cancelled() => break,
                    }
                }
                // Self-removal on natural exit; a replacement task under
                // the same key has a newer generation and is left alone.
                tasks.remove_if(&task_key, |_, task| task.generation == generation);
            }
            .instrument(span),
        );

        self.tasks.insert(
            key,
            PollTask {
                generation,
                stop,
                handle,
            },
        );
    }

    /// Stops and removes the task under `key`. Idempotent. After this
    /// returns the task invokes no further callbacks.
    pub fn stop(&self, key: &str) -> bool {
        match self.tasks.remove(key) {
            Some((_, task)) => {
                debug!(key, "stopping polling task");
                task.stop.cancel();
                task.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Stops every task.
    pub fn stop_all(&self) {
        let keys: Vec<SmolStr> = self.tasks.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.stop(&key);
        }
    }
}
