//! Requests and their lifecycle.
//!
//! A [`RequestConfig`] is the immutable description built by a
//! [`RequestBuilder`]. Once submitted it is wrapped in a [`Request`], which adds
//! the runtime state the dispatcher races on:
//!
//! ```text
//! pending ──start──> running ──deliver──> delivered ──> finished
//!    │                  │
//!    └──────cancel──────┴──> cancelled (delivers the cancellation error)
//! ```
//!
//! All delivery paths go through one check-and-set of the `delivered` flag
//! under the request's state lock, so a request's handler runs at most once no
//! matter how cancels and completions interleave. Callbacks are posted to the
//! request's executor override, or else the client's delivery executor.
//!
//! # Module Organization
//!
//! ```text
//! request/
//! ├── mod     - Request runtime state, RequestHandle
//! ├── builder - RequestBuilder and RequestConfig
//! └── body    - URL, header and body encoding for the transport
//! ```

pub(crate) mod body;
mod builder;

pub use builder::{RawBody, RequestBuilder, RequestConfig};

use crate::dispatch::RequestQueue;
use crate::error::RequestError;
use crate::executor::Executor;
use crate::response::Response;
use crate::transport::ProgressFn;
use crate::types::{Priority, ResponseShape, Tag};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::AbortHandle;

/// Completion callback of a request.
pub type Handler = Box<dyn FnOnce(Result<Response, RequestError>) + Send + 'static>;

#[derive(Default)]
struct RequestState {
    cancelled: bool,
    delivered: bool,
    running: bool,
    progress: u8,
    abort: Option<AbortHandle>,
}

#[derive(Default)]
struct Listeners {
    handler: Option<Handler>,
    download: Option<ProgressFn>,
    upload: Option<ProgressFn>,
}

/// A submitted request.
pub(crate) struct Request {
    config: RequestConfig,
    shape: ResponseShape,
    sequence: AtomicU64,
    state: Mutex<RequestState>,
    listeners: Mutex<Listeners>,
    callbacks: Arc<dyn Executor>,
    queue: Weak<RequestQueue>,
    finished: AtomicBool,
}

impl Request {
    pub(crate) fn new(
        mut config: RequestConfig,
        shape: ResponseShape,
        handler: Option<Handler>,
        delivery: Arc<dyn Executor>,
        queue: Weak<RequestQueue>,
    ) -> Arc<Self> {
        let listeners = Listeners {
            handler,
            download: config.download_progress.take(),
            upload: config.upload_progress.take(),
        };
        let callbacks = config.executor.clone().unwrap_or(delivery);

        Arc::new(Request {
            config,
            shape,
            sequence: AtomicU64::new(0),
            state: Mutex::new(RequestState::default()),
            listeners: Mutex::new(listeners),
            callbacks,
            queue,
            finished: AtomicBool::new(false),
        })
    }

    pub(crate) fn config(&self) -> &RequestConfig {
        &self.config
    }

    pub(crate) fn shape(&self) -> ResponseShape {
        self.shape
    }

    pub(crate) fn priority(&self) -> Priority {
        self.config.priority
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    pub(crate) fn set_sequence(&self, sequence: u64) {
        self.sequence.store(sequence, Ordering::Relaxed);
    }

    pub(crate) fn matches(&self, tag: &Tag) -> bool {
        self.config.tag.as_ref() == Some(tag)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    pub(crate) fn is_delivered(&self) -> bool {
        self.state.lock().delivered
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub(crate) fn progress(&self) -> u8 {
        self.state.lock().progress
    }

    /// Mark the request running. Returns `false` if it was already cancelled
    /// or delivered, in which case the unit must not touch the network.
    pub(crate) fn start(&self) -> bool {
        let mut state = self.state.lock();
        if state.cancelled || state.delivered {
            return false;
        }
        state.running = true;
        true
    }

    /// Attach the abort handle of the task executing this request.
    pub(crate) fn set_abort_handle(&self, handle: AbortHandle) {
        let mut state = self.state.lock();
        if state.cancelled {
            handle.abort();
        } else if !state.delivered {
            state.abort = Some(handle);
        }
    }

    /// Cancel the request.
    ///
    /// Honored when `force` is set, the threshold is 0, or progress is still
    /// below the threshold. A honored cancel aborts the in-flight task and, if
    /// nothing was delivered yet, delivers the cancellation error.
    pub(crate) fn cancel(&self, force: bool) {
        let threshold = self.config.cancel_threshold;
        let deliver = {
            let mut state = self.state.lock();
            if !(force || threshold == 0 || state.progress < threshold) {
                tracing::debug!(
                    sequence = self.sequence(),
                    progress = state.progress,
                    threshold,
                    "cancel ignored above threshold"
                );
                return;
            }
            state.cancelled = true;
            state.running = false;
            if let Some(abort) = &state.abort {
                abort.abort();
            }
            if state.delivered {
                false
            } else {
                state.delivered = true;
                true
            }
        };

        if deliver {
            tracing::debug!(sequence = self.sequence(), "request cancelled");
            self.post(Err(RequestError::cancelled()));
            self.finish();
        }
    }

    /// Deliver a failure. A cancelled request reports the cancellation marker
    /// instead of the failure it would have reported.
    pub(crate) fn deliver_error(&self, error: RequestError) {
        self.complete(Err(error));
    }

    /// Deliver a success. A cancelled request drops the value and reports the
    /// cancellation error.
    pub(crate) fn deliver_response(&self, response: Response) {
        self.complete(Ok(response));
    }

    fn complete(&self, outcome: Result<Response, RequestError>) {
        let outcome = {
            let mut state = self.state.lock();
            if state.delivered {
                return;
            }
            state.delivered = true;
            state.running = false;
            state.abort = None;
            match outcome {
                Ok(_) if state.cancelled => {
                    tracing::trace!(sequence = self.sequence(), "discarding response of cancelled request");
                    Err(RequestError::cancelled())
                }
                Err(mut error) if state.cancelled => {
                    error.mark_cancelled();
                    Err(error)
                }
                outcome => outcome,
            }
        };

        self.post(outcome);
        self.finish();
    }

    fn post(&self, outcome: Result<Response, RequestError>) {
        let handler = self.listeners.lock().handler.take();
        match handler {
            Some(handler) => self.callbacks.execute(Box::new(move || handler(outcome))),
            None => tracing::trace!(sequence = self.sequence(), "no handler registered, dropping outcome"),
        }
    }

    /// Record download progress and forward it to the download listener.
    pub(crate) fn report_download(&self, done: u64, total: u64) {
        if self.update_progress(done, total) {
            let listener = self.listeners.lock().download.clone();
            self.post_progress(listener, done, total);
        }
    }

    /// Record upload progress and forward it to the upload listener.
    pub(crate) fn report_upload(&self, done: u64, total: u64) {
        if self.update_progress(done, total) {
            let listener = self.listeners.lock().upload.clone();
            self.post_progress(listener, done, total);
        }
    }

    /// Returns `false` once the request is cancelled.
    fn update_progress(&self, done: u64, total: u64) -> bool {
        let mut state = self.state.lock();
        if state.cancelled {
            return false;
        }
        if total > 0 {
            state.progress = (done.saturating_mul(100) / total).min(100) as u8;
        }
        true
    }

    fn post_progress(&self, listener: Option<ProgressFn>, done: u64, total: u64) {
        if let Some(listener) = listener {
            self.callbacks.execute(Box::new(move || listener(done, total)));
        }
    }

    /// Release listeners and leave the working set. Runs once.
    pub(crate) fn finish(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut listeners = self.listeners.lock();
            listeners.handler = None;
            listeners.download = None;
            listeners.upload = None;
        }
        if let Some(queue) = self.queue.upgrade() {
            queue.finish(self.sequence());
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Request")
            .field("sequence", &self.sequence())
            .field("method", &self.config.method)
            .field("url", &self.config.url)
            .field("tag", &self.config.tag)
            .field("shape", &self.shape)
            .field("cancelled", &state.cancelled)
            .field("delivered", &state.delivered)
            .field("running", &state.running)
            .field("progress", &state.progress)
            .finish()
    }
}

/// Handle to a submitted request.
#[derive(Clone)]
pub struct RequestHandle {
    request: Arc<Request>,
}

impl RequestHandle {
    pub(crate) fn new(request: Arc<Request>) -> Self {
        RequestHandle { request }
    }

    /// Cancel this request; see [`Client::cancel`](crate::Client::cancel) for
    /// the threshold rule.
    pub fn cancel(&self, force: bool) {
        self.request.cancel(force);
    }

    /// Sequence number assigned at submission.
    pub fn sequence(&self) -> u64 {
        self.request.sequence()
    }

    /// Grouping tag.
    pub fn tag(&self) -> Option<&Tag> {
        self.request.config().tag()
    }

    /// Whether a cancel was honored.
    pub fn is_cancelled(&self) -> bool {
        self.request.is_cancelled()
    }

    /// Whether the terminal callback has been posted.
    pub fn is_delivered(&self) -> bool {
        self.request.is_delivered()
    }

    /// Whether the request is talking to the network.
    pub fn is_running(&self) -> bool {
        self.request.is_running()
    }

    /// Transfer progress, 0 to 100.
    pub fn progress(&self) -> u8 {
        self.request.progress()
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.request, f)
    }
}
