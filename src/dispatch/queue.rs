//! Working set of in-flight requests.

use super::{runnable, Engine};
use crate::error::{DispatchError, Result};
use crate::request::{Handler, Request, RequestConfig, RequestHandle};
use crate::types::{ResponseShape, Tag};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Tracks every submitted request until its delivery finishes.
///
/// Sweeps (`cancel_with_tag`, `cancel_all`) work on a snapshot of the set, so
/// requests finishing concurrently never block or invalidate a sweep.
pub(crate) struct RequestQueue {
    engine: Arc<Engine>,
    working: RwLock<HashMap<u64, Arc<Request>>>,
    sequence: AtomicU64,
}

impl RequestQueue {
    pub(crate) fn new(engine: Arc<Engine>) -> Arc<Self> {
        Arc::new(RequestQueue {
            engine,
            working: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        })
    }

    pub(crate) fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Next sequence number. Wraps on overflow.
    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a request and schedule its execution unit.
    ///
    /// Never blocks: the unit waits for a pool permit on the pool itself.
    pub(crate) fn submit(
        self: &Arc<Self>,
        config: RequestConfig,
        shape: ResponseShape,
        handler: Option<Handler>,
    ) -> Result<RequestHandle> {
        let executors = &self.engine.executors;
        if executors.is_shut_down() {
            return Err(DispatchError::ShutDown);
        }

        let request = Request::new(
            config,
            shape,
            handler,
            executors.for_delivery(),
            Arc::downgrade(self),
        );
        let sequence = self.next_sequence();
        request.set_sequence(sequence);
        self.working.write().insert(sequence, Arc::clone(&request));

        let pool = executors.for_priority(request.priority());
        let task = pool.spawn(runnable::run(Arc::clone(&self.engine), Arc::clone(&request)));
        request.set_abort_handle(task.abort_handle());

        tracing::debug!(
            sequence,
            pool = pool.name(),
            free_permits = pool.available(),
            transfer = request.config().kind().is_transfer(),
            method = %request.config().method(),
            url = request.config().url(),
            "request submitted"
        );

        Ok(RequestHandle::new(request))
    }

    /// Cancel every in-flight request carrying `tag`.
    pub(crate) fn cancel_with_tag(&self, tag: &Tag, force: bool) {
        self.sweep(|request| request.matches(tag), force);
    }

    /// Cancel every in-flight request.
    pub(crate) fn cancel_all(&self, force: bool) {
        self.sweep(|_| true, force);
    }

    fn sweep<F>(&self, filter: F, force: bool)
    where
        F: Fn(&Arc<Request>) -> bool,
    {
        let snapshot: Vec<Arc<Request>> = self
            .working
            .read()
            .values()
            .filter(|request| filter(*request))
            .cloned()
            .collect();

        let mut cancelled = Vec::new();
        for request in snapshot {
            request.cancel(force);
            if request.is_cancelled() {
                cancelled.push(request.sequence());
            }
        }

        if !cancelled.is_empty() {
            tracing::debug!(count = cancelled.len(), force, "requests cancelled");
            let mut working = self.working.write();
            for sequence in cancelled {
                working.remove(&sequence);
            }
        }
    }

    /// Whether any in-flight request carrying `tag` is running.
    pub(crate) fn is_running(&self, tag: &Tag) -> bool {
        self.working
            .read()
            .values()
            .any(|request| request.matches(tag) && request.is_running())
    }

    /// Remove a request from the working set. Idempotent.
    pub(crate) fn finish(&self, sequence: u64) {
        if self.working.write().remove(&sequence).is_some() {
            tracing::trace!(sequence, "request left working set");
        }
    }

    /// Number of in-flight requests.
    pub(crate) fn len(&self) -> usize {
        self.working.read().len()
    }
}
