//! Bounded worker pool on a dedicated tokio runtime.

use crate::error::{DispatchError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// A named pool of worker threads running at most `size` units at a time.
///
/// Each pool owns its runtime, so a saturated pool never delays another.
/// Units beyond `size` wait for a permit inside the pool.
pub struct WorkerPool {
    name: &'static str,
    size: usize,
    handle: Handle,
    runtime: Option<Runtime>,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    /// Start a pool with `size` worker threads.
    pub fn start(name: &'static str, size: usize) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(size)
            .thread_name(format!("relay-{}", name))
            .enable_all()
            .build()
            .map_err(|source| DispatchError::PoolStart { pool: name, source })?;

        tracing::debug!(pool = name, size, "worker pool started");

        Ok(WorkerPool {
            name,
            size,
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
            permits: Arc::new(Semaphore::new(size)),
        })
    }

    /// Pool name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Maximum number of units running at once.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held by a running unit.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Runtime handle of this pool.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Queue a unit; it starts once a permit is free.
    pub fn spawn<F>(&self, unit: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.handle.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            unit.await;
        })
    }

    /// Run a future on this pool and wait for its output.
    pub async fn run<F>(&self, work: F) -> std::result::Result<F::Output, tokio::task::JoinError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.handle
            .spawn(async move {
                let _permit = permits.acquire_owned().await;
                work.await
            })
            .await
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            // Never blocks, so the last handle may be dropped from any thread.
            runtime.shutdown_background();
        }
    }
}
