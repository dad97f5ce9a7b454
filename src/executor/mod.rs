//! Worker pools and callback executors.
//!
//! The [`ExecutorSupplier`] owns the four pools every client works with:
//!
//! | Pool | Used for |
//! |------|----------|
//! | immediate network | `Priority::Immediate` requests |
//! | network | every other priority |
//! | transfer | download/upload file I/O |
//! | delivery | handler callbacks, one at a time, in posting order |
//!
//! Network and transfer pools are [`WorkerPool`]s, each on its own runtime, so
//! a flood of low-priority traffic cannot starve the immediate pool. Delivery
//! goes through the [`Executor`] trait so callers can route callbacks onto
//! their own thread (a UI loop, a test harness) instead of the
//! [`DeliveryPool`].
//!
//! # Examples
//!
//! ```
//! use relay_http::executor::{Executor, Job};
//! use std::sync::Arc;
//!
//! // Run callbacks inline on whichever thread posts them.
//! let inline: Arc<dyn Executor> = Arc::new(|job: Job| job());
//! inline.execute(Box::new(|| println!("delivered")));
//! ```

mod delivery;
mod pool;

pub use delivery::DeliveryPool;
pub use pool::WorkerPool;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::types::Priority;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A unit of callback work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs callback jobs.
pub trait Executor: Send + Sync + 'static {
    /// Run `job`, now or later, on a thread of the executor's choosing.
    fn execute(&self, job: Job);
}

impl<F> Executor for F
where
    F: Fn(Job) + Send + Sync + 'static,
{
    fn execute(&self, job: Job) {
        self(job)
    }
}

/// The pools of one client.
///
/// Built once when the client is built. [`shutdown`](Self::shutdown) stops new
/// submissions without touching work already in flight; the pools themselves
/// stop when the supplier is dropped.
pub struct ExecutorSupplier {
    network: WorkerPool,
    immediate: WorkerPool,
    transfer: WorkerPool,
    delivery: Arc<dyn Executor>,
    shut_down: AtomicBool,
}

impl ExecutorSupplier {
    /// Start all pools, delivering callbacks on a fresh [`DeliveryPool`].
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let delivery = Arc::new(DeliveryPool::start("delivery")?);
        Self::with_delivery(config, delivery)
    }

    /// Start the worker pools and deliver callbacks on `delivery`.
    pub fn with_delivery(config: &ClientConfig, delivery: Arc<dyn Executor>) -> Result<Self> {
        config.validate()?;
        Ok(ExecutorSupplier {
            network: WorkerPool::start("network", config.network_threads)?,
            immediate: WorkerPool::start("immediate", config.immediate_threads)?,
            transfer: WorkerPool::start("transfer", config.transfer_threads)?,
            delivery,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Pool for requests below `Immediate` priority.
    pub fn for_network_tasks(&self) -> &WorkerPool {
        &self.network
    }

    /// Pool reserved for `Immediate` requests.
    pub fn for_immediate_network_tasks(&self) -> &WorkerPool {
        &self.immediate
    }

    /// Pool for download/upload file work.
    pub fn for_transfers(&self) -> &WorkerPool {
        &self.transfer
    }

    /// Default callback executor.
    pub fn for_delivery(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.delivery)
    }

    /// Pool a request of the given priority runs on.
    pub fn for_priority(&self, priority: Priority) -> &WorkerPool {
        if priority.is_immediate() {
            self.for_immediate_network_tasks()
        } else {
            self.for_network_tasks()
        }
    }

    /// Stop accepting new submissions.
    pub fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::SeqCst) {
            tracing::info!("executor supplier shut down");
        }
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}
