//! Single-threaded, ordered callback delivery.

use super::{Executor, Job};
use crate::error::{DispatchError, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::mpsc;

/// Runs posted jobs one at a time, in posting order, on one dedicated thread.
///
/// The thread exits once every handle to the pool is gone and the queue is
/// drained. A panicking job is logged and does not stop later jobs.
pub struct DeliveryPool {
    tx: mpsc::UnboundedSender<Job>,
}

impl DeliveryPool {
    /// Start the delivery thread.
    pub fn start(name: &str) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        std::thread::Builder::new()
            .name(format!("relay-{}", name))
            .spawn(move || {
                while let Some(job) = rx.blocking_recv() {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        tracing::error!("delivery callback panicked");
                    }
                }
                tracing::debug!("delivery pool stopped");
            })
            .map_err(|source| DispatchError::PoolStart {
                pool: "delivery",
                source,
            })?;

        Ok(DeliveryPool { tx })
    }
}

impl Executor for DeliveryPool {
    fn execute(&self, job: Job) {
        if self.tx.send(job).is_err() {
            tracing::warn!("delivery pool stopped, dropping callback");
        }
    }
}
