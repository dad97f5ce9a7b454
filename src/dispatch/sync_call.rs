//! Synchronous caller.
//!
//! Runs the same classification path as an execution unit, but on the
//! caller, and hands the envelope back instead of posting it. There is no
//! working set entry, no sequence number and no cancellation.

use super::{runnable, Engine};
use crate::error::RequestError;
use crate::request::RequestConfig;
use crate::response::Response;
use crate::types::ResponseShape;
use std::sync::{mpsc, Arc};
use tokio::runtime::{Handle, RuntimeFlavor};

/// Perform `config` on the current task.
pub(crate) async fn execute(
    engine: &Engine,
    config: &RequestConfig,
    shape: ResponseShape,
) -> Result<Response, RequestError> {
    tracing::debug!(method = %config.method(), url = config.url(), ?shape, "synchronous call");
    let outcome = runnable::perform(engine, config, shape, None).await;
    if let Err(error) = &outcome {
        tracing::debug!(url = config.url(), %error, "synchronous call failed");
    }
    outcome
}

/// Perform `config`, blocking the calling thread until the envelope is ready.
///
/// Outside a runtime the call is driven with the pool's `block_on`. From inside
/// a runtime it is spawned on the pool and the caller waits for the result,
/// leaving the worker through `block_in_place` when the runtime allows it.
pub(crate) fn execute_blocking(
    engine: &Arc<Engine>,
    config: RequestConfig,
    shape: ResponseShape,
) -> Result<Response, RequestError> {
    let pool = engine.executors.for_priority(config.priority());
    let engine = Arc::clone(engine);
    let call = async move { execute(&engine, &config, shape).await };

    let current = match Handle::try_current() {
        Ok(current) => current,
        Err(_) => return pool.handle().block_on(call),
    };

    let (tx, rx) = mpsc::channel();
    pool.handle().spawn(async move {
        let _ = tx.send(call.await);
    });
    let wait = move || rx.recv();
    let received = match current.runtime_flavor() {
        RuntimeFlavor::MultiThread => tokio::task::block_in_place(wait),
        _ => wait(),
    };
    received.unwrap_or_else(|_| {
        tracing::warn!("synchronous call ended without an envelope");
        Err(RequestError::connection("synchronous call ended without an envelope"))
    })
}
