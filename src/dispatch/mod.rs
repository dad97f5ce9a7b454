//! Request dispatching.
//!
//! # Module Organization
//!
//! ```text
//! dispatch/
//! ├── mod       - Engine: the collaborators every execution path shares
//! ├── queue     - RequestQueue: working set, sequencing, cancellation
//! ├── runnable  - Execution unit: transport call, classification, parsing
//! └── sync_call - Synchronous caller over the same classification path
//! ```

mod queue;
mod runnable;
mod sync_call;

pub(crate) use queue::RequestQueue;
pub(crate) use sync_call::{execute, execute_blocking};

use crate::executor::ExecutorSupplier;
use crate::image::ImageDecoder;
use crate::parser::Parser;
use crate::transport::Transport;
use parking_lot::Mutex;
use std::sync::Arc;

/// Collaborators of one client.
pub(crate) struct Engine {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) parser: Arc<dyn Parser>,
    /// Decoder calls are serialized through this lock.
    pub(crate) decoder: Option<Mutex<Box<dyn ImageDecoder>>>,
    pub(crate) executors: ExecutorSupplier,
}
