//! Delivery contexts for invocation callbacks.

use crate::error::{Result, RpcError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Mutex;
use tracing::warn;

/// A callback ready to run.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs completed invocations' callbacks in a chosen execution context.
pub trait ResultDispatcher: Send + Sync {
    fn dispatch(&self, job: Job);
}

/// Runs every callback on one dedicated thread, one at a time, in the order
/// invocations complete.
///
/// Callbacks never run concurrently with each other, so state they share
/// needs no extra synchronization. The thread exits once the dispatcher is
/// dropped and queued callbacks have run.
pub struct SerialDispatcher {
    sender: Mutex<mpsc::Sender<Job>>,
}

impl SerialDispatcher {
    pub fn new() -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();

        std::thread::Builder::new()
            .name("httprpc-dispatch".to_string())
            .spawn(move || {
                for job in receiver {
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        warn!("Invocation callback panicked");
                    }
                }
            })
            .map_err(|e| RpcError::Config {
                message: format!("Failed to start callback dispatch thread: {}", e),
            })?;

        Ok(Self {
            sender: Mutex::new(sender),
        })
    }
}

impl ResultDispatcher for SerialDispatcher {
    fn dispatch(&self, job: Job) {
        let sent = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .send(job);

        if let Err(mpsc::SendError(job)) = sent {
            // The dispatch thread is gone; run here rather than lose the callback.
            warn!("Callback dispatch thread unavailable, running callback inline");
            job();
        }
    }
}

/// Runs each callback immediately on the task that completed the call.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

impl ResultDispatcher for InlineDispatcher {
    fn dispatch(&self, job: Job) {
        job();
    }
}
