//! [`Worker`] – a background thread draining one subscription context.
//!
//! The worker owns exactly one OS thread.  The thread repeatedly retrieves a
//! message with a bounded wait and dispatches it to its callback, one at a
//! time, in broker delivery order.  Stopping is cooperative with a deadline:
//! [`Worker::stop`] raises the stop flag and waits up to the join timeout for
//! the thread to notice.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use gridlink_types::BridgeError;
use tracing::{debug, trace, warn};

use crate::context::SharedContext;

/// Owned handle to a running drain thread.
///
/// Consume it with [`Worker::stop`].  Dropping the handle detaches the thread:
/// it keeps draining until the broker closes, and nothing can stop it any more.
#[must_use = "dropping the Worker detaches its thread; keep it to stop the thread later"]
pub struct Worker {
    name: String,
    stop: Arc<AtomicBool>,
    exited: Receiver<()>,
    callback_failures: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Start a thread named `name` that drains `context`, waiting at most
    /// `poll_interval` per retrieval.
    pub fn spawn(
        name: impl Into<String>,
        context: SharedContext,
        poll_interval: Duration,
    ) -> Result<Self, BridgeError> {
        let name = name.into();
        let stop = Arc::new(AtomicBool::new(false));
        let callback_failures = Arc::new(AtomicU64::new(0));
        // Nothing is ever sent; the sender is dropped when the thread exits,
        // including by unwinding.
        let (exit_guard, exited) = bounded::<()>(0);

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn({
                let stop = Arc::clone(&stop);
                let failures = Arc::clone(&callback_failures);
                move || {
                    let _exit_guard = exit_guard;
                    drain(&context, &stop, &failures, poll_interval);
                }
            })
            .map_err(|e| BridgeError::WorkerSpawn(format!("{name}: {e}")))?;

        trace!(worker = %name, "started worker thread");
        Ok(Self {
            name,
            stop,
            exited,
            callback_failures,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` until the drain loop has returned.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Number of callbacks that panicked on this worker.
    pub fn callback_failures(&self) -> u64 {
        self.callback_failures.load(Ordering::Relaxed)
    }

    /// Signal stop and join, waiting at most `join_timeout`.
    ///
    /// # Errors
    ///
    /// * [`BridgeError::JoinTimeout`] – the thread is still busy (usually a
    ///   slow callback).  It is detached and keeps running until its current
    ///   dispatch returns.
    /// * [`BridgeError::WorkerPanicked`] – the drain loop itself panicked.
    pub fn stop(mut self, join_timeout: Duration) -> Result<(), BridgeError> {
        self.stop.store(true, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        if let Err(RecvTimeoutError::Timeout) = self.exited.recv_timeout(join_timeout) {
            return Err(BridgeError::JoinTimeout {
                worker: self.name.clone(),
                timeout_ms: join_timeout.as_millis() as u64,
            });
        }

        handle
            .join()
            .map_err(|_| BridgeError::WorkerPanicked(self.name.clone()))?;
        debug!(worker = %self.name, "worker thread stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("callback_failures", &self.callback_failures())
            .finish()
    }
}

fn drain(context: &SharedContext, stop: &AtomicBool, failures: &AtomicU64, poll_interval: Duration) {
    while !stop.load(Ordering::Acquire) {
        let next = context.lock().next_delivery(poll_interval);
        match next {
            Ok(Some(delivery)) => {
                if !delivery.dispatch() {
                    failures.fetch_add(1, Ordering::Relaxed);
                }
            }
            Ok(None) => {}
            Err(BridgeError::BrokerClosed) => {
                debug!("broker closed; worker exiting");
                break;
            }
            Err(e) => {
                warn!(error = %e, "receive failed; retrying");
                thread::sleep(poll_interval);
            }
        }
    }
}
