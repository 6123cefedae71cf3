//! [`EventGate`] – single-slot wait/resume rendezvous.
//!
//! A worker thread that receives an externally produced message calls
//! [`EventGate::resume`] to hand control back to logic parked in
//! [`EventGate::wait`].  The gate carries no value and does not count: any
//! number of `resume` calls without an intervening `wait` leave exactly one
//! pending signal.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Latch-on-resume, clear-on-wait synchronisation primitive.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use gridlink_middleware::EventGate;
///
/// let gate = EventGate::new();
/// gate.resume();
/// gate.resume(); // does not queue a second signal
///
/// gate.wait();
/// assert!(!gate.wait_timeout(Duration::from_millis(10)));
/// ```
#[derive(Debug, Default)]
pub struct EventGate {
    signalled: Mutex<bool>,
    condvar: Condvar,
}

impl EventGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the gate is signalled, then clear the signal.
    pub fn wait(&self) {
        let mut signalled = self.signalled.lock();
        while !*signalled {
            self.condvar.wait(&mut signalled);
        }
        *signalled = false;
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    ///
    /// Returns `true` when a signal was consumed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut signalled = self.signalled.lock();
        let _ = self
            .condvar
            .wait_while_for(&mut signalled, |s| !*s, timeout);
        let consumed = *signalled;
        *signalled = false;
        consumed
    }

    /// Set the signal and wake at most one waiter.
    pub fn resume(&self) {
        let mut signalled = self.signalled.lock();
        *signalled = true;
        self.condvar.notify_one();
    }

    /// Whether a `resume` is pending.
    pub fn is_set(&self) -> bool {
        *self.signalled.lock()
    }
}
