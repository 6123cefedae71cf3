//! [`BlockingRequester`] – synchronous request/response over pub/sub.
//!
//! No background worker: the caller publishes a request, then drives the
//! subscription itself with
//! [`poll_until_response_received`](BlockingRequester::poll_until_response_received)
//! until its predicate reports completion or the response timeout expires.
//!
//! The lock guarding the event context is taken for one bounded retrieval
//! at a time, so concurrent polls on the same requester interleave message
//! by message and never retrieve the same message twice.

use std::sync::Arc;
use std::time::Instant;

use gridlink_types::BridgeError;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::broker::Broker;
use crate::config::BridgeConfig;
use crate::connection::Connection;
use crate::context::{Callback, ContextKind};

/// Publish-then-poll request helper.
#[derive(Debug)]
pub struct BlockingRequester {
    connection: Connection,
}

impl BlockingRequester {
    pub fn new(broker: Arc<dyn Broker>, config: BridgeConfig) -> Result<Self, BridgeError> {
        Ok(Self {
            connection: Connection::new(broker, config)?,
        })
    }

    pub fn id(&self) -> Uuid {
        self.connection.id()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Register interest in `channel`; messages are only dispatched while a
    /// poll is in progress.
    pub fn subscribe_to_channel(&self, channel: &str, callback: Callback) -> Result<(), BridgeError> {
        self.connection.register(ContextKind::Event, channel, callback)
    }

    /// Dispatch incoming messages until `response_received` returns `true`
    /// or the response timeout has elapsed since entry.
    ///
    /// A timeout is not an error: the call returns `Ok(())` either way and
    /// the caller inspects whatever state the predicate observes.  Waiting for
    /// the context lock counts against the timeout, so a concurrent poll
    /// cannot push this call past it; only a callback that is already running
    /// can.
    ///
    /// # Errors
    ///
    /// Broker failures while retrieving a message.
    pub fn poll_until_response_received<F>(&self, response_received: F) -> Result<(), BridgeError>
    where
        F: Fn() -> bool,
    {
        let config = self.connection.config();
        let budget = config.response_timeout();
        let poll_interval = config.poll_interval();
        let started = Instant::now();
        let context = self.connection.context(ContextKind::Event);

        while !response_received() {
            let remaining = budget.saturating_sub(started.elapsed());
            let Some(mut guard) = (!remaining.is_zero())
                .then(|| context.try_lock_for(remaining))
                .flatten()
            else {
                debug!(bridge = %self.id(), timeout_ms = config.response_timeout_ms, "no response before timeout");
                break;
            };
            let remaining = budget.saturating_sub(started.elapsed());
            let delivery = guard.next_delivery(poll_interval.min(remaining))?;
            drop(guard);

            if let Some(delivery) = delivery {
                delivery.dispatch();
            }
        }
        Ok(())
    }

    pub fn publish(&self, channel: &str, payload: impl AsRef<[u8]>) -> Result<usize, BridgeError> {
        self.connection.publish(channel, payload)
    }

    pub fn publish_json<T: Serialize + ?Sized>(
        &self,
        channel: &str,
        value: &T,
    ) -> Result<usize, BridgeError> {
        self.connection.publish_json(channel, value)
    }

    pub fn wait(&self) {
        self.connection.wait();
    }

    pub fn resume(&self) {
        self.connection.resume();
    }
}
