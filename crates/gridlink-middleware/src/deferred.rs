//! [`DeferredBridge`] – declare channels in phases, activate once.
//!
//! Subscribe calls only fill the event registry.  Nothing is drained until
//! [`start_communication`](DeferredBridge::start_communication) starts the
//! single worker over everything registered so far.  While that worker runs
//! the registry is frozen.

use std::sync::Arc;

use gridlink_types::BridgeError;
use serde::Serialize;
use tracing::trace;
use uuid::Uuid;

use crate::broker::Broker;
use crate::config::BridgeConfig;
use crate::context::{Callback, ContextKind};
use crate::resettable::ResettableBridge;

/// Single-worker bridge with deferred activation.
#[derive(Debug)]
pub struct DeferredBridge {
    inner: ResettableBridge,
}

impl DeferredBridge {
    pub fn new(broker: Arc<dyn Broker>, config: BridgeConfig) -> Result<Self, BridgeError> {
        Ok(Self {
            inner: ResettableBridge::new(broker, config)?,
        })
    }

    pub fn id(&self) -> Uuid {
        self.inner.id()
    }

    pub fn has_active_worker(&self) -> bool {
        self.inner.has_active_worker()
    }

    /// Channels registered on the event context so far.
    pub fn registered_channels(&self) -> Vec<String> {
        self.inner
            .connection()
            .context(ContextKind::Event)
            .lock()
            .channels()
    }

    /// Add one channel to the registry without starting anything.
    pub fn subscribe_to_channel(&mut self, channel: &str, callback: Callback) -> Result<(), BridgeError> {
        self.inner.ensure_idle()?;
        self.inner
            .connection()
            .register(ContextKind::Event, channel, callback)
    }

    /// Add several channels to the registry without starting anything.
    ///
    /// All-or-nothing: on a subscribe failure none of the channels stay
    /// registered.
    pub fn subscribe_to_multiple_channels<I>(&mut self, channels: I) -> Result<(), BridgeError>
    where
        I: IntoIterator<Item = (String, Callback)>,
    {
        self.inner.ensure_idle()?;
        self.inner
            .connection()
            .register_all(ContextKind::Event, channels)
    }

    /// Register on the response context and start the one worker over it,
    /// exactly like [`ResettableBridge::subscribe_to_response_channel`].
    pub fn subscribe_to_response_channel(
        &mut self,
        channel: &str,
        callback: Callback,
    ) -> Result<(), BridgeError> {
        self.inner.subscribe_to_response_channel(channel, callback)
    }

    /// Start the single worker over the accumulated registry.
    ///
    /// # Errors
    ///
    /// [`BridgeError::WorkerAlreadyActive`] when called twice without an
    /// intervening [`terminate_connection`](Self::terminate_connection).
    pub fn start_communication(&mut self) -> Result<(), BridgeError> {
        self.inner.start(ContextKind::Event)?;
        trace!(bridge = %self.id(), channels = ?self.registered_channels(), "communication started");
        Ok(())
    }

    /// See [`ResettableBridge::terminate_connection`].  Both registries are
    /// emptied whether or not a worker was running, so the next activation
    /// starts from scratch.
    pub fn terminate_connection(&mut self) {
        self.inner.terminate_connection();
    }

    pub fn publish_structured<T: Serialize + ?Sized>(
        &self,
        channel: &str,
        value: &T,
    ) -> Result<usize, BridgeError> {
        self.inner.publish_structured(channel, value)
    }

    pub fn publish(&self, channel: &str, payload: impl AsRef<[u8]>) -> Result<usize, BridgeError> {
        self.inner.publish(channel, payload)
    }

    pub fn wait(&self) {
        self.inner.wait();
    }

    pub fn resume(&self) {
        self.inner.resume();
    }
}
