//! [`Connection`] – the base bridge.
//!
//! Owns a broker handle, two independent subscription contexts (`event` and
//! `response`) and an [`EventGate`].  Every subscribe call on a bare
//! connection starts a fresh [`Worker`] and hands it to the caller, who is
//! responsible for stopping it.  [`ResettableBridge`][crate::ResettableBridge]
//! and friends add the single-worker discipline on top.

use std::sync::Arc;

use gridlink_types::BridgeError;
use serde::Serialize;
use tracing::trace;
use uuid::Uuid;

use crate::broker::Broker;
use crate::config::BridgeConfig;
use crate::context::{Callback, ContextKind, SharedContext, SubscriptionContext};
use crate::event_gate::EventGate;
use crate::worker::Worker;

/// Broker handle plus the event and response subscription contexts.
pub struct Connection {
    id: Uuid,
    broker: Arc<dyn Broker>,
    event: SharedContext,
    response: SharedContext,
    gate: EventGate,
    config: BridgeConfig,
}

impl Connection {
    /// Open both subscription contexts on `broker`.
    ///
    /// # Errors
    ///
    /// Whatever the broker returns when a subscription cannot be opened.
    pub fn new(broker: Arc<dyn Broker>, config: BridgeConfig) -> Result<Self, BridgeError> {
        let event = SubscriptionContext::shared(ContextKind::Event, broker.open_subscription()?);
        let response =
            SubscriptionContext::shared(ContextKind::Response, broker.open_subscription()?);
        Ok(Self {
            id: Uuid::new_v4(),
            broker,
            event,
            response,
            gate: EventGate::new(),
            config,
        })
    }

    /// Identifies this bridge instance in logs and errors.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn gate(&self) -> &EventGate {
        &self.gate
    }

    /// Fire-and-forget send.  Returns how many subscriptions the broker
    /// handed the payload to.
    pub fn publish(&self, channel: &str, payload: impl AsRef<[u8]>) -> Result<usize, BridgeError> {
        self.broker.publish(channel, payload.as_ref())
    }

    /// Serialize `value` as JSON and publish it.
    pub fn publish_json<T: Serialize + ?Sized>(
        &self,
        channel: &str,
        value: &T,
    ) -> Result<usize, BridgeError> {
        let payload = serde_json::to_vec(value)?;
        self.publish(channel, payload)
    }

    /// Register `callback` on the event context and start a new worker for it.
    ///
    /// The returned [`Worker`] is the only way to stop the thread; dropping it
    /// leaves the thread running.
    #[must_use = "dropping the Worker detaches its thread"]
    pub fn subscribe_to_channel(
        &self,
        channel: &str,
        callback: Callback,
    ) -> Result<Worker, BridgeError> {
        self.register(ContextKind::Event, channel, callback)?;
        self.start_worker(ContextKind::Event)
    }

    /// Register `callback` on the response context and start a new worker for
    /// it.
    ///
    /// The returned [`Worker`] is the only way to stop the thread; dropping it
    /// leaves the thread running.
    #[must_use = "dropping the Worker detaches its thread"]
    pub fn subscribe_to_response_channel(
        &self,
        channel: &str,
        callback: Callback,
    ) -> Result<Worker, BridgeError> {
        self.register(ContextKind::Response, channel, callback)?;
        self.start_worker(ContextKind::Response)
    }

    /// Block until [`resume`](Self::resume) is called, then clear the signal.
    pub fn wait(&self) {
        self.gate.wait();
    }

    pub fn resume(&self) {
        self.gate.resume();
    }

    pub(crate) fn context(&self, kind: ContextKind) -> &SharedContext {
        match kind {
            ContextKind::Event => &self.event,
            ContextKind::Response => &self.response,
        }
    }

    pub(crate) fn register(
        &self,
        kind: ContextKind,
        channel: &str,
        callback: Callback,
    ) -> Result<(), BridgeError> {
        self.context(kind).lock().register(channel, callback)
    }

    pub(crate) fn register_all<I>(&self, kind: ContextKind, channels: I) -> Result<(), BridgeError>
    where
        I: IntoIterator<Item = (String, Callback)>,
    {
        self.context(kind).lock().register_all(channels)
    }

    pub(crate) fn start_worker(&self, kind: ContextKind) -> Result<Worker, BridgeError> {
        let name = format!("gridlink-{kind}-{}", self.id);
        let worker = Worker::spawn(name, Arc::clone(self.context(kind)), self.config.poll_interval())?;
        trace!(bridge = %self.id, context = %kind, "started worker");
        Ok(worker)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("event_channels", &self.event.lock().channels())
            .field("response_channels", &self.response.lock().channels())
            .field("config", &self.config)
            .finish()
    }
}
