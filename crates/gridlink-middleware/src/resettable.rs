//! [`ResettableBridge`] – a connection that owns at most one worker.
//!
//! Subscribing starts the single worker; a second subscribe before
//! [`terminate_connection`](ResettableBridge::terminate_connection) is
//! rejected with [`BridgeError::WorkerAlreadyActive`].  Termination is
//! best-effort and always leaves the bridge ready to subscribe again.

use std::sync::Arc;

use gridlink_types::BridgeError;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::broker::Broker;
use crate::config::BridgeConfig;
use crate::connection::Connection;
use crate::context::{Callback, ContextKind};
use crate::worker::Worker;

/// The owned worker and the context it drains.
struct ActiveWorker {
    worker: Worker,
    kind: ContextKind,
}

/// Connection with the single-worker-per-instance discipline.
pub struct ResettableBridge {
    connection: Connection,
    active: Option<ActiveWorker>,
}

impl ResettableBridge {
    pub fn new(broker: Arc<dyn Broker>, config: BridgeConfig) -> Result<Self, BridgeError> {
        Ok(Self {
            connection: Connection::new(broker, config)?,
            active: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.connection.id()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn has_active_worker(&self) -> bool {
        self.active.is_some()
    }

    /// Register every channel → callback pair on the event context and start
    /// the one worker.
    ///
    /// Registration is all-or-nothing: if any channel fails to subscribe, the
    /// registry is left as it was before the call.
    ///
    /// # Errors
    ///
    /// * [`BridgeError::WorkerAlreadyActive`] – a worker is already owned.
    /// * Broker errors from subscribing, or [`BridgeError::WorkerSpawn`].
    pub fn subscribe_to_multiple_channels<I>(&mut self, channels: I) -> Result<(), BridgeError>
    where
        I: IntoIterator<Item = (String, Callback)>,
    {
        self.ensure_idle()?;
        self.connection.register_all(ContextKind::Event, channels)?;
        self.start(ContextKind::Event)
    }

    /// Register `callback` on the response context and start the one worker
    /// over it.
    pub fn subscribe_to_response_channel(
        &mut self,
        channel: &str,
        callback: Callback,
    ) -> Result<(), BridgeError> {
        self.ensure_idle()?;
        self.connection.register(ContextKind::Response, channel, callback)?;
        self.start(ContextKind::Response)
    }

    /// Stop the owned worker, close both subscription contexts and clear the
    /// worker slot.
    ///
    /// Never fails: a worker that misses the join deadline is detached, and
    /// any stop or close error is logged and swallowed.  Afterwards both
    /// registries are empty and the bridge accepts new subscriptions.
    pub fn terminate_connection(&mut self) {
        let bridge = self.id();

        if let Some(ActiveWorker { worker, kind }) = self.active.take() {
            let worker_name = worker.name().to_string();
            if let Err(e) = worker.stop(self.connection.config().thread_join_timeout()) {
                warn!(%bridge, worker = %worker_name, context = %kind, error = %e, "error when stopping worker thread");
            }
        }
        for kind in [ContextKind::Event, ContextKind::Response] {
            if let Err(e) = self.connection.context(kind).lock().close() {
                warn!(%bridge, context = %kind, error = %e, "error when closing subscription");
            }
        }
        debug!(%bridge, "connection terminated");
    }

    /// Serialize `value` as JSON and publish it.
    pub fn publish_structured<T: Serialize + ?Sized>(
        &self,
        channel: &str,
        value: &T,
    ) -> Result<usize, BridgeError> {
        self.connection.publish_json(channel, value)
    }

    pub fn publish(&self, channel: &str, payload: impl AsRef<[u8]>) -> Result<usize, BridgeError> {
        self.connection.publish(channel, payload)
    }

    pub fn wait(&self) {
        self.connection.wait();
    }

    pub fn resume(&self) {
        self.connection.resume();
    }

    pub(crate) fn ensure_idle(&self) -> Result<(), BridgeError> {
        match &self.active {
            Some(_) => Err(BridgeError::WorkerAlreadyActive { bridge: self.id() }),
            None => Ok(()),
        }
    }

    pub(crate) fn start(&mut self, kind: ContextKind) -> Result<(), BridgeError> {
        self.ensure_idle()?;
        let worker = self.connection.start_worker(kind)?;
        self.active = Some(ActiveWorker { worker, kind });
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn active_worker(&self) -> Option<&Worker> {
        self.active.as_ref().map(|a| &a.worker)
    }
}

impl Drop for ResettableBridge {
    fn drop(&mut self) {
        self.terminate_connection();
    }
}

impl std::fmt::Debug for ResettableBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResettableBridge")
            .field("connection", &self.connection)
            .field("worker", &self.active.as_ref().map(|a| &a.worker))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ChannelMap, callback};
    use crate::inbox::Inbox;
    use crate::local_broker::LocalBroker;
    use crate::testing::FaultyBroker;
    use serde_json::{Value, json};
    use std::thread;
    use std::time::{Duration, Instant};
    use tokio::time::timeout;

    fn make_bridge() -> (LocalBroker, ResettableBridge) {
        let broker = LocalBroker::new();
        let bridge = ResettableBridge::new(Arc::new(broker.clone()), BridgeConfig::for_tests()).unwrap();
        (broker, bridge)
    }

    fn channels(pairs: &[(&str, &Inbox)]) -> ChannelMap {
        pairs
            .iter()
            .map(|(name, inbox)| (name.to_string(), inbox.callback()))
            .collect()
    }

    #[tokio::test]
    async fn multiple_channels_share_one_worker() {
        let (_broker, mut bridge) = make_bridge();
        let mut cycles = Inbox::new();
        let mut ticks = Inbox::new();

        bridge
            .subscribe_to_multiple_channels(channels(&[("market/cycle", &cycles), ("market/tick", &ticks)]))
            .unwrap();
        assert!(bridge.has_active_worker());

        bridge.publish("market/cycle", "c1").unwrap();
        bridge.publish("market/tick", "t1").unwrap();

        let c = timeout(Duration::from_secs(1), cycles.recv()).await.unwrap().unwrap();
        let t = timeout(Duration::from_secs(1), ticks.recv()).await.unwrap().unwrap();
        assert_eq!(c.payload_str().unwrap(), "c1");
        assert_eq!(t.payload_str().unwrap(), "t1");
    }

    #[test]
    fn second_subscribe_without_terminate_is_rejected() {
        let (_broker, mut bridge) = make_bridge();
        let inbox = Inbox::new();
        bridge
            .subscribe_to_multiple_channels(channels(&[("a", &inbox)]))
            .unwrap();

        let err = bridge
            .subscribe_to_multiple_channels(channels(&[("b", &inbox)]))
            .unwrap_err();
        assert_eq!(err, BridgeError::WorkerAlreadyActive { bridge: bridge.id() });

        let err = bridge
            .subscribe_to_response_channel("c", inbox.callback())
            .unwrap_err();
        assert!(matches!(err, BridgeError::WorkerAlreadyActive { .. }));
    }

    #[tokio::test]
    async fn terminate_then_subscribe_resets_the_bridge() {
        let (broker, mut bridge) = make_bridge();
        let mut old = Inbox::new();
        let mut new = Inbox::new();

        bridge
            .subscribe_to_multiple_channels(channels(&[("old", &old)]))
            .unwrap();
        bridge.terminate_connection();
        assert!(!bridge.has_active_worker());
        assert_eq!(broker.subscriber_count("old"), 0);

        bridge
            .subscribe_to_multiple_channels(channels(&[("new", &new)]))
            .unwrap();
        bridge.publish("old", "stale").unwrap();
        bridge.publish("new", "fresh").unwrap();

        let msg = timeout(Duration::from_secs(1), new.recv()).await.unwrap().unwrap();
        assert_eq!(msg.payload_str().unwrap(), "fresh");
        assert!(old.try_recv().is_none(), "old channel must not be dispatched after reset");
    }

    #[tokio::test]
    async fn response_channel_uses_the_response_context() {
        let (_broker, mut bridge) = make_bridge();
        let mut responses = Inbox::new();

        bridge
            .subscribe_to_response_channel("area/load/response", responses.callback())
            .unwrap();
        bridge
            .publish_structured("area/load/response", &json!({"status": "ready"}))
            .unwrap();

        let msg = timeout(Duration::from_secs(1), responses.recv()).await.unwrap().unwrap();
        let value: Value = msg.decode_json().unwrap();
        assert_eq!(value["status"], "ready");

        bridge.terminate_connection();
        assert!(!bridge.has_active_worker());
    }

    #[test]
    fn terminate_without_worker_is_safe_to_repeat() {
        let (_broker, mut bridge) = make_bridge();
        bridge.terminate_connection();
        bridge.terminate_connection();
        assert!(!bridge.has_active_worker());
    }

    #[test]
    fn terminate_swallows_close_failure_and_clears_worker() {
        let broker = FaultyBroker::failing_close();
        let mut bridge = ResettableBridge::new(Arc::new(broker.clone()), BridgeConfig::for_tests()).unwrap();
        bridge
            .subscribe_to_multiple_channels([("a".to_string(), callback(|_| {}))])
            .unwrap();

        bridge.terminate_connection();
        assert!(!bridge.has_active_worker());
        assert!(broker.close_attempts() >= 1);

        // The slot is free again.
        bridge
            .subscribe_to_multiple_channels([("b".to_string(), callback(|_| {}))])
            .unwrap();
        assert!(bridge.has_active_worker());
    }

    #[test]
    fn terminate_detaches_worker_that_misses_the_join_deadline() {
        let (_broker, mut bridge) = make_bridge();
        let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
        bridge
            .subscribe_to_multiple_channels([(
                "slow".to_string(),
                callback(move |_| {
                    let _ = entered_tx.try_send(());
                    thread::sleep(Duration::from_millis(1_500));
                }),
            )])
            .unwrap();

        bridge.publish("slow", "x").unwrap();
        entered_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("callback never started");

        let started = Instant::now();
        bridge.terminate_connection();
        assert!(started.elapsed() < Duration::from_millis(1_200));
        assert!(!bridge.has_active_worker());
    }

    #[tokio::test]
    async fn structured_payloads_roundtrip_through_a_callback() {
        let (_broker, mut bridge) = make_bridge();
        let mut inbox = Inbox::new();
        bridge
            .subscribe_to_multiple_channels(channels(&[("structured", &inbox)]))
            .unwrap();

        let values = [
            json!({}),
            json!({"area": {"name": "House 1", "children": [{"name": "PV", "capacity_kW": 5.0}]}}),
            json!([1, 2.5, -3, 1e10]),
            json!("Grüße aus dem Netz – 電力市場 ⚡"),
        ];
        for value in &values {
            bridge.publish_structured("structured", value).unwrap();
        }
        for value in &values {
            let msg = timeout(Duration::from_secs(1), inbox.recv()).await.unwrap().unwrap();
            let back: Value = msg.decode_json().unwrap();
            assert_eq!(&back, value);
        }
    }

    #[test]
    fn panicking_callback_leaves_worker_running() {
        let (_broker, mut bridge) = make_bridge();
        let mut inbox = Inbox::new();
        let mut map: ChannelMap = ChannelMap::new();
        map.insert("boom".to_string(), callback(|_| panic!("rate schedule missing")));
        map.insert("ok".to_string(), inbox.callback());
        bridge.subscribe_to_multiple_channels(map).unwrap();

        bridge.publish("boom", "x").unwrap();
        bridge.publish("ok", "y").unwrap();

        let deadline = Instant::now() + Duration::from_secs(1);
        let mut received = None;
        while received.is_none() && Instant::now() < deadline {
            received = inbox.try_recv();
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(received.expect("worker died").channel, "ok");
        let worker = bridge.active_worker().expect("worker");
        assert!(worker.is_running());
        assert_eq!(worker.callback_failures(), 1);
    }

    #[tokio::test]
    async fn failed_batch_leaves_no_callbacks_behind() {
        let broker = FaultyBroker::refusing("bad");
        let mut bridge = ResettableBridge::new(Arc::new(broker.clone()), BridgeConfig::for_tests()).unwrap();
        let mut inbox = Inbox::new();

        let err = bridge
            .subscribe_to_multiple_channels(vec![
                ("a".to_string(), inbox.callback()),
                ("bad".to_string(), inbox.callback()),
            ])
            .unwrap_err();
        assert!(matches!(err, BridgeError::Broker(_)));
        assert!(!bridge.has_active_worker());
        assert!(!bridge.connection().context(ContextKind::Event).lock().is_registered("a"));

        bridge
            .subscribe_to_multiple_channels([("b".to_string(), inbox.callback())])
            .unwrap();
        bridge.publish("a", "leftover").unwrap();
        bridge.publish("b", "wanted").unwrap();

        // One context keeps broker order, so a dispatched "a" would come first.
        let msg = timeout(Duration::from_secs(1), inbox.recv()).await.unwrap().unwrap();
        assert_eq!(msg.channel, "b");
    }

    #[test]
    fn publish_error_propagates() {
        let (broker, bridge) = make_bridge();
        broker.shutdown();
        assert_eq!(
            bridge.publish_structured("x", &json!({"a": 1})),
            Err(BridgeError::BrokerClosed)
        );
    }

    #[test]
    fn drop_terminates_owned_worker() {
        let (broker, mut bridge) = make_bridge();
        bridge
            .subscribe_to_multiple_channels([("dropped".to_string(), callback(|_| {}))])
            .unwrap();
        assert_eq!(broker.subscriber_count("dropped"), 1);
        drop(bridge);
        assert_eq!(broker.subscriber_count("dropped"), 0);
    }
}
