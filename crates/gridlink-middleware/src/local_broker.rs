//! In-process broker.
//!
//! [`LocalBroker`] implements the [`Broker`] seam without any network
//! transport, so a whole simulation (or a test) can run the bridges inside
//! one process.
//!
//! Each subscription context owns one unbounded crossbeam channel.  Every
//! channel it subscribes to routes into that single queue, which keeps the
//! broker's delivery order intact for the context's consumer.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use gridlink_types::{BridgeError, Message};
use parking_lot::Mutex;
use tracing::trace;

use crate::broker::{Broker, BrokerSubscription};

type SubscriptionId = u64;

/// A delivery target registered under a channel name.
struct Route {
    subscription: SubscriptionId,
    sender: Sender<Message>,
}

struct Shared {
    routes: Mutex<HashMap<String, Vec<Route>>>,
    next_id: AtomicU64,
    shut_down: AtomicBool,
}

impl Shared {
    fn unregister(&self, subscription: SubscriptionId, channels: &[String]) {
        let mut routes = self.routes.lock();
        for channel in channels {
            if let Some(list) = routes.get_mut(channel) {
                list.retain(|r| r.subscription != subscription);
                if list.is_empty() {
                    routes.remove(channel);
                }
            }
        }
    }
}

/// Shared in-process broker. Clone it cheaply – all clones route through the
/// same channel table.
#[derive(Clone)]
pub struct LocalBroker {
    shared: Arc<Shared>,
}

impl LocalBroker {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                routes: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Close the broker for everyone.
    ///
    /// Afterwards `publish`, `open_subscription` and `get_message` all fail
    /// with [`BridgeError::BrokerClosed`], which is how a lost connection
    /// surfaces through the seam.
    pub fn shutdown(&self) {
        self.shared.shut_down.store(true, Ordering::Release);
        self.shared.routes.lock().clear();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shut_down.load(Ordering::Acquire)
    }

    /// Number of subscription contexts currently listening on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.shared.routes.lock().get(channel).map_or(0, Vec::len)
    }

    fn ensure_open(&self) -> Result<(), BridgeError> {
        if self.is_shut_down() {
            return Err(BridgeError::BrokerClosed);
        }
        Ok(())
    }
}

impl Default for LocalBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker for LocalBroker {
    /// Returns `Ok(0)` when nobody listens on `channel`; that is a normal
    /// condition, not an error.
    fn publish(&self, channel: &str, payload: &[u8]) -> Result<usize, BridgeError> {
        self.ensure_open()?;
        let routes = self.shared.routes.lock();
        let Some(list) = routes.get(channel) else {
            return Ok(0);
        };
        let mut delivered = 0;
        for route in list {
            if route.sender.send(Message::new(channel, payload)).is_ok() {
                delivered += 1;
            }
        }
        trace!(channel, delivered, "local broker publish");
        Ok(delivered)
    }

    fn open_subscription(&self) -> Result<Box<dyn BrokerSubscription>, BridgeError> {
        self.ensure_open()?;
        let (sender, receiver) = unbounded();
        Ok(Box::new(LocalSubscription {
            id: self.shared.next_id.fetch_add(1, Ordering::Relaxed),
            broker: self.clone(),
            sender,
            receiver,
            channels: Vec::new(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Subscription context
// ---------------------------------------------------------------------------

/// A subscription context opened on a [`LocalBroker`].
pub struct LocalSubscription {
    id: SubscriptionId,
    broker: LocalBroker,
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    channels: Vec<String>,
}

impl BrokerSubscription for LocalSubscription {
    fn subscribe(&mut self, channel: &str) -> Result<(), BridgeError> {
        self.broker.ensure_open()?;
        if self.channels.iter().any(|c| c == channel) {
            return Ok(());
        }
        self.broker
            .shared
            .routes
            .lock()
            .entry(channel.to_string())
            .or_default()
            .push(Route {
                subscription: self.id,
                sender: self.sender.clone(),
            });
        self.channels.push(channel.to_string());
        Ok(())
    }

    fn get_message(&mut self, timeout: Duration) -> Result<Option<Message>, BridgeError> {
        self.broker.ensure_open()?;
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(BridgeError::BrokerClosed),
        }
    }

    fn close(&mut self) -> Result<(), BridgeError> {
        self.broker.shared.unregister(self.id, &self.channels);
        self.channels.clear();
        // Undelivered messages belong to the old subscriptions.
        while self.receiver.try_recv().is_ok() {}
        Ok(())
    }
}

impl Drop for LocalSubscription {
    fn drop(&mut self) {
        self.broker.shared.unregister(self.id, &self.channels);
    }
}
