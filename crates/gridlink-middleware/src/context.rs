//! Subscription contexts and callback dispatch.
//!
//! A [`SubscriptionContext`] pairs one broker subscription with the registry
//! of callbacks for its channels.  Bridges share a context with their worker
//! as a [`SharedContext`]; the mutex is held for one bounded retrieval at a
//! time and released before the callback runs, so a callback may publish or
//! register channels on the same bridge.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use gridlink_types::{BridgeError, Message};
use parking_lot::Mutex;
use tracing::{error, trace};

use crate::broker::BrokerSubscription;

/// Handler invoked for every message on a subscribed channel.
pub type Callback = Arc<dyn Fn(&Message) + Send + Sync>;

/// Channel name → callback, as accepted by the multi-channel subscribe calls.
pub type ChannelMap = HashMap<String, Callback>;

/// Context shared between a bridge and the worker draining it.
pub type SharedContext = Arc<Mutex<SubscriptionContext>>;

/// Wrap a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&Message) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Which of a connection's two independent contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    /// Broadcast events (market cycles, ticks, trades).
    Event,
    /// Replies to requests this side published.
    Response,
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextKind::Event => write!(f, "event"),
            ContextKind::Response => write!(f, "response"),
        }
    }
}

/// One broker subscription plus its channel → callback registry.
pub struct SubscriptionContext {
    kind: ContextKind,
    subscription: Box<dyn BrokerSubscription>,
    registry: HashMap<String, Callback>,
}

impl SubscriptionContext {
    pub fn new(kind: ContextKind, subscription: Box<dyn BrokerSubscription>) -> Self {
        Self {
            kind,
            subscription,
            registry: HashMap::new(),
        }
    }

    pub fn shared(kind: ContextKind, subscription: Box<dyn BrokerSubscription>) -> SharedContext {
        Arc::new(Mutex::new(Self::new(kind, subscription)))
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    /// Subscribe to `channel` and bind `callback` to it.
    ///
    /// Re-registering a channel replaces its callback.
    pub fn register(&mut self, channel: &str, callback: Callback) -> Result<(), BridgeError> {
        self.subscription.subscribe(channel)?;
        self.registry.insert(channel.to_string(), callback);
        Ok(())
    }

    /// Register several channels as one unit.
    ///
    /// If any subscribe fails, every callback bound by this call is removed
    /// again and replaced ones are restored.  Channels already subscribed at
    /// the broker stay subscribed; their messages are dropped as unrouted.
    pub fn register_all<I>(&mut self, channels: I) -> Result<(), BridgeError>
    where
        I: IntoIterator<Item = (String, Callback)>,
    {
        let mut undo: Vec<(String, Option<Callback>)> = Vec::new();
        for (channel, callback) in channels {
            if let Err(e) = self.subscription.subscribe(&channel) {
                for (channel, previous) in undo.into_iter().rev() {
                    match previous {
                        Some(callback) => self.registry.insert(channel, callback),
                        None => self.registry.remove(&channel),
                    };
                }
                return Err(e);
            }
            let previous = self.registry.insert(channel.clone(), callback);
            undo.push((channel, previous));
        }
        Ok(())
    }

    /// Registered channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.registry.keys().cloned().collect();
        channels.sort();
        channels
    }

    pub fn is_registered(&self, channel: &str) -> bool {
        self.registry.contains_key(channel)
    }

    /// Retrieve at most one message, waiting up to `timeout`.
    ///
    /// Messages on a channel without a callback are dropped and reported as
    /// `Ok(None)`.
    pub fn next_delivery(&mut self, timeout: Duration) -> Result<Option<Delivery>, BridgeError> {
        let Some(message) = self.subscription.get_message(timeout)? else {
            return Ok(None);
        };
        match self.registry.get(&message.channel) {
            Some(callback) => Ok(Some(Delivery {
                callback: Arc::clone(callback),
                message,
            })),
            None => {
                trace!(context = %self.kind, channel = %message.channel, "no callback registered; message dropped");
                Ok(None)
            }
        }
    }

    /// Forget every callback and close the broker subscription.
    pub fn close(&mut self) -> Result<(), BridgeError> {
        self.registry.clear();
        self.subscription.close()
    }
}

/// A retrieved message together with the callback it is routed to.
pub struct Delivery {
    message: Message,
    callback: Callback,
}

impl Delivery {
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Run the callback on the current thread.
    ///
    /// A panicking callback is contained here: the panic is logged and the
    /// message is lost, but the caller keeps running.  Returns `false` when
    /// the callback panicked.
    pub fn dispatch(self) -> bool {
        let Delivery { message, callback } = self;
        match panic::catch_unwind(AssertUnwindSafe(|| callback(&message))) {
            Ok(()) => true,
            Err(cause) => {
                error!(
                    channel = %message.channel,
                    panic = %panic_message(cause.as_ref()),
                    "callback panicked; message dropped"
                );
                false
            }
        }
    }
}

fn panic_message(cause: &(dyn Any + Send)) -> String {
    if let Some(s) = cause.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = cause.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
