//! The Broker Seam.
//!
//! gridlink never speaks to a particular message broker directly.  The
//! bridges talk to these two traits, and a broker client (Redis, NATS, the
//! in-process [`LocalBroker`][crate::local_broker::LocalBroker], …) implements
//! them.
//!
//! # Overview
//!
//! - [`Broker`] – the connection handle: publishing and opening subscription
//!   contexts.
//! - [`BrokerSubscription`] – one subscription context: a set of channels
//!   feeding a single receive cursor.

use std::time::Duration;

use gridlink_types::{BridgeError, Message};

/// A connection to an external publish/subscribe broker.
///
/// # Contract
///
/// * `publish` – fire-and-forget send.  Returns the number of subscriptions
///   that were handed the payload.  Transport failures are returned, never
///   retried.
///
/// * `open_subscription` – creates a fresh, independent subscription context.
///   Each bridge opens two of them (events and responses).
pub trait Broker: Send + Sync {
    fn publish(&self, channel: &str, payload: &[u8]) -> Result<usize, BridgeError>;

    fn open_subscription(&self) -> Result<Box<dyn BrokerSubscription>, BridgeError>;
}

/// One subscription context: every subscribed channel feeds the same cursor,
/// and messages come out in the order the broker delivered them.
pub trait BrokerSubscription: Send {
    /// Add `channel` to this context.  Subscribing twice is a no-op.
    fn subscribe(&mut self, channel: &str) -> Result<(), BridgeError>;

    /// Wait up to `timeout` for the next message.  `Ok(None)` means nothing
    /// arrived in time.
    fn get_message(&mut self, timeout: Duration) -> Result<Option<Message>, BridgeError>;

    /// Drop every channel and any undelivered messages.
    ///
    /// The context stays usable: a later `subscribe` starts over.
    fn close(&mut self) -> Result<(), BridgeError>;
}
