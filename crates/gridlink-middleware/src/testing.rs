//! Broker doubles for failure-path tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use gridlink_types::{BridgeError, Message};

use crate::broker::{Broker, BrokerSubscription};
use crate::local_broker::LocalBroker;

/// A [`LocalBroker`] whose subscriptions misbehave on request.
#[derive(Clone)]
pub(crate) struct FaultyBroker {
    inner: LocalBroker,
    fail_close: bool,
    refused_channel: Option<String>,
    close_attempts: Arc<AtomicUsize>,
}

impl FaultyBroker {
    /// Every `close` fails.
    pub(crate) fn failing_close() -> Self {
        Self {
            inner: LocalBroker::new(),
            fail_close: true,
            refused_channel: None,
            close_attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Subscribing to `channel` fails; everything else works.
    pub(crate) fn refusing(channel: &str) -> Self {
        Self {
            inner: LocalBroker::new(),
            fail_close: false,
            refused_channel: Some(channel.to_string()),
            close_attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn close_attempts(&self) -> usize {
        self.close_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn local(&self) -> &LocalBroker {
        &self.inner
    }
}

impl Broker for FaultyBroker {
    fn publish(&self, channel: &str, payload: &[u8]) -> Result<usize, BridgeError> {
        self.inner.publish(channel, payload)
    }

    fn open_subscription(&self) -> Result<Box<dyn BrokerSubscription>, BridgeError> {
        Ok(Box::new(FaultySubscription {
            inner: self.inner.open_subscription()?,
            fail_close: self.fail_close,
            refused_channel: self.refused_channel.clone(),
            close_attempts: Arc::clone(&self.close_attempts),
        }))
    }
}

struct FaultySubscription {
    inner: Box<dyn BrokerSubscription>,
    fail_close: bool,
    refused_channel: Option<String>,
    close_attempts: Arc<AtomicUsize>,
}

impl BrokerSubscription for FaultySubscription {
    fn subscribe(&mut self, channel: &str) -> Result<(), BridgeError> {
        if self.refused_channel.as_deref() == Some(channel) {
            return Err(BridgeError::Broker(format!("subscribe to {channel} refused")));
        }
        self.inner.subscribe(channel)
    }

    fn get_message(&mut self, timeout: Duration) -> Result<Option<Message>, BridgeError> {
        self.inner.get_message(timeout)
    }

    fn close(&mut self) -> Result<(), BridgeError> {
        self.close_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(BridgeError::Broker("connection reset while closing".to_string()));
        }
        self.inner.close()
    }
}
