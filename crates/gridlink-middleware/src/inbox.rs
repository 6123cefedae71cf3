//! [`Inbox`] – hand messages from worker threads to the domain's own thread.
//!
//! Callbacks run on a worker thread.  Rather than mutating simulation state
//! from there, register [`Inbox::callback`]: it only enqueues a copy of the
//! message, and the owning control thread drains the inbox at its own pace,
//! either with `.await` or synchronously.

use gridlink_types::Message;
use tokio::sync::mpsc;
use tracing::trace;

use crate::context::Callback;

/// Unbounded FIFO of received messages.
pub struct Inbox {
    sender: mpsc::UnboundedSender<Message>,
    receiver: mpsc::UnboundedReceiver<Message>,
}

impl Inbox {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self { sender, receiver }
    }

    /// A callback that enqueues every message it is handed.
    ///
    /// May be registered on any number of channels and bridges.
    pub fn callback(&self) -> Callback {
        let sender = self.sender.clone();
        std::sync::Arc::new(move |message: &Message| {
            if sender.send(message.clone()).is_err() {
                trace!(channel = %message.channel, "inbox dropped; message discarded");
            }
        })
    }

    /// Wait for the next message.
    ///
    /// The inbox keeps a sender of its own, so this only returns `None` after
    /// [`close`](Self::close).
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    /// Blocking variant of [`recv`](Self::recv) for threads outside a Tokio
    /// runtime.
    ///
    /// # Panics
    ///
    /// When called from within an asynchronous execution context.
    pub fn blocking_recv(&mut self) -> Option<Message> {
        self.receiver.blocking_recv()
    }

    /// Take the next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.receiver.try_recv().ok()
    }

    /// Take every queued message.
    pub fn drain(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(message) = self.receiver.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Stop accepting messages; already queued ones can still be received.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}
