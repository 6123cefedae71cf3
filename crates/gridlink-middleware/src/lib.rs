//! `gridlink-middleware` – the simulation's pub/sub bridge
//!
//! Moves events and requests between simulation components through an
//! external message broker without caring what the payloads mean.
//!
//! # Modules
//!
//! - [`broker`] – the [`Broker`] / [`BrokerSubscription`] seam that a broker
//!   client implements.
//! - [`local_broker`] – [`LocalBroker`], an in-process broker for tests and
//!   single-process runs.
//! - [`event_gate`] – [`EventGate`], the single-slot wait/resume handshake.
//! - [`worker`] – [`Worker`], an owned background thread draining one
//!   subscription context.
//! - [`connection`] – [`Connection`], the base bridge: publish plus
//!   subscribe-and-spawn on the event and response contexts.
//! - [`resettable`] – [`ResettableBridge`], at most one worker, resettable.
//! - [`deferred`] – [`DeferredBridge`], register in phases, activate once.
//! - [`blocking`] – [`BlockingRequester`], publish then poll until a
//!   predicate holds or the response timeout expires.
//! - [`inbox`] – [`Inbox`], an enqueue-only callback target drained by the
//!   domain's own thread.
//! - [`config`] – [`BridgeConfig`] timing constants.
//! - [`telemetry`] – `tracing` subscriber setup.
//!
//! # Callback failures
//!
//! A callback that panics is isolated: the panic is caught at dispatch,
//! logged at `error` level and counted on the worker, and draining continues
//! with the next message.

pub mod blocking;
pub mod broker;
pub mod config;
pub mod connection;
pub mod context;
pub mod deferred;
pub mod event_gate;
pub mod inbox;
pub mod local_broker;
pub mod resettable;
pub mod telemetry;
pub mod worker;

#[cfg(test)]
mod testing;

pub use blocking::BlockingRequester;
pub use broker::{Broker, BrokerSubscription};
pub use config::BridgeConfig;
pub use connection::Connection;
pub use context::{Callback, ChannelMap, ContextKind, callback};
pub use deferred::DeferredBridge;
pub use event_gate::EventGate;
pub use gridlink_types::{BridgeError, Message};
pub use inbox::Inbox;
pub use local_broker::LocalBroker;
pub use resettable::ResettableBridge;
pub use worker::Worker;
