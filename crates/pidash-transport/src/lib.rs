//! Broker connectivity behind the core `Transport` trait.
//!
//! `mqtt::start` owns the rumqttc event loop: it maintains the shared
//! `ConnectionState`, re-subscribes after every reconnect and feeds
//! inbound publishes to the ingest pipeline. Reconnect timing comes from
//! an injected [`ReconnectPolicy`], never from constants buried in the
//! loop.

pub mod mock;
pub mod mqtt;
pub mod reconnect;

pub use mock::MockTransport;
pub use mqtt::{start, MqttRuntime, MqttTransport};
pub use reconnect::ReconnectPolicy;
