//! Transport layer for broker communication
//!
//! This module provides the transport abstraction and its MQTT
//! implementation. The [`MessageBus`] trait is the seam between the sync
//! engine and the broker, enabling dependency injection and testing.

pub mod mqtt;

/// Callback invoked once per inbound message with the raw payload bytes.
///
/// Handlers run on the transport's event loop task; they must not block.
pub type MessageHandler = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Broker-facing publish/subscribe abstraction.
///
/// All traffic is QoS 1 and non-retained. Publish failures are logged by the
/// implementation rather than surfaced - a lost state publish is repaired by
/// the next resync, so callers have nothing useful to do with the error.
#[async_trait::async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish `payload` to `topic`
    async fn publish(&self, topic: &str, payload: String);

    /// Register `handler` for messages arriving on exactly `topic`.
    ///
    /// Subscribing to the same topic again replaces the previous handler.
    /// Subscriptions survive reconnects: the transport re-subscribes every
    /// registered topic on each new session.
    async fn subscribe(&self, topic: &str, handler: MessageHandler);
}
