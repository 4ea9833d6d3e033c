//! Topic-prefixed publish/subscribe bindings handed to modules.
//!
//! A module only ever sees subtopics relative to its own base; the binding
//! supplies the prefix. Rebinding a module to a fresh [`ScopedPubSub`] is
//! exactly how reconnection is propagated - the binding itself is stateless
//! beyond its base topic, so swapping it is always safe.

use crate::transport::{MessageBus, MessageHandler};
use std::sync::Arc;

/// Publish/subscribe handle bound to one base topic
#[async_trait::async_trait]
pub trait PubSub: Send + Sync {
    /// Publish `value` to `base_topic + subtopic`, QoS 1, non-retained
    async fn publish(&self, subtopic: &str, value: String);

    /// Register `handler` for messages on `base_topic + subtopic`
    async fn subscribe(&self, subtopic: &str, handler: MessageHandler);
}

/// Live binding over a [`MessageBus`]
pub struct ScopedPubSub {
    bus: Arc<dyn MessageBus>,
    base_topic: String,
}

impl ScopedPubSub {
    pub fn new(bus: Arc<dyn MessageBus>, base_topic: impl Into<String>) -> Self {
        Self {
            bus,
            base_topic: base_topic.into(),
        }
    }
}

#[async_trait::async_trait]
impl PubSub for ScopedPubSub {
    async fn publish(&self, subtopic: &str, value: String) {
        let topic = format!("{}{}", self.base_topic, subtopic);
        self.bus.publish(&topic, value).await;
    }

    async fn subscribe(&self, subtopic: &str, handler: MessageHandler) {
        let topic = format!("{}{}", self.base_topic, subtopic);
        self.bus.subscribe(&topic, handler).await;
    }
}

/// Binding that discards everything.
///
/// Modules are born bound to this, so their publish paths need no connected
/// check; the first sync after a connection swaps in the real binding.
pub struct StubPubSub;

#[async_trait::async_trait]
impl PubSub for StubPubSub {
    async fn publish(&self, _subtopic: &str, _value: String) {}

    async fn subscribe(&self, _subtopic: &str, _handler: MessageHandler) {}
}
