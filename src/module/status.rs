//! Root module publishing the bridge's own availability and version.
//!
//! Registered under the empty name, so it publishes directly on the base
//! topic: `{base}` = online/offline (the offline side comes from the broker
//! via the last will) and `{base}/version`.

use super::{Discoverable, EntityConfig, Module};
use crate::pubsub::{PubSub, StubPubSub};
use serde_json::{json, Value};
use std::sync::Arc;

pub struct StatusModule {
    ps: Arc<dyn PubSub>,
}

impl StatusModule {
    pub fn new() -> Self {
        Self {
            ps: Arc::new(StubPubSub),
        }
    }
}

impl Default for StatusModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Module for StatusModule {
    async fn sync(&mut self, ps: Arc<dyn PubSub>) {
        self.ps = ps;
        self.publish().await;
    }

    async fn publish(&self) {
        self.ps.publish("", "online".to_string()).await;
        self.ps
            .publish("/version", env!("CARGO_PKG_VERSION").to_string())
            .await;
    }

    fn discovery(&self) -> Option<&dyn Discoverable> {
        Some(self)
    }
}

impl Discoverable for StatusModule {
    fn entities(&self) -> Vec<EntityConfig> {
        let config = json!({
            "name": "status",
            "object_id": "{{.NodeId}}_status",
            "state_topic": "~",
            "device_class": "connectivity",
            "payload_on": "online",
            "payload_off": "offline",
        });
        let Value::Object(config) = config else {
            unreachable!("literal is an object")
        };
        vec![EntityConfig::new("status", "binary_sensor", config)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::ScopedPubSub;
    use crate::testing::mocks::MockBus;

    #[tokio::test]
    async fn test_sync_publishes_online_and_version() {
        let bus = Arc::new(MockBus::new());
        let mut module = StatusModule::new();

        module
            .sync(Arc::new(ScopedPubSub::new(bus.clone(), "habridge/host")))
            .await;

        let published = bus.published().await;
        assert_eq!(published.len(), 2);
        assert_eq!(
            published[0],
            ("habridge/host".to_string(), "online".to_string())
        );
        assert_eq!(published[1].0, "habridge/host/version");
        assert_eq!(published[1].1, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_publish_before_sync_is_a_noop() {
        // Born bound to the stub; publishing must be safe with no connection
        let module = StatusModule::new();
        module.publish().await;
    }

    #[test]
    fn test_discovery_entity() {
        let module = StatusModule::new();
        let entities = module.discovery().unwrap().entities();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "status");
        assert_eq!(entities[0].class, "binary_sensor");
        assert_eq!(entities[0].config["state_topic"], "~");
        assert_eq!(entities[0].config["object_id"], "{{.NodeId}}_status");
    }
}
