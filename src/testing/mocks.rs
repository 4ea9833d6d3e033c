//! Mock implementations for testing

use crate::module::wan::WanProbe;
use crate::transport::{MessageBus, MessageHandler};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// In-memory message bus recording publishes and subscriptions.
///
/// Inbound traffic is simulated with [`inject`](MockBus::inject), which
/// invokes the registered handler the way the MQTT event loop would.
#[derive(Default)]
pub struct MockBus {
    published: Mutex<Vec<(String, String)>>,
    subscriptions: Mutex<HashMap<String, MessageHandler>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// All publishes so far, as (topic, payload) in publish order
    pub async fn published(&self) -> Vec<(String, String)> {
        self.published.lock().await.clone()
    }

    /// Publishes whose topic starts with `prefix`
    pub async fn published_matching(&self, prefix: &str) -> Vec<(String, String)> {
        self.published
            .lock()
            .await
            .iter()
            .filter(|(topic, _)| topic.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub async fn clear(&self) {
        self.published.lock().await.clear();
    }

    /// Topics with a registered handler
    pub async fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.subscriptions.lock().await.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Deliver an inbound message to the handler registered for `topic`.
    /// Returns false when no handler is registered.
    pub async fn inject(&self, topic: &str, payload: &[u8]) -> bool {
        let subs = self.subscriptions.lock().await;
        match subs.get(topic) {
            Some(handler) => {
                handler(payload);
                true
            }
            None => false,
        }
    }
}

#[async_trait::async_trait]
impl MessageBus for MockBus {
    async fn publish(&self, topic: &str, payload: String) {
        self.published.lock().await.push((topic.to_string(), payload));
    }

    async fn subscribe(&self, topic: &str, handler: MessageHandler) {
        self.subscriptions
            .lock()
            .await
            .insert(topic.to_string(), handler);
    }
}

struct MockProbeState {
    link_up: bool,
    public_ip: Option<String>,
    probe_count: u32,
}

/// Scriptable WAN probe
pub struct MockProbe {
    state: Mutex<MockProbeState>,
}

impl MockProbe {
    pub fn new(link_up: bool, public_ip: Option<&str>) -> Self {
        Self {
            state: Mutex::new(MockProbeState {
                link_up,
                public_ip: public_ip.map(String::from),
                probe_count: 0,
            }),
        }
    }

    pub async fn set_link_up(&self, link_up: bool) {
        self.state.lock().await.link_up = link_up;
    }

    pub async fn set_public_ip(&self, public_ip: Option<&str>) {
        self.state.lock().await.public_ip = public_ip.map(String::from);
    }

    /// Number of probe calls observed, across both sensors
    pub async fn probe_count(&self) -> u32 {
        self.state.lock().await.probe_count
    }
}

#[async_trait::async_trait]
impl WanProbe for MockProbe {
    async fn link_up(&self) -> bool {
        let mut state = self.state.lock().await;
        state.probe_count += 1;
        state.link_up
    }

    async fn public_ip(&self) -> Option<String> {
        let mut state = self.state.lock().await;
        state.probe_count += 1;
        state.public_ip.clone()
    }
}
