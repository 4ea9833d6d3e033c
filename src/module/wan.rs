//! WAN connectivity module: link reachability and public IP.
//!
//! Two independently polled sensors. Link state is probed by resolving a
//! well-known host; the public IP comes from an HTTP echo service. Probe
//! failures never surface as errors - they fold into the published state
//! ("offline" / "unknown"). Until the first probe completes the link state
//! is unknown and nothing is published for it.
//!
//! Periodic refreshes are delta-suppressed: a value is only published when
//! it differs from the last-known one. Forced refreshes (the poller's first
//! tick) publish unconditionally.

use super::{online_str, Discoverable, EntityConfig, Module};
use crate::poller::Poller;
use crate::pubsub::{PubSub, StubPubSub};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const LINK_PROBE_HOST: &str = "www.google.com:443";
const IP_ECHO_URL: &str = "https://api.ipify.org";

/// Resolved WAN module settings
#[derive(Debug, Clone)]
pub struct WanModuleConfig {
    pub link_enabled: bool,
    pub ip_enabled: bool,
    pub link_period: Duration,
    pub ip_period: Duration,
}

impl Default for WanModuleConfig {
    fn default() -> Self {
        Self {
            link_enabled: true,
            ip_enabled: true,
            link_period: Duration::from_secs(60),
            ip_period: Duration::from_secs(900),
        }
    }
}

/// External probes the WAN sensors run against
#[async_trait::async_trait]
pub trait WanProbe: Send + Sync {
    /// Whether the WAN link is currently usable
    async fn link_up(&self) -> bool;

    /// The current public IP address, if it could be determined
    async fn public_ip(&self) -> Option<String>;
}

/// Production probe: DNS resolution for the link, HTTP IP echo for the
/// public address, both with a bounded timeout
pub struct DefaultWanProbe {
    http: reqwest::Client,
}

impl DefaultWanProbe {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for DefaultWanProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl WanProbe for DefaultWanProbe {
    async fn link_up(&self) -> bool {
        matches!(
            tokio::time::timeout(PROBE_TIMEOUT, tokio::net::lookup_host(LINK_PROBE_HOST)).await,
            Ok(Ok(_))
        )
    }

    async fn public_ip(&self) -> Option<String> {
        let response = self
            .http
            .get(IP_ECHO_URL)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .ok()?;
        let body = response.text().await.ok()?;
        let ip = body.trim();
        if ip.is_empty() {
            None
        } else {
            Some(ip.to_string())
        }
    }
}

/// Last-known sensor values plus the currently bound PubSub handle.
///
/// The link state stays `None` until the first probe completes, so a sync
/// racing that probe reports nothing rather than a guessed "offline".
///
/// The binding is written only by the sync engine and read by the poller
/// callbacks; the mutex makes the swap safe without further coordination.
struct WanState {
    online: Option<bool>,
    ip: String,
    ps: Arc<dyn PubSub>,
}

pub struct WanModule {
    config: WanModuleConfig,
    state: Arc<Mutex<WanState>>,
    pollers: Vec<Poller>,
}

impl WanModule {
    /// Construct the module and start its pollers
    pub fn new(config: WanModuleConfig, probe: Arc<dyn WanProbe>) -> Self {
        let state = Arc::new(Mutex::new(WanState {
            online: None,
            ip: "unknown".to_string(),
            ps: Arc::new(StubPubSub),
        }));

        let mut pollers = Vec::new();
        if config.link_enabled {
            let state = state.clone();
            let probe = probe.clone();
            pollers.push(Poller::spawn(config.link_period, move |forced| {
                Self::refresh_link(state.clone(), probe.clone(), forced)
            }));
        }
        if config.ip_enabled {
            let state = state.clone();
            let probe = probe.clone();
            pollers.push(Poller::spawn(config.ip_period, move |forced| {
                Self::refresh_ip(state.clone(), probe.clone(), forced)
            }));
        }

        Self {
            config,
            state,
            pollers,
        }
    }

    /// Probe the link and publish on change, or unconditionally when forced
    async fn refresh_link(state: Arc<Mutex<WanState>>, probe: Arc<dyn WanProbe>, forced: bool) {
        let online = probe.link_up().await;
        let ps = {
            let mut state = state.lock().await;
            if state.online == Some(online) && !forced {
                return;
            }
            state.online = Some(online);
            state.ps.clone()
        };
        ps.publish("", online_str(online).to_string()).await;
    }

    /// Probe the public IP and publish on change, or unconditionally when
    /// forced; an unreachable probe reads as "unknown"
    async fn refresh_ip(state: Arc<Mutex<WanState>>, probe: Arc<dyn WanProbe>, forced: bool) {
        let ip = probe
            .public_ip()
            .await
            .unwrap_or_else(|| "unknown".to_string());
        let ps = {
            let mut state = state.lock().await;
            if state.ip == ip && !forced {
                return;
            }
            state.ip = ip.clone();
            state.ps.clone()
        };
        ps.publish("/ip", ip).await;
    }
}

#[async_trait::async_trait]
impl Module for WanModule {
    async fn sync(&mut self, ps: Arc<dyn PubSub>) {
        {
            let mut state = self.state.lock().await;
            state.ps = ps;
        }
        self.publish().await;
    }

    async fn publish(&self) {
        let (online, ip, ps) = {
            let state = self.state.lock().await;
            (state.online, state.ip.clone(), state.ps.clone())
        };
        if self.config.link_enabled {
            // Nothing truthful to report until the first probe has completed
            if let Some(online) = online {
                ps.publish("", online_str(online).to_string()).await;
            }
        }
        if self.config.ip_enabled {
            ps.publish("/ip", ip).await;
        }
    }

    fn discovery(&self) -> Option<&dyn Discoverable> {
        Some(self)
    }

    async fn close(&mut self) {
        for poller in &mut self.pollers {
            poller.close().await;
        }
    }
}

impl Discoverable for WanModule {
    fn entities(&self) -> Vec<EntityConfig> {
        let mut entities = Vec::new();
        if self.config.link_enabled {
            let config = json!({
                "name": "WAN",
                "state_topic": "~/wan",
                "device_class": "connectivity",
                "payload_on": "online",
                "payload_off": "offline",
            });
            let Value::Object(config) = config else {
                unreachable!("literal is an object")
            };
            entities.push(EntityConfig::new("link", "binary_sensor", config));
        }
        if self.config.ip_enabled {
            let mut config = json!({
                "name": "WAN IP",
                "state_topic": "~/wan/ip",
            });
            if self.config.link_enabled {
                // The IP is only meaningful while the link sensor agrees the
                // WAN is up
                config["availability"] = json!([
                    { "topic": "~" },
                    { "topic": "~/wan" },
                ]);
                config["availability_mode"] = json!("all");
            }
            let Value::Object(config) = config else {
                unreachable!("literal is an object")
            };
            entities.push(EntityConfig::new("ip", "sensor", config));
        }
        entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::ScopedPubSub;
    use crate::testing::mocks::{MockBus, MockProbe};

    fn quiet_config() -> WanModuleConfig {
        // Periods long enough that pollers never tick past the forced first
        // tick during a test
        WanModuleConfig {
            link_enabled: true,
            ip_enabled: true,
            link_period: Duration::from_secs(3600),
            ip_period: Duration::from_secs(3600),
        }
    }

    async fn bound_module(bus: &Arc<MockBus>, probe: Arc<MockProbe>) -> WanModule {
        let mut module = WanModule::new(quiet_config(), probe);
        module
            .sync(Arc::new(ScopedPubSub::new(bus.clone(), "base/wan")))
            .await;
        // Stop the pollers so the tests drive every refresh themselves
        module.close().await;
        module
    }

    #[tokio::test]
    async fn test_delta_suppression_unchanged_value_publishes_once() {
        let bus = Arc::new(MockBus::new());
        let probe = Arc::new(MockProbe::new(true, Some("1.2.3.4")));
        let module = bound_module(&bus, probe.clone()).await;
        bus.clear().await;

        // First unforced refresh observes a change (no link state stored
        // yet), the second sees the same value again
        WanModule::refresh_link(module.state.clone(), probe.clone(), false).await;
        WanModule::refresh_link(module.state.clone(), probe.clone(), false).await;

        let published = bus.published().await;
        assert_eq!(
            published,
            vec![("base/wan".to_string(), "online".to_string())]
        );
    }

    #[tokio::test]
    async fn test_delta_suppression_matching_stored_state_publishes_zero_times() {
        let bus = Arc::new(MockBus::new());
        let probe = Arc::new(MockProbe::new(false, None));
        let module = bound_module(&bus, probe.clone()).await;

        // Establish known state, then observe the same values again
        WanModule::refresh_link(module.state.clone(), probe.clone(), false).await;
        WanModule::refresh_ip(module.state.clone(), probe.clone(), false).await;
        bus.clear().await;

        WanModule::refresh_link(module.state.clone(), probe.clone(), false).await;
        WanModule::refresh_ip(module.state.clone(), probe.clone(), false).await;

        assert!(bus.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_link_flap_publishes_each_transition_once() {
        let bus = Arc::new(MockBus::new());
        let probe = Arc::new(MockProbe::new(true, None));
        let module = bound_module(&bus, probe.clone()).await;
        bus.clear().await;

        WanModule::refresh_link(module.state.clone(), probe.clone(), false).await;
        probe.set_link_up(false).await;
        WanModule::refresh_link(module.state.clone(), probe.clone(), false).await;
        WanModule::refresh_link(module.state.clone(), probe.clone(), false).await;
        probe.set_link_up(true).await;
        WanModule::refresh_link(module.state.clone(), probe.clone(), false).await;

        assert_eq!(
            bus.published().await,
            vec![
                ("base/wan".to_string(), "online".to_string()),
                ("base/wan".to_string(), "offline".to_string()),
                ("base/wan".to_string(), "online".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_sync_before_first_probe_publishes_no_link_state() {
        let bus = Arc::new(MockBus::new());
        let probe = Arc::new(MockProbe::new(true, None));
        let mut module = WanModule::new(
            WanModuleConfig {
                ip_enabled: false,
                ..quiet_config()
            },
            probe.clone(),
        );

        // The poller has not run yet; neither online nor offline is known,
        // so the first sync must stay silent rather than guess "offline"
        module
            .sync(Arc::new(ScopedPubSub::new(bus.clone(), "base/wan")))
            .await;
        assert!(bus.published().await.is_empty());

        WanModule::refresh_link(module.state.clone(), probe.clone(), true).await;
        module.publish().await;
        assert_eq!(
            bus.published().await,
            vec![
                ("base/wan".to_string(), "online".to_string()),
                ("base/wan".to_string(), "online".to_string()),
            ]
        );
        module.close().await;
    }

    #[tokio::test]
    async fn test_forced_refresh_always_publishes() {
        let bus = Arc::new(MockBus::new());
        let probe = Arc::new(MockProbe::new(false, None));
        let module = bound_module(&bus, probe.clone()).await;
        bus.clear().await;

        WanModule::refresh_link(module.state.clone(), probe.clone(), true).await;
        WanModule::refresh_link(module.state.clone(), probe.clone(), true).await;

        assert_eq!(bus.published().await.len(), 2);
    }

    #[tokio::test]
    async fn test_probe_failure_becomes_unknown() {
        let bus = Arc::new(MockBus::new());
        let probe = Arc::new(MockProbe::new(true, Some("1.2.3.4")));
        let module = bound_module(&bus, probe.clone()).await;
        WanModule::refresh_ip(module.state.clone(), probe.clone(), false).await;
        bus.clear().await;

        probe.set_public_ip(None).await;
        WanModule::refresh_ip(module.state.clone(), probe.clone(), false).await;

        assert_eq!(
            bus.published().await,
            vec![("base/wan/ip".to_string(), "unknown".to_string())]
        );
    }

    #[tokio::test]
    async fn test_publish_republishes_stored_state_without_probing() {
        let bus = Arc::new(MockBus::new());
        let probe = Arc::new(MockProbe::new(true, Some("1.2.3.4")));
        let mut module = bound_module(&bus, probe.clone()).await;
        WanModule::refresh_link(module.state.clone(), probe.clone(), false).await;
        WanModule::refresh_ip(module.state.clone(), probe.clone(), false).await;
        let probes_before = probe.probe_count().await;
        bus.clear().await;

        module.publish().await;

        assert_eq!(
            bus.published().await,
            vec![
                ("base/wan".to_string(), "online".to_string()),
                ("base/wan/ip".to_string(), "1.2.3.4".to_string()),
            ]
        );
        assert_eq!(probe.probe_count().await, probes_before);
        module.close().await;
    }

    #[tokio::test]
    async fn test_disabled_entities_not_published_or_advertised() {
        let bus = Arc::new(MockBus::new());
        let config = WanModuleConfig {
            ip_enabled: false,
            ..quiet_config()
        };
        let mut module = WanModule::new(config, Arc::new(MockProbe::new(true, None)));
        module
            .sync(Arc::new(ScopedPubSub::new(bus.clone(), "base/wan")))
            .await;

        let published = bus.published().await;
        assert!(published.iter().all(|(topic, _)| topic == "base/wan"));

        let entities = module.discovery().unwrap().entities();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "link");
        module.close().await;
    }

    #[tokio::test]
    async fn test_ip_entity_availability_depends_on_link_entity() {
        let both = WanModule::new(
            quiet_config(),
            Arc::new(MockProbe::new(false, None)) as Arc<dyn WanProbe>,
        );
        let entities = Discoverable::entities(&both);
        let ip = entities.iter().find(|e| e.name == "ip").unwrap();
        assert_eq!(ip.config["availability_mode"], "all");
        assert_eq!(
            ip.config["availability"],
            json!([{ "topic": "~" }, { "topic": "~/wan" }])
        );

        let ip_only = WanModule::new(
            WanModuleConfig {
                link_enabled: false,
                ..quiet_config()
            },
            Arc::new(MockProbe::new(false, None)) as Arc<dyn WanProbe>,
        );
        let entities = Discoverable::entities(&ip_only);
        assert!(!entities[0].config.contains_key("availability"));
    }
}
