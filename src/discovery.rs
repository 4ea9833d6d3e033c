//! Home Assistant discovery payload builder.
//!
//! The topic-to-payload mapping is a pure function of the active module set,
//! the node identity and the MAC-derived unique id: it is computed once at
//! startup, cached, and republished verbatim on every reconnect so the hub
//! always sees fresh ads regardless of broker-side state loss.

use crate::config::DiscoverySection;
use crate::error::{BridgeError, BridgeResult};
use crate::module::Module;
use crate::transport::MessageBus;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

const NODE_ID_TOKEN: &str = "{{.NodeId}}";

/// Cached discovery entries, topic to serialized config payload
pub struct Discovery {
    entries: BTreeMap<String, String>,
}

impl Discovery {
    /// Build the discovery entries for the active modules.
    ///
    /// Returns an empty set when the discovery prefix is empty. Fails when
    /// no MAC address resolves or an entity config cannot be serialized -
    /// both are startup-time configuration faults.
    pub fn build(
        cfg: &DiscoverySection,
        modules: &[(String, Box<dyn Module>)],
        base_topic: &str,
    ) -> BridgeResult<Self> {
        Self::build_with_sys_net(cfg, modules, base_topic, Path::new("/sys/class/net"))
    }

    /// As [`build`](Self::build), with the sysfs network directory
    /// parameterized so tests can supply their own
    pub fn build_with_sys_net(
        cfg: &DiscoverySection,
        modules: &[(String, Box<dyn Module>)],
        base_topic: &str,
        sys_net_dir: &Path,
    ) -> BridgeResult<Self> {
        let mut entries = BTreeMap::new();
        if cfg.prefix.is_empty() {
            return Ok(Self { entries });
        }

        let mac = read_mac(&cfg.mac_source, sys_net_dir)?;
        let uid = cfg
            .unique_id
            .clone()
            .unwrap_or_else(|| format!("dnrt-{}", mac.replace(':', "")));
        let node_id = cfg.node_id.clone().unwrap_or_default();

        for (mod_name, module) in modules {
            let Some(discoverable) = module.discovery() else {
                continue;
            };
            for entity in discoverable.entities() {
                let mut entity_uid = uid.clone();
                if !mod_name.is_empty() {
                    entity_uid.push('-');
                    entity_uid.push_str(mod_name);
                }
                entity_uid.push('-');
                entity_uid.push_str(&entity.name);

                let topic = format!("{}/{}/{}/config", cfg.prefix, entity.class, entity_uid);

                let object_id = format!("{}_{}_{}", node_id, mod_name, entity.name);
                let base_fields =
                    base_fields(base_topic, &node_id, &mac, &entity_uid, &object_id);
                let payload = normalize_config(entity.config, &base_fields, &node_id)?;
                entries.insert(topic, payload);
            }
        }
        Ok(Self { entries })
    }

    /// Publish every cached entry verbatim; idempotent, safe to repeat
    pub async fn advertise(&self, bus: &dyn MessageBus) {
        info!("advertise for ha discovery");
        for (topic, config) in &self.entries {
            bus.publish(topic, config.clone()).await;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }
}

/// Default fields merged into every entity config
fn base_fields(
    base_topic: &str,
    node_id: &str,
    mac: &str,
    unique_id: &str,
    object_id: &str,
) -> Map<String, Value> {
    let fields = json!({
        "~": base_topic,
        "device": {
            "name": node_id,
            "connections": [["mac", mac]],
        },
        "unique_id": unique_id,
        "object_id": object_id,
    });
    match fields {
        Value::Object(map) => map,
        _ => unreachable!("literal is an object"),
    }
}

/// Normalize an entity config map and serialize it to its canonical JSON
/// string form
fn normalize_config(
    mut cfg: Map<String, Value>,
    base_fields: &Map<String, Value>,
    node_id: &str,
) -> BridgeResult<String> {
    for (key, value) in base_fields {
        if !cfg.contains_key(key) {
            cfg.insert(key.clone(), value.clone());
        }
    }

    if !cfg.contains_key("availability_topic") && !cfg.contains_key("availability") {
        cfg.insert("availability_topic".to_string(), json!("~"));
    }
    // An entity whose state topic is the base topic would declare itself as
    // its own availability source
    if cfg.get("state_topic") == Some(&json!("~")) {
        cfg.remove("availability_topic");
    }

    let mut config = Value::Object(cfg);
    substitute_node_id(&mut config, node_id);

    serde_json::to_string(&config).map_err(BridgeError::from)
}

/// Replace the node id template token in every string value, recursively
fn substitute_node_id(value: &mut Value, node_id: &str) {
    match value {
        Value::String(s) => {
            if s.contains(NODE_ID_TOKEN) {
                *s = s.replace(NODE_ID_TOKEN, node_id);
            }
        }
        Value::Array(items) => {
            for item in items {
                substitute_node_id(item, node_id);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                substitute_node_id(item, node_id);
            }
        }
        _ => {}
    }
}

/// Resolve a MAC address from `{sys_net_dir}/{ifname}/address`; the first
/// readable candidate wins
fn read_mac(sources: &[String], sys_net_dir: &Path) -> BridgeResult<String> {
    for source in sources {
        let path = sys_net_dir.join(source).join("address");
        if let Ok(content) = std::fs::read_to_string(&path) {
            let mac = content.trim();
            if !mac.is_empty() {
                return Ok(mac.to_string());
            }
        }
    }
    Err(BridgeError::MacNotFound)
}
