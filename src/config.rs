//! Bridge configuration loaded from TOML.
//!
//! The configuration layer hands the rest of the crate already-typed values
//! (strings, string lists, durations). Credentials follow the env-var
//! indirection pattern: the file names the variable, never the secret.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Main bridge configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    pub mqtt: MqttSection,
    #[serde(default)]
    pub homeassistant: HomeAssistantSection,
    /// Active sensor modules, instantiated in listed order
    #[serde(default)]
    pub modules: Vec<String>,
    /// Global polling period override, applied where a module did not set
    /// its own period
    pub period_secs: Option<u64>,
    /// WAN module settings
    pub wan: Option<WanSection>,
}

/// MQTT section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// MQTT broker URL with protocol and port
    pub broker_url: String,
    /// Root topic under which all bridge state is published
    pub base_topic: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
}

impl MqttSection {
    /// Username from the configured environment variable
    pub fn username(&self) -> Option<String> {
        Self::env_var(self.username_env.as_ref())
    }

    /// Password from the configured environment variable
    pub fn password(&self) -> Option<String> {
        Self::env_var(self.password_env.as_ref())
    }

    fn env_var(name: Option<&String>) -> Option<String> {
        name.and_then(|name| std::env::var(name).ok())
    }
}

/// Home Assistant section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HomeAssistantSection {
    /// Topic on which the hub announces it has (re)started
    #[serde(default = "default_birth_message_topic")]
    pub birth_message_topic: String,
    #[serde(default)]
    pub discovery: DiscoverySection,
}

impl Default for HomeAssistantSection {
    fn default() -> Self {
        Self {
            birth_message_topic: default_birth_message_topic(),
            discovery: DiscoverySection::default(),
        }
    }
}

fn default_birth_message_topic() -> String {
    "homeassistant/status".to_string()
}

/// Discovery section; an empty prefix disables discovery entirely
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoverySection {
    #[serde(default = "default_discovery_prefix")]
    pub prefix: String,
    /// Node identifier used in object ids and the device block.
    /// Required whenever discovery is enabled.
    pub node_id: Option<String>,
    /// Explicit unique id; derived from the MAC address when absent
    pub unique_id: Option<String>,
    /// Network interfaces probed for a MAC address, first readable wins
    #[serde(default = "default_mac_source")]
    pub mac_source: Vec<String>,
    /// Settle delay between advertising entities and publishing their state
    #[serde(default = "default_status_delay_secs")]
    pub status_delay_secs: u64,
    /// Minimum interval between full resyncs; 0 resyncs on every
    /// connection event
    #[serde(default)]
    pub min_resync_secs: u64,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            prefix: default_discovery_prefix(),
            node_id: None,
            unique_id: None,
            mac_source: default_mac_source(),
            status_delay_secs: default_status_delay_secs(),
            min_resync_secs: 0,
        }
    }
}

fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}

fn default_mac_source() -> Vec<String> {
    vec!["eth0".to_string(), "enp3s0".to_string(), "wlan0".to_string()]
}

fn default_status_delay_secs() -> u64 {
    15
}

/// WAN module section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WanSection {
    /// Entities to expose; defaults to both link and ip
    pub entities: Option<Vec<String>>,
    pub link_period_secs: Option<u64>,
    pub ip_period_secs: Option<u64>,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: BridgeConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.base_topic.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "mqtt.base_topic must not be empty".to_string(),
            ));
        }
        let discovery = &self.homeassistant.discovery;
        if !discovery.prefix.is_empty() && discovery.node_id.is_none() {
            return Err(ConfigError::InvalidConfig(
                "homeassistant.discovery.node_id is required when discovery is enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Settle delay between discovery advertisement and state publishes
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.homeassistant.discovery.status_delay_secs)
    }

    /// Minimum interval between full resyncs
    pub fn min_resync_interval(&self) -> Duration {
        Duration::from_secs(self.homeassistant.discovery.min_resync_secs)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
modules = ["wan"]

[mqtt]
broker_url = "mqtt://localhost:1883"
base_topic = "habridge/testhost"

[homeassistant.discovery]
node_id = "testhost"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let toml_content = r#"
modules = ["wan"]
period_secs = 120

[mqtt]
broker_url = "mqtt://localhost:1883"
base_topic = "habridge/pi"
username_env = "MQTT_USERNAME"
password_env = "MQTT_PASSWORD"

[homeassistant]
birth_message_topic = "hass/status"

[homeassistant.discovery]
prefix = "hass"
node_id = "pi"
mac_source = ["eth1"]
status_delay_secs = 5
min_resync_secs = 30

[wan]
entities = ["link"]
link_period_secs = 30
"#;

        let config: BridgeConfig = toml::from_str(toml_content).unwrap();
        config.validate().unwrap();
        assert_eq!(config.mqtt.base_topic, "habridge/pi");
        assert_eq!(config.modules, vec!["wan"]);
        assert_eq!(config.period_secs, Some(120));
        assert_eq!(config.homeassistant.birth_message_topic, "hass/status");
        assert_eq!(config.homeassistant.discovery.prefix, "hass");
        assert_eq!(config.homeassistant.discovery.mac_source, vec!["eth1"]);
        assert_eq!(config.settle_delay(), Duration::from_secs(5));
        assert_eq!(config.min_resync_interval(), Duration::from_secs(30));
        let wan = config.wan.unwrap();
        assert_eq!(wan.entities, Some(vec!["link".to_string()]));
        assert_eq!(wan.link_period_secs, Some(30));
        assert_eq!(wan.ip_period_secs, None);
    }

    #[test]
    fn test_minimal_config_defaults() {
        let toml_content = r#"
[mqtt]
broker_url = "mqtt://localhost:1883"
base_topic = "habridge/minimal"

[homeassistant.discovery]
node_id = "minimal"
"#;

        let config: BridgeConfig = toml::from_str(toml_content).unwrap();
        config.validate().unwrap();
        assert_eq!(
            config.homeassistant.birth_message_topic,
            "homeassistant/status"
        );
        assert_eq!(config.homeassistant.discovery.prefix, "homeassistant");
        assert_eq!(
            config.homeassistant.discovery.mac_source,
            vec!["eth0", "enp3s0", "wlan0"]
        );
        assert_eq!(config.settle_delay(), Duration::from_secs(15));
        assert_eq!(config.min_resync_interval(), Duration::ZERO);
        assert!(config.modules.is_empty());
        assert!(config.wan.is_none());
    }

    #[test]
    fn test_credentials_resolved_from_env() {
        let section = MqttSection {
            broker_url: "mqtt://localhost:1883".to_string(),
            base_topic: "habridge/x".to_string(),
            username_env: Some("HABRIDGE_TEST_MQTT_USERNAME".to_string()),
            password_env: Some("HABRIDGE_TEST_MQTT_PASSWORD_UNSET".to_string()),
        };

        std::env::set_var("HABRIDGE_TEST_MQTT_USERNAME", "bridge-user");
        assert_eq!(section.username(), Some("bridge-user".to_string()));
        assert_eq!(section.password(), None);
        std::env::remove_var("HABRIDGE_TEST_MQTT_USERNAME");
    }

    #[test]
    fn test_credentials_absent_without_env_names() {
        let section = MqttSection {
            broker_url: "mqtt://localhost:1883".to_string(),
            base_topic: "habridge/x".to_string(),
            username_env: None,
            password_env: None,
        };
        assert_eq!(section.username(), None);
        assert_eq!(section.password(), None);
    }

    #[test]
    fn test_empty_base_topic_rejected() {
        let toml_content = r#"
[mqtt]
broker_url = "mqtt://localhost:1883"
base_topic = ""
"#;
        let config: BridgeConfig = toml::from_str(toml_content).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_node_id_required_when_discovery_enabled() {
        let toml_content = r#"
[mqtt]
broker_url = "mqtt://localhost:1883"
base_topic = "habridge/x"
"#;
        let config: BridgeConfig = toml::from_str(toml_content).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_node_id_not_required_when_discovery_disabled() {
        let toml_content = r#"
[mqtt]
broker_url = "mqtt://localhost:1883"
base_topic = "habridge/x"

[homeassistant.discovery]
prefix = ""
"#;
        let config: BridgeConfig = toml::from_str(toml_content).unwrap();
        config.validate().unwrap();
    }
}
