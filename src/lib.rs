//! habridge - MQTT sensor bridge with Home Assistant discovery
//!
//! Bridges local sensor modules (WAN connectivity, public IP, the bridge's
//! own status) to an MQTT broker and serves Home Assistant's MQTT discovery
//! protocol so the exposed entities appear in the hub automatically.
//!
//! # Overview
//!
//! The crate is organized around a small set of collaborators:
//!
//! - [`transport`] - broker connection with retry and connection events
//! - [`pubsub`] - topic-prefixed bindings handed to modules
//! - [`module`] - sensor modules, their pollers and the factory registry
//! - [`discovery`] - the cached discovery topic/payload mapping
//! - [`sync`] - the engine that resynchronizes everything on reconnect
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use habridge::config::BridgeConfig;
//! use habridge::discovery::Discovery;
//! use habridge::module::{Module, ModuleRegistry, StatusModule};
//!
//! # fn demo() -> Result<(), habridge::error::BridgeError> {
//! let config = BridgeConfig::load_from_file(std::path::Path::new("habridge.toml"))?;
//!
//! let mut modules: Vec<(String, Box<dyn Module>)> =
//!     vec![(String::new(), Box::new(StatusModule::new()))];
//! modules.extend(ModuleRegistry::builtin().resolve(&config)?);
//!
//! let discovery = Discovery::build(
//!     &config.homeassistant.discovery,
//!     &modules,
//!     &config.mqtt.base_topic,
//! )?;
//! # let _ = discovery;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod module;
pub mod observability;
pub mod poller;
pub mod pubsub;
pub mod sync;
pub mod testing;
pub mod transport;

pub use config::BridgeConfig;
pub use discovery::Discovery;
pub use error::{BridgeError, BridgeResult};
pub use module::{Module, ModuleRegistry};
pub use poller::Poller;
pub use pubsub::{PubSub, ScopedPubSub, StubPubSub};
pub use sync::{SyncEngine, SyncSettings};
pub use transport::mqtt::MqttClient;
pub use transport::MessageBus;
