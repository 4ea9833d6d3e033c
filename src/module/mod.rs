//! Sensor modules and their capability traits.
//!
//! Every module can [`sync`](Module::sync) and [`publish`](Module::publish);
//! discovery support is an optional capability queried explicitly through
//! [`Module::discovery`] rather than downcasting.

use crate::pubsub::PubSub;
use serde_json::{Map, Value};
use std::sync::Arc;

pub mod registry;
pub mod status;
pub mod wan;

pub use registry::ModuleRegistry;
pub use status::StatusModule;
pub use wan::WanModule;

/// A sensor module owned by the bridge for its whole lifetime
#[async_trait::async_trait]
pub trait Module: Send + Sync {
    /// Rebind to a new PubSub binding and republish current state
    /// unconditionally - a fresh connection counts as first contact, so no
    /// delta suppression applies.
    async fn sync(&mut self, ps: Arc<dyn PubSub>);

    /// Republish current state unconditionally on the currently held
    /// binding, without re-probing anything.
    async fn publish(&self);

    /// Discovery capability, if this module exposes entities to the hub
    fn discovery(&self) -> Option<&dyn Discoverable> {
        None
    }

    /// Release pollers and other resources; idempotent
    async fn close(&mut self) {}
}

/// Optional capability: the module describes entities for hub discovery.
///
/// Called once, at discovery-build time, never per reconnect.
pub trait Discoverable {
    fn entities(&self) -> Vec<EntityConfig>;
}

/// Discovery description of a single entity within a module
#[derive(Debug, Clone)]
pub struct EntityConfig {
    /// Entity name within the module
    pub name: String,
    /// Home Assistant entity class, e.g. sensor, binary_sensor
    pub class: String,
    /// Base config message; the discovery builder normalizes this, merging
    /// default fields and substituting templates, before serializing it
    pub config: Map<String, Value>,
}

impl EntityConfig {
    pub fn new(name: &str, class: &str, config: Map<String, Value>) -> Self {
        Self {
            name: name.to_string(),
            class: class.to_string(),
            config,
        }
    }
}

/// Canonical string form of a link state
pub fn online_str(online: bool) -> &'static str {
    if online {
        "online"
    } else {
        "offline"
    }
}
