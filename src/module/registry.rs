//! Explicit module registry.
//!
//! The table of available modules is composed in one place at startup;
//! nothing registers itself through global state. Resolution instantiates
//! exactly the configured modules, in listed order, and fails fast on an
//! unknown name.

use super::wan::{DefaultWanProbe, WanModule, WanModuleConfig};
use super::Module;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Constructs a module from the bridge configuration
pub type ModuleFactory = fn(&BridgeConfig) -> BridgeResult<Box<dyn Module>>;

/// Name to factory table for the available sensor modules
pub struct ModuleRegistry {
    factories: Vec<(&'static str, ModuleFactory)>,
}

impl ModuleRegistry {
    /// The built-in module set
    pub fn builtin() -> Self {
        Self {
            factories: vec![("wan", wan_factory)],
        }
    }

    /// Instantiate the modules named in `config.modules`, in listed order
    pub fn resolve(&self, config: &BridgeConfig) -> BridgeResult<Vec<(String, Box<dyn Module>)>> {
        let mut modules = Vec::with_capacity(config.modules.len());
        for name in &config.modules {
            let factory = self
                .factories
                .iter()
                .find(|(candidate, _)| candidate == name)
                .map(|(_, factory)| factory)
                .ok_or_else(|| BridgeError::UnknownModule(name.clone()))?;
            info!("starting module: {}", name);
            modules.push((name.clone(), factory(config)?));
        }
        Ok(modules)
    }
}

fn wan_factory(config: &BridgeConfig) -> BridgeResult<Box<dyn Module>> {
    Ok(Box::new(WanModule::new(
        resolve_wan_config(config),
        Arc::new(DefaultWanProbe::new()),
    )))
}

/// Apply the precedence: module-specific period beats the global override
/// beats the built-in default
fn resolve_wan_config(config: &BridgeConfig) -> WanModuleConfig {
    let defaults = WanModuleConfig::default();
    let wan = config.wan.clone().unwrap_or_default();
    let global = config.period_secs.map(Duration::from_secs);

    let enabled = |entity: &str| match &wan.entities {
        Some(entities) => entities.iter().any(|e| e == entity),
        None => true,
    };

    WanModuleConfig {
        link_enabled: enabled("link"),
        ip_enabled: enabled("ip"),
        link_period: wan
            .link_period_secs
            .map(Duration::from_secs)
            .or(global)
            .unwrap_or(defaults.link_period),
        ip_period: wan
            .ip_period_secs
            .map(Duration::from_secs)
            .or(global)
            .unwrap_or(defaults.ip_period),
    }
}
