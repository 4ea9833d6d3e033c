//! Top level error types for the bridge.
//!
//! Startup errors (bad configuration, unknown modules, missing MAC address)
//! are fatal and surface from `main`. Runtime sensor failures never appear
//! here - modules fold them into their published state instead.

use thiserror::Error;

/// Main error type for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Unsupported module: {0}")]
    UnknownModule(String),

    #[error("Discovery: no MAC address found in any configured source")]
    MacNotFound,

    #[error("Failed to serialize discovery payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Mqtt(#[from] crate::transport::mqtt::MqttError),
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_module_display() {
        let err = BridgeError::UnknownModule("cpu".to_string());
        assert_eq!(err.to_string(), "Unsupported module: cpu");
    }

    #[test]
    fn test_mac_not_found_display() {
        let err = BridgeError::MacNotFound;
        assert!(err.to_string().contains("MAC address"));
    }

    #[test]
    fn test_serialization_error_conversion() {
        let bad = serde_json::from_str::<serde_json::Value>("not json");
        let err: BridgeError = bad.unwrap_err().into();
        assert!(matches!(err, BridgeError::Serialization(_)));
    }
}
