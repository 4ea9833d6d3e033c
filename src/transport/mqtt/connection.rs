//! Pure connection state management for the MQTT client
//!
//! This module contains pure functions for connection state handling and
//! MQTT option construction; no I/O happens here.

use crate::config::MqttSection;
use rumqttc::v5::mqttbytes::v5::LastWill;
use rumqttc::v5::{mqttbytes::QoS, MqttOptions};
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Fixed delay between connection attempts
pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Connection state for the MQTT client
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state - attempting to connect
    Connecting,
    /// Successfully connected and ready for operations
    Connected,
    /// Disconnected with reason; the supervisor keeps retrying
    Disconnected(String),
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

/// Build MQTT options from config.
///
/// The last-will message is registered here, before any connection attempt,
/// so the broker itself announces this client's departure on an ungraceful
/// disconnect.
pub fn configure_mqtt_options(config: &MqttSection) -> Result<MqttOptions, MqttError> {
    let url = Url::parse(&config.broker_url)
        .map_err(|_| MqttError::InvalidBrokerUrl(config.broker_url.clone()))?;

    let host = url
        .host_str()
        .ok_or_else(|| MqttError::InvalidBrokerUrl(config.broker_url.clone()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    // Unique client id per process start to prevent broker-side conflicts
    // with a lingering previous session
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let client_id = format!("{}-{timestamp}", config.base_topic.replace('/', "-"));
    let mut mqtt_options = MqttOptions::new(client_id, host, port);

    if url.scheme() == "mqtts" {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username) = config.username() {
        mqtt_options.set_credentials(&username, &config.password().unwrap_or_default());
    }

    mqtt_options.set_keep_alive(Duration::from_secs(60));

    // Last will: the broker publishes "offline" on the base topic for us.
    // QoS 1 to keep ordering with our own state publishes, not retained.
    let lwt = LastWill::new(&config.base_topic, "offline", QoS::AtLeastOnce, false, None);
    mqtt_options.set_last_will(lwt);

    Ok(mqtt_options)
}
