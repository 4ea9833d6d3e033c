//! MQTT transport implementation
//!
//! The module is split into two focused sub-modules:
//!
//! - [`connection`] - Pure connection state and MQTT option construction
//! - [`client`] - The event-loop supervisor and I/O operations
//!
//! # Usage
//!
//! ```rust,no_run
//! use habridge::config::MqttSection;
//! use habridge::transport::mqtt::MqttClient;
//!
//! # tokio_test::block_on(async {
//! let config = MqttSection {
//!     broker_url: "mqtt://localhost:1883".to_string(),
//!     base_topic: "habridge/demo".to_string(),
//!     username_env: None,
//!     password_env: None,
//! };
//!
//! let mut client = MqttClient::new(&config)?;
//! client.connect().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;

pub use client::MqttClient;
pub use connection::{configure_mqtt_options, ConnectionState, MqttError};
