//! MQTT client with connection supervision
//!
//! Owns the rumqttc event loop in a background task. The same loop serves as
//! initial-connect retry and automatic reconnect: every poll error is logged
//! and followed by a fixed-interval sleep, every ConnAck emits one connection
//! event for the sync engine and re-subscribes the registered topics.

use super::connection::{
    configure_mqtt_options, ConnectionState, MqttError, CONNECT_RETRY_INTERVAL,
};
use crate::config::MqttSection;
use crate::transport::{MessageBus, MessageHandler};
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, Event, EventLoop};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type SubscriptionMap = Arc<Mutex<HashMap<String, MessageHandler>>>;

/// MQTT transport client for the bridge
pub struct MqttClient {
    client: AsyncClient,
    event_loop: std::sync::Mutex<Option<EventLoop>>,
    event_loop_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
    state_rx: watch::Receiver<ConnectionState>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    connected_tx: mpsc::Sender<()>,
    connected_rx: Option<mpsc::Receiver<()>>,
    subscriptions: SubscriptionMap,
    retry_interval: Duration,
}

impl MqttClient {
    pub fn new(config: &MqttSection) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(config)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        // Capacity 1: an undrained event coalesces duplicates, the pending
        // one is never lost
        let (connected_tx, connected_rx) = mpsc::channel(1);

        Ok(MqttClient {
            client,
            event_loop: std::sync::Mutex::new(Some(event_loop)),
            event_loop_handle: std::sync::Mutex::new(None),
            state_rx,
            state_tx,
            shutdown_tx,
            shutdown_rx,
            connected_tx,
            connected_rx: Some(connected_rx),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            retry_interval: CONNECT_RETRY_INTERVAL,
        })
    }

    /// Override the fixed retry interval (tests use a short one)
    pub fn set_retry_interval(&mut self, interval: Duration) {
        self.retry_interval = interval;
    }

    /// Take the connection event stream.
    ///
    /// Yields one event per broker session, initial connect included. Can
    /// only be taken once; the sync engine is its sole consumer.
    pub fn take_connection_events(&mut self) -> Option<mpsc::Receiver<()>> {
        self.connected_rx.take()
    }

    /// Connect to the broker, blocking until the first successful session.
    ///
    /// Failed attempts are logged and retried on a fixed interval
    /// indefinitely. A shutdown signal aborts the wait and returns `Ok(())` -
    /// cancellation is not a connection failure.
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        let event_loop = self
            .event_loop
            .lock()
            .ok()
            .and_then(|mut guard| guard.take())
            .ok_or_else(|| MqttError::ConnectionFailed("Event loop already started".to_string()))?;

        let state_tx = self.state_tx.clone();
        let shutdown_rx = self.shutdown_rx.clone();
        let connected_tx = self.connected_tx.clone();
        let client = self.client.clone();
        let subscriptions = self.subscriptions.clone();
        let retry_interval = self.retry_interval;

        let handle = tokio::spawn(Self::supervise_event_loop(
            event_loop,
            client,
            state_tx,
            connected_tx,
            subscriptions,
            shutdown_rx,
            retry_interval,
        ));
        if let Ok(mut guard) = self.event_loop_handle.lock() {
            *guard = Some(handle);
        }

        // Block until the supervisor reports the first session, or shutdown
        let mut state_rx = self.state_rx.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            result = state_rx.wait_for(|state| *state == ConnectionState::Connected) => {
                result.map_err(|_| {
                    MqttError::ConnectionFailed("Connection supervisor stopped".to_string())
                })?;
                Ok(())
            }
            _ = shutdown_rx.wait_for(|stop| *stop) => {
                info!("Shutdown requested during initial connect");
                Ok(())
            }
        }
    }

    /// Event-loop supervisor: polls the transport, routes inbound messages,
    /// and turns every new session into a connection event
    async fn supervise_event_loop(
        mut event_loop: EventLoop,
        client: AsyncClient,
        state_tx: watch::Sender<ConnectionState>,
        connected_tx: mpsc::Sender<()>,
        subscriptions: SubscriptionMap,
        mut shutdown_rx: watch::Receiver<bool>,
        retry_interval: Duration,
    ) {
        info!("Starting MQTT event loop");
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping MQTT event loop");
                        break;
                    }
                }
                event = event_loop.poll() => {
                    match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!("mqtt connect");
                            let _ = state_tx.send(ConnectionState::Connected);
                            Self::resubscribe(&client, &subscriptions).await;
                            // try_send: a pending, undrained event already
                            // covers this session
                            let _ = connected_tx.try_send(());
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            let topic = String::from_utf8_lossy(&publish.topic).to_string();
                            let subs = subscriptions.lock().await;
                            match subs.get(&topic) {
                                Some(handler) => handler(&publish.payload),
                                None => debug!("No handler for inbound topic: {}", topic),
                            }
                        }
                        Ok(Event::Incoming(Packet::Disconnect(_))) => {
                            warn!("Disconnected by broker");
                            let _ = state_tx.send(ConnectionState::Disconnected(
                                "Disconnected by broker".to_string(),
                            ));
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("connect error: {}", e);
                            let _ = state_tx.send(ConnectionState::Disconnected(e.to_string()));
                            if !Self::interruptible_sleep(shutdown_rx.clone(), retry_interval).await
                            {
                                break;
                            }
                        }
                    }
                }
            }
        }
        info!("MQTT event loop stopped");
    }

    /// Re-establish every registered subscription on a fresh session
    async fn resubscribe(client: &AsyncClient, subscriptions: &SubscriptionMap) {
        let subs = subscriptions.lock().await;
        for topic in subs.keys() {
            if let Err(e) = client.subscribe(topic, QoS::AtLeastOnce).await {
                error!("Failed to re-subscribe to {}: {}", topic, e);
            } else {
                debug!("Re-subscribed to: {}", topic);
            }
        }
    }

    /// Sleep that a shutdown signal cuts short.
    /// Returns true if the sleep completed, false on shutdown.
    async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay: Duration) -> bool {
        tokio::select! {
            _ = shutdown_rx.wait_for(|stop| *stop) => {
                info!("Shutdown signal received during retry delay");
                false
            }
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Get current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Check if a broker session is currently up
    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Disconnect from the broker and stop the supervisor task
    pub async fn disconnect(&self) -> Result<(), MqttError> {
        let _ = self.shutdown_tx.send(true);

        if let Err(e) = self.client.disconnect().await {
            // Never-connected clients have no session to tear down
            debug!("Broker disconnect request failed: {}", e);
        }

        let _ = self
            .state_tx
            .send(ConnectionState::Disconnected("Client disconnected".to_string()));

        let handle = self
            .event_loop_handle
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            match tokio::time::timeout(Duration::from_secs(2), handle).await {
                Ok(Ok(())) => info!("Event loop task shut down gracefully"),
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!("Event loop task ended with error: {}", e);
                }
                Err(_) => {
                    warn!("Event loop task didn't shut down gracefully, forcing abort");
                }
                _ => {}
            }
        }

        info!("MQTT client disconnected");
        Ok(())
    }
}

#[async_trait::async_trait]
impl MessageBus for MqttClient {
    async fn publish(&self, topic: &str, payload: String) {
        debug!("publish {} '{}'", topic, payload);
        if let Err(e) = self
            .client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
        {
            error!("Failed to publish to {}: {}", topic, e);
        }
    }

    async fn subscribe(&self, topic: &str, handler: MessageHandler) {
        debug!("subscribe {}", topic);
        {
            let mut subs = self.subscriptions.lock().await;
            subs.insert(topic.to_string(), handler);
        }
        if let Err(e) = self.client.subscribe(topic, QoS::AtLeastOnce).await {
            error!("Failed to subscribe to {}: {}", topic, e);
        }
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        // Signal shutdown to the supervisor if it is still running
        let _ = self.shutdown_tx.send(true);
        if let Ok(mut guard) = self.event_loop_handle.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
        // Graceful broker disconnect is async; callers wanting it must call
        // disconnect() explicitly
    }
}
