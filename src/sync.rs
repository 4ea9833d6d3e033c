//! The synchronization engine.
//!
//! A single task consumes connection events and performs all discovery and
//! module resync work serially, so concurrent reconnects can never interleave
//! a rebind with a still-running resync. Birth messages from the hub are
//! folded into the same loop through a coalescing channel for the same
//! reason.

use crate::discovery::Discovery;
use crate::module::Module;
use crate::pubsub::ScopedPubSub;
use crate::transport::MessageBus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info};

/// Engine settings derived from configuration
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub base_topic: String,
    pub birth_topic: String,
    /// Pause between advertising entities and publishing their state; the
    /// hub's subscription pipeline needs a moment after seeing a new ad
    pub settle_delay: Duration,
    /// Minimum interval between full resyncs; zero resyncs on every event
    pub min_resync_interval: Duration,
}

pub struct SyncEngine {
    bus: Arc<dyn MessageBus>,
    modules: Vec<(String, Box<dyn Module>)>,
    discovery: Discovery,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        modules: Vec<(String, Box<dyn Module>)>,
        discovery: Discovery,
        settings: SyncSettings,
    ) -> Self {
        Self {
            bus,
            modules,
            discovery,
            settings,
        }
    }

    /// Consume connection events until shutdown.
    ///
    /// Every event is processed; a second event arriving while one is being
    /// handled stays queued (the transport's channel coalesces beyond one
    /// pending).
    pub async fn run(
        &mut self,
        mut connected_rx: mpsc::Receiver<()>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        // Birth messages arrive on the transport's event task; the handler
        // only forwards them here so all sync work stays on this task
        let (birth_tx, mut birth_rx) = mpsc::channel::<()>(1);
        let mut last_resync: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = async { let _ = shutdown_rx.wait_for(|stop| *stop).await; } => {
                    info!("Shutdown signal received, stopping sync engine");
                    break;
                }
                event = connected_rx.recv() => {
                    if event.is_none() {
                        info!("Connection event stream closed, stopping sync engine");
                        break;
                    }
                    if !self.throttle(&mut last_resync, &mut shutdown_rx).await {
                        break;
                    }
                    self.resync(&birth_tx, &mut shutdown_rx).await;
                }
                Some(()) = birth_rx.recv() => {
                    info!("hub birth message received");
                    self.readvertise(&mut shutdown_rx).await;
                }
            }
        }
    }

    /// Full resync after a (re)connection: advertise, rebind and sync every
    /// module, renew the birth subscription, then publish full state after
    /// the settle delay
    async fn resync(&mut self, birth_tx: &mpsc::Sender<()>, shutdown_rx: &mut watch::Receiver<bool>) {
        info!("resynchronizing after broker session");
        self.discovery.advertise(self.bus.as_ref()).await;

        for (name, module) in &mut self.modules {
            let mut topic = self.settings.base_topic.clone();
            if !name.is_empty() {
                topic.push('/');
                topic.push_str(name);
            }
            let binding = Arc::new(ScopedPubSub::new(self.bus.clone(), topic));
            module.sync(binding).await;
        }

        let birth_tx = birth_tx.clone();
        self.bus
            .subscribe(
                &self.settings.birth_topic,
                Box::new(move |payload| {
                    if payload == b"online" {
                        // A pending, undrained birth event already covers this
                        let _ = birth_tx.try_send(());
                    }
                }),
            )
            .await;

        if !self.settle(shutdown_rx).await {
            return;
        }
        self.publish_all().await;
    }

    /// The hub restarted: it needs the ads again, and after the settle delay
    /// the full state, independent of our own connection having changed
    async fn readvertise(&mut self, shutdown_rx: &mut watch::Receiver<bool>) {
        self.discovery.advertise(self.bus.as_ref()).await;
        if !self.settle(shutdown_rx).await {
            return;
        }
        self.publish_all().await;
    }

    async fn publish_all(&self) {
        for (_, module) in &self.modules {
            module.publish().await;
        }
    }

    /// Hold back a resync that arrives sooner than the configured minimum.
    /// The event is delayed, never dropped. Returns false on shutdown.
    async fn throttle(
        &self,
        last_resync: &mut Option<Instant>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> bool {
        if let Some(last) = *last_resync {
            let elapsed = last.elapsed();
            if elapsed < self.settings.min_resync_interval {
                let wait = self.settings.min_resync_interval - elapsed;
                debug!("throttling resync for {:?}", wait);
                if !interruptible_sleep(shutdown_rx, wait).await {
                    return false;
                }
            }
        }
        *last_resync = Some(Instant::now());
        true
    }

    async fn settle(&self, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
        interruptible_sleep(shutdown_rx, self.settings.settle_delay).await
    }

    /// Close every module; idempotent, called on every exit path
    pub async fn close_modules(&mut self) {
        for (name, module) in &mut self.modules {
            debug!("closing module: '{}'", name);
            module.close().await;
        }
    }
}

/// Returns false if shutdown was signalled before the delay elapsed
async fn interruptible_sleep(shutdown_rx: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown_rx.wait_for(|stop| *stop) => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
