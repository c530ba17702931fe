//! Progress Broadcast Service - periodic fan-out of registry snapshots.
//!
//! A single background task reads the full Job Registry on a fixed tick and
//! pushes the snapshot, as one newline-delimited JSON array, to every
//! registered observer connection. An observer whose send fails is dropped;
//! the loop and the other observers are unaffected.

use crate::registry::JobRegistry;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

pub struct ProgressBroadcaster {
    registry: Arc<JobRegistry>,
    observers: Mutex<Vec<OwnedWriteHalf>>,
    tick: Duration,
}

impl ProgressBroadcaster {
    pub fn new(registry: Arc<JobRegistry>, tick: Duration) -> Self {
        Self {
            registry,
            observers: Mutex::new(Vec::new()),
            tick,
        }
    }

    /// Register a new observer connection.
    pub async fn connect(&self, observer: OwnedWriteHalf) {
        let mut observers = self.observers.lock().await;
        observers.push(observer);
        info!("Observer connected ({} total)", observers.len());
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.lock().await.len()
    }

    /// Push one full snapshot to every observer, dropping the ones whose
    /// connection has gone away. A registry read failure skips the tick.
    pub async fn broadcast_once(&self) {
        let snapshot = match self.registry.read_all() {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Skipping broadcast tick, registry read failed: {}", e);
                return;
            }
        };
        let mut payload = match serde_json::to_string(&snapshot) {
            Ok(json) => json,
            Err(e) => {
                warn!("Skipping broadcast tick, snapshot did not serialize: {}", e);
                return;
            }
        };
        payload.push('\n');

        let mut observers = self.observers.lock().await;
        let mut live = Vec::with_capacity(observers.len());
        for mut observer in observers.drain(..) {
            match observer.write_all(payload.as_bytes()).await {
                Ok(()) => live.push(observer),
                Err(e) => info!("Dropping disconnected observer: {}", e),
            }
        }
        *observers = live;
    }

    /// Broadcast forever on the configured tick. Intended to run as a
    /// background task for the life of the process; it keeps broadcasting
    /// whatever the registry holds, completed jobs included.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(self.tick);
        loop {
            ticker.tick().await;
            self.broadcast_once().await;
        }
    }
}
