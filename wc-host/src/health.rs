use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;

use crate::dispatcher::Dispatcher;

#[derive(Debug, Serialize, Deserialize)]
pub struct HostHealth {
    pub uptime_seconds: u64,
    pub nodes_tracked: u32,
    pub nodes_online: u32,
    pub mqtt_status: String,
    pub mqtt_reconnects: u32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    mqtt_reconnects: Arc<AtomicU32>,
    mqtt_status: Arc<Mutex<String>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            mqtt_reconnects: Arc::new(AtomicU32::new(0)),
            mqtt_status: Arc::new(Mutex::new("connecting".to_string())),
        }
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = "connected".to_string();
    }

    pub fn increment_reconnects(&self) {
        self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.mqtt_status.lock() = "reconnecting".to_string();
    }

    pub fn mqtt_status(&self) -> String {
        self.mqtt_status.lock().clone()
    }

    pub fn is_mqtt_connected(&self) -> bool {
        *self.mqtt_status.lock() == "connected"
    }

    pub fn get_health(&self, dispatcher: &Dispatcher) -> HostHealth {
        let now = OffsetDateTime::now_utc();
        let nodes = dispatcher.nodes();
        let online = nodes
            .iter()
            .filter(|n| dispatcher.is_online_at(&n.identity.node_id, now))
            .count();

        HostHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            nodes_tracked: nodes.len() as u32,
            nodes_online: online as u32,
            mqtt_status: self.mqtt_status(),
            mqtt_reconnects: self.mqtt_reconnects.load(Ordering::Relaxed),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}
