//! Node status snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time view of a node, published on `STATUS/RESPONSE`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub software_version: String,
    pub platform: String,
    pub host: String,
    /// Seconds since this process started
    pub uptime_secs: u64,
    pub host_uptime_secs: u64,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub rtus_online: usize,
    /// Last broker client count seen, -1 when unknown
    pub broker_clients: i64,
    pub is_scheduler: bool,
    pub timestamp: DateTime<Utc>,
}

impl StatusSnapshot {
    /// Flat numeric view used when a snapshot is logged as synthetic telemetry
    pub fn metrics(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("uptime", self.uptime_secs as f64),
            ("cpu", f64::from(self.cpu_percent)),
            ("memory", f64::from(self.memory_percent)),
            ("rtus", self.rtus_online as f64),
            ("clients", self.broker_clients as f64),
        ]
    }
}
