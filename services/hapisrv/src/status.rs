//! Node status snapshots

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use chrono::Utc;
use common::SystemMetrics;
use hapi_model::StatusSnapshot;

/// Builds status snapshots for the console, the router and virtual jobs
pub struct StatusReporter {
    started: Instant,
    version: String,
    is_scheduler: bool,
    broker_clients: AtomicI64,
}

impl StatusReporter {
    pub fn new(version: impl Into<String>, is_scheduler: bool) -> Self {
        Self {
            started: Instant::now(),
            version: version.into(),
            is_scheduler,
            broker_clients: AtomicI64::new(-1),
        }
    }

    pub fn is_scheduler(&self) -> bool {
        self.is_scheduler
    }

    /// Record the broker's `$SYS` client count
    pub fn set_broker_clients(&self, count: i64) {
        self.broker_clients.store(count, Ordering::Relaxed);
    }

    /// Last client count seen, -1 before the broker has reported
    pub fn broker_clients(&self) -> i64 {
        self.broker_clients.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, rtus_online: usize) -> StatusSnapshot {
        let metrics = SystemMetrics::collect();
        StatusSnapshot {
            software_version: self.version.clone(),
            platform: metrics.platform,
            host: metrics.host_name,
            uptime_secs: self.started.elapsed().as_secs(),
            host_uptime_secs: metrics.host_uptime_secs,
            cpu_percent: metrics.cpu_percent,
            memory_percent: metrics.memory_percent,
            rtus_online,
            broker_clients: self.broker_clients(),
            is_scheduler: self.is_scheduler,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_carries_node_state() {
        let reporter = StatusReporter::new("1.2.0", true);
        assert_eq!(reporter.broker_clients(), -1);
        reporter.set_broker_clients(5);

        let snapshot = reporter.snapshot(3);
        assert_eq!(snapshot.software_version, "1.2.0");
        assert_eq!(snapshot.rtus_online, 3);
        assert_eq!(snapshot.broker_clients, 5);
        assert!(snapshot.is_scheduler);
        assert!(!snapshot.host.is_empty());
    }
}
