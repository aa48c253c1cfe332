//! Host and process metrics for status snapshots
//!
//! Thin wrapper over `sysinfo`, collected on demand.

use serde::{Deserialize, Serialize};
use sysinfo::{Pid, System};

/// System resource metrics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemMetrics {
    /// Host name as reported by the OS
    pub host_name: String,
    /// OS name and version, e.g. "Debian GNU/Linux 12"
    pub platform: String,
    /// Number of CPU cores
    pub cpu_count: usize,
    /// Global CPU usage percentage
    pub cpu_percent: f32,
    /// Used memory as a percentage of total
    pub memory_percent: f32,
    /// Current process memory usage (MB)
    pub process_memory_mb: u64,
    /// Seconds since host boot
    pub host_uptime_secs: u64,
}

impl SystemMetrics {
    /// Collect current host and process metrics
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_usage();

        let pid = Pid::from_u32(std::process::id());
        sys.refresh_processes_specifics(
            sysinfo::ProcessesToUpdate::Some(&[pid]),
            true,
            sysinfo::ProcessRefreshKind::new().with_memory(),
        );

        let process_memory_mb = sys
            .process(pid)
            .map(|p| p.memory() / 1024 / 1024)
            .unwrap_or(0);

        let total = sys.total_memory();
        let memory_percent = if total == 0 {
            0.0
        } else {
            (sys.used_memory() as f64 / total as f64 * 100.0) as f32
        };

        let platform = match (System::name(), System::os_version()) {
            (Some(name), Some(version)) => format!("{} {}", name, version),
            (Some(name), None) => name,
            _ => std::env::consts::OS.to_string(),
        };

        Self {
            host_name: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            platform,
            cpu_count: sys.cpus().len(),
            cpu_percent: sys.global_cpu_usage(),
            memory_percent,
            process_memory_mb,
            host_uptime_secs: System::uptime(),
        }
    }
}

/// Host name of this machine, used as the node identity when none is configured
pub fn local_host_name() -> String {
    System::host_name().unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_reports_sane_values() {
        let metrics = SystemMetrics::collect();
        assert!(!metrics.host_name.is_empty());
        assert!(!metrics.platform.is_empty());
        assert!(metrics.memory_percent >= 0.0 && metrics.memory_percent <= 100.0);
    }
}
