//! HAPI basic library
//!
//! Provides functions shared by all HAPI services, including:
//! - logging setup (console plus daily rolling files)
//! - layered configuration loading
//! - shutdown signal handling
//! - host metrics for status reports

pub mod config_loader;
pub mod logging;
pub mod service_bootstrap;
pub mod shutdown;
pub mod system_metrics;

pub use config_loader::load_config;
pub use logging::{LogConfig, LogGuard};
pub use service_bootstrap::ServiceInfo;
pub use system_metrics::SystemMetrics;
