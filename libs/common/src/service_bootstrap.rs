//! Service bootstrap utilities
//!
//! Startup banner and logging initialization shared by HAPI services.

use crate::logging::{self, LogConfig, LogGuard};
use errors::{HapiError, HapiResult};
use tracing::info;

/// Service metadata for startup
pub struct ServiceInfo {
    /// Service name (e.g., "hapisrv")
    pub name: String,
    /// Service version from Cargo.toml
    pub version: String,
    /// Service description
    pub description: String,
}

impl ServiceInfo {
    pub fn new(name: impl Into<String>, version: &str, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.to_string(),
            description: description.into(),
        }
    }
}

/// Print the startup banner
pub fn print_startup_banner(service: &ServiceInfo) {
    let banner = r#"
 ██╗  ██╗ █████╗ ██████╗ ██╗
 ██║  ██║██╔══██╗██╔══██╗██║
 ███████║███████║██████╔╝██║
 ██╔══██║██╔══██║██╔═══╝ ██║
 ██║  ██║██║  ██║██║     ██║
 ╚═╝  ╚═╝╚═╝  ╚═╝╚═╝     ╚═╝
    "#;

    info!("{}", banner);
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
    info!("");
}

/// Initialize logging for a service
///
/// Log root directory priority:
/// 1. HAPI_LOG_DIR environment variable
/// 2. `config_dir` from the service configuration
/// 3. Default "logs"
pub fn init_logging(
    service: &ServiceInfo,
    console_level: &str,
    config_dir: Option<&str>,
    ansi: bool,
) -> HapiResult<LogGuard> {
    let root = logging::resolve_log_root(config_dir);
    let mut config = LogConfig::new(
        service.name.clone(),
        logging::service_log_dir(&root, &service.name),
    );
    config.console_level = logging::parse_level(console_level);
    config.ansi = ansi;

    logging::init_with_config(config)
        .map_err(|e| HapiError::StartupFailed(format!("Failed to init logging: {}", e)))
}
