//! Service bootstrap: command line, logging and configuration checks

use std::path::PathBuf;

use clap::Parser;
use common::service_bootstrap::{self, ServiceInfo};
use common::LogGuard;
use errors::HapiResult;
use tracing::info;

use crate::config::{HapiConfig, DEFAULT_CONFIG_PATH};

/// Command-line arguments for hapisrv
#[derive(Parser, Debug, Clone)]
#[command(
    name = "hapisrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "HAPI field controller node",
    long_about = None
)]
pub struct Args {
    /// Configuration file
    #[arg(short = 'c', long, env = "HAPI_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Console log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub validate: bool,
}

pub fn service_info() -> ServiceInfo {
    ServiceInfo::new(
        "hapisrv",
        env!("CARGO_PKG_VERSION"),
        "Field controller - RTU discovery, scheduling and pub/sub sync",
    )
}

/// Initialize logging from arguments and configuration
///
/// The returned guard must live until the process exits.
pub fn initialize_logging(
    args: &Args,
    service: &ServiceInfo,
    config: &HapiConfig,
) -> HapiResult<LogGuard> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(config.logging.level.as_str());
    service_bootstrap::init_logging(service, level, config.logging.dir.as_deref(), !args.no_color)
}

/// Summarize the effective configuration (validation mode)
pub fn validate_configuration(config: &HapiConfig) -> HapiResult<()> {
    config.validate()?;
    info!("Node: {} (scheduler: {})", config.node_name(), config.node.is_scheduler);
    info!("Database: {}", config.database.path);
    if config.mqtt.enabled {
        info!(
            "MQTT: {}:{} (fallback: {})",
            config.mqtt.broker_host,
            config.mqtt.broker_port,
            config.mqtt.fallback_host.as_deref().unwrap_or("none")
        );
    } else {
        info!("MQTT: disabled");
    }
    info!(
        "Devices: signature {}, port {}, serial {}",
        config.devices.signature,
        config.devices.port,
        if config.devices.serial_enabled {
            config.devices.serial_path.as_str()
        } else {
            "disabled"
        }
    );
    if config.console.enabled {
        info!("Console: {}", config.console.bind);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["hapisrv"]);
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(args.log_level.is_none());
        assert!(!args.validate);
    }

    #[test]
    fn test_args_flags() {
        let args = Args::parse_from(["hapisrv", "-c", "/etc/hapi.yaml", "-l", "debug", "--validate"]);
        assert_eq!(args.config, PathBuf::from("/etc/hapi.yaml"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.validate);
    }
}
