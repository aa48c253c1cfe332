//! Node configuration
//!
//! Loaded from `config/hapi.yaml` with `HAPI_` environment overrides, e.g.
//! `HAPI_MQTT__BROKER_HOST=10.0.0.2` or `HAPI_NODE__IS_SCHEDULER=true`.

use std::path::Path;
use std::time::Duration;

use errors::{HapiError, HapiResult};
use serde::{Deserialize, Serialize};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/hapi.yaml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "HAPI_";

/// Complete node configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HapiConfig {
    pub node: NodeConfig,
    pub database: DatabaseConfig,
    pub mqtt: MqttConfig,
    pub devices: DeviceConfig,
    pub scheduler: SchedulerConfig,
    pub console: ConsoleConfig,
    pub asset: AssetConfig,
    pub logging: LoggingConfig,
}

/// Node identity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node name; the host name is used when empty
    pub name: String,
    /// Whether this node answers `SCHEDULER/QUERY`
    pub is_scheduler: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/hapi.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub enabled: bool,
    pub broker_host: String,
    pub broker_port: u16,
    /// Broker tried after `fallback_after_failures` consecutive failures
    pub fallback_host: Option<String>,
    pub fallback_after_failures: u32,
    /// Client id; the node name is used when unset
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
    pub reconnect_delay_ms: u64,
    pub channel_capacity: usize,
    /// Largest packet sent or accepted; core datasets are split to fit
    pub max_packet_bytes: usize,
    /// Publish the core dataset once after every (re)connect
    pub publish_core_on_connect: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            broker_host: "mqttbroker.local".to_string(),
            broker_port: 1883,
            fallback_host: None,
            fallback_after_failures: 3,
            client_id: None,
            keep_alive_secs: 60,
            reconnect_delay_ms: 5000,
            channel_capacity: 64,
            max_packet_bytes: 1024 * 1024,
            publish_core_on_connect: true,
        }
    }
}

/// Room left in a packet for the fixed header, topic and packet id
const PUBLISH_HEADROOM: usize = 512;

/// Smallest accepted `max_packet_bytes`
const MIN_PACKET_BYTES: usize = 4096;

impl MqttConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Largest payload a single publish may carry
    pub fn max_payload_bytes(&self) -> usize {
        self.max_packet_bytes.saturating_sub(PUBLISH_HEADROOM)
    }
}

/// Device discovery and communication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Hardware address fragment identifying RTUs in scan output
    pub signature: String,
    /// Interface to scan; the site's `net_iface` is used when unset
    pub net_iface: Option<String>,
    pub scan_timeout_secs: u64,
    pub port: u16,
    pub identify_timeout_ms: u64,
    /// Attempts for read-only queries (identify, pin modes)
    pub query_attempts: u32,
    pub pin_mode_timeout_ms: u64,
    /// Quiet period that ends a response once bytes have arrived
    pub idle_gap_ms: u64,
    pub serial_enabled: bool,
    pub serial_path: String,
    pub serial_baud: u32,
    pub serial_timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            signature: "de:ad:be:ef".to_string(),
            net_iface: None,
            scan_timeout_secs: 30,
            port: 80,
            identify_timeout_ms: 5000,
            query_attempts: 2,
            pin_mode_timeout_ms: 1000,
            idle_gap_ms: 200,
            serial_enabled: true,
            serial_path: "/dev/ttyACM0".to_string(),
            serial_baud: 115_200,
            serial_timeout_ms: 3000,
        }
    }
}

/// Interface scanned when neither the config nor the site names one
const DEFAULT_IFACE: &str = "eth0";

impl DeviceConfig {
    /// Interface to scan: the configured one, else the site's, else `eth0`
    ///
    /// Blank values count as unset at every level.
    pub fn scan_iface(&self, site_iface: &str) -> String {
        [self.net_iface.as_deref(), Some(site_iface)]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|iface| !iface.is_empty())
            .unwrap_or(DEFAULT_IFACE)
            .to_string()
    }

    pub fn identify_timeout(&self) -> Duration {
        Duration::from_millis(self.identify_timeout_ms)
    }

    pub fn pin_mode_timeout(&self) -> Duration {
        Duration::from_millis(self.pin_mode_timeout_ms)
    }

    pub fn serial_timeout(&self) -> Duration {
        Duration::from_millis(self.serial_timeout_ms)
    }

    pub fn idle_gap(&self) -> Duration {
        Duration::from_millis(self.idle_gap_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub tick_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub bind: String,
    pub max_sessions: usize,
    pub command_timeout_ms: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0:8023".to_string(),
            max_sessions: 4,
            command_timeout_ms: 5000,
        }
    }
}

impl ConsoleConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// The asset this node answers for on `ASSET/QUERY`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub id: Option<i64>,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: Option<String>,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            level: "info".to_string(),
        }
    }
}

impl HapiConfig {
    /// Load from file (if present) and environment
    pub fn load(path: &Path) -> HapiResult<Self> {
        let config: HapiConfig = common::load_config(Some(path), ENV_PREFIX)?;
        config.validate()?;
        Ok(config)
    }

    /// Node name, falling back to the host name
    pub fn node_name(&self) -> String {
        let name = self.node.name.trim();
        if name.is_empty() {
            common::system_metrics::local_host_name()
        } else {
            name.to_string()
        }
    }

    pub fn validate(&self) -> HapiResult<()> {
        let invalid = |field: &str, reason: &str| HapiError::InvalidConfig {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        if self.database.path.trim().is_empty() {
            return Err(invalid("database.path", "must not be empty"));
        }
        if self.mqtt.enabled {
            if self.mqtt.broker_host.trim().is_empty() {
                return Err(invalid("mqtt.broker_host", "must not be empty"));
            }
            if self.mqtt.broker_port == 0 {
                return Err(invalid("mqtt.broker_port", "must be non-zero"));
            }
            if self.mqtt.channel_capacity == 0 {
                return Err(invalid("mqtt.channel_capacity", "must be non-zero"));
            }
            if self.mqtt.max_packet_bytes < MIN_PACKET_BYTES {
                return Err(invalid("mqtt.max_packet_bytes", "must be at least 4096"));
            }
        }
        if self.devices.port == 0 {
            return Err(invalid("devices.port", "must be non-zero"));
        }
        if self.devices.signature.trim().is_empty() {
            return Err(invalid("devices.signature", "must not be empty"));
        }
        if self.devices.serial_enabled && self.devices.serial_baud == 0 {
            return Err(invalid("devices.serial_baud", "must be non-zero"));
        }
        if self.scheduler.tick_ms == 0 {
            return Err(invalid("scheduler.tick_ms", "must be non-zero"));
        }
        if self.console.enabled && self.console.max_sessions == 0 {
            return Err(invalid("console.max_sessions", "must be non-zero"));
        }
        if let (Some(lower), Some(upper)) = (self.asset.lower_bound, self.asset.upper_bound) {
            if lower > upper {
                return Err(invalid("asset.lower_bound", "must not exceed upper_bound"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = HapiConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.devices.port, 80);
        assert_eq!(config.devices.serial_baud, 115_200);
        assert_eq!(config.console.bind, "0.0.0.0:8023");
    }

    #[test]
    fn test_validate_rejects_zero_tick_and_empty_host() {
        let mut config = HapiConfig::default();
        config.scheduler.tick_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(HapiError::InvalidConfig { ref field, .. }) if field == "scheduler.tick_ms"
        ));

        let mut config = HapiConfig::default();
        config.mqtt.broker_host = " ".into();
        assert!(config.validate().is_err());

        config.mqtt.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_configured_iface_falls_back_to_site() {
        let mut devices = DeviceConfig::default();
        assert_eq!(devices.scan_iface("wlan0"), "wlan0");
        assert_eq!(devices.scan_iface(""), "eth0");

        devices.net_iface = Some("".into());
        assert_eq!(devices.scan_iface("wlan0"), "wlan0");
        devices.net_iface = Some("  ".into());
        assert_eq!(devices.scan_iface(" "), "eth0");

        devices.net_iface = Some("enp3s0".into());
        assert_eq!(devices.scan_iface("wlan0"), "enp3s0");
    }

    #[test]
    fn test_packet_limit_leaves_room_for_headers() {
        let mut config = HapiConfig::default();
        assert!(config.mqtt.max_payload_bytes() < config.mqtt.max_packet_bytes);

        config.mqtt.max_packet_bytes = 1024;
        assert!(matches!(
            config.validate(),
            Err(HapiError::InvalidConfig { ref field, .. }) if field == "mqtt.max_packet_bytes"
        ));
    }

    #[test]
    fn test_inverted_alert_bounds_rejected() {
        let mut config = HapiConfig::default();
        config.asset.lower_bound = Some(30.0);
        config.asset.upper_bound = Some(10.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_and_env_layering() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "hapi.yaml",
                r#"
node:
  name: greenhouse-1
  is_scheduler: true
mqtt:
  broker_host: 10.0.0.2
asset:
  id: 4
  upper_bound: 35.0
"#,
            )?;
            jail.set_env("HAPI_MQTT__BROKER_PORT", "1884");
            jail.set_env("HAPI_SCHEDULER__TICK_MS", "1000");

            let config = HapiConfig::load(Path::new("hapi.yaml")).map_err(|e| e.to_string())?;
            assert_eq!(config.node_name(), "greenhouse-1");
            assert!(config.node.is_scheduler);
            assert_eq!(config.mqtt.broker_host, "10.0.0.2");
            assert_eq!(config.mqtt.broker_port, 1884);
            assert_eq!(config.scheduler.tick_ms, 1000);
            assert_eq!(config.asset.id, Some(4));
            assert_eq!(config.devices.signature, "de:ad:be:ef");
            Ok(())
        });
    }
}
