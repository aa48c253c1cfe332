//! Device communicator
//!
//! [`DeviceLink`] is the seam between the controller and its RTUs. The
//! production [`Communicator`] routes the `usb` pseudo-address to the serial
//! port and everything else to TCP.

use std::time::Duration;

use async_trait::async_trait;
use errors::{HapiErrorTrait, HapiResult};
use hapi_model::USB_ADDRESS;
use tracing::{debug, warn};

use crate::config::DeviceConfig;
use crate::device::transport;

/// Identify request; reply is `id\r\nversion`
pub const IDENTIFY: &str = "sta";
/// Environment snapshot; reply is a JSON object
pub const ENVIRONMENT: &str = "env";
/// Pin mode query; reply is a fixed-width status string
pub const PIN_MODES: &str = "gpm";

/// Commands that only read device state and may be repeated
const IDEMPOTENT_COMMANDS: [&str; 2] = [IDENTIFY, PIN_MODES];

/// Request/response exchange with one device
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Single attempt, bounded by `timeout`
    async fn send(
        &self,
        address: &str,
        port: u16,
        timeout: Duration,
        command: &str,
    ) -> HapiResult<String>;

    /// Bounded retry for read-only queries
    ///
    /// Commands other than identify and pin-mode queries get exactly one
    /// attempt whatever `attempts` says.
    async fn send_idempotent(
        &self,
        address: &str,
        port: u16,
        timeout: Duration,
        command: &str,
        attempts: u32,
    ) -> HapiResult<String> {
        let attempts = if IDEMPOTENT_COMMANDS.contains(&command) {
            attempts.max(1)
        } else {
            1
        };

        let mut attempt = 1;
        loop {
            match self.send(address, port, timeout, command).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < attempts && e.is_retryable() => {
                    debug!(
                        "Retrying '{}' to {} ({}/{}): {}",
                        command, address, attempt, attempts, e
                    );
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

/// Production link over TCP and the local serial port
pub struct Communicator {
    serial_path: String,
    serial_baud: u32,
    idle_gap: Duration,
}

impl Communicator {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            serial_path: config.serial_path.clone(),
            serial_baud: config.serial_baud,
            idle_gap: config.idle_gap(),
        }
    }
}

#[async_trait]
impl DeviceLink for Communicator {
    async fn send(
        &self,
        address: &str,
        port: u16,
        timeout: Duration,
        command: &str,
    ) -> HapiResult<String> {
        let result = if address.eq_ignore_ascii_case(USB_ADDRESS) {
            transport::serial_exchange(
                &self.serial_path,
                self.serial_baud,
                timeout,
                command,
                self.idle_gap,
            )
            .await
        } else {
            transport::tcp_exchange(address, port, timeout, command, self.idle_gap).await
        };

        if let Err(ref e) = result {
            warn!(code = e.error_code(), "Command '{}' to {} failed: {}", command, address, e);
        }
        result
    }
}
