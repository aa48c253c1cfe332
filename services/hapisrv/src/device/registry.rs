//! Online RTU registry
//!
//! Holds the set of devices found by the last discovery. Readers (scheduler,
//! router, console) take snapshots; discovery swaps the whole set at once.

use std::sync::Arc;

use hapi_model::device::{live_mode_string, parse_identify};
use hapi_model::{pin_modes_congruent, Rtu, USB_ADDRESS};
use hapi_store::Store;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::device::discovery::SubnetScanner;
use crate::device::link::{DeviceLink, IDENTIFY, PIN_MODES};

pub struct Registry {
    online: RwLock<Vec<Rtu>>,
    store: Store,
    link: Arc<dyn DeviceLink>,
    scanner: Box<dyn SubnetScanner>,
    config: DeviceConfig,
}

impl Registry {
    pub fn new(
        store: Store,
        link: Arc<dyn DeviceLink>,
        scanner: Box<dyn SubnetScanner>,
        config: DeviceConfig,
    ) -> Self {
        Self {
            online: RwLock::new(Vec::new()),
            store,
            link,
            scanner,
            config,
        }
    }

    pub fn link(&self) -> Arc<dyn DeviceLink> {
        Arc::clone(&self.link)
    }

    pub fn device_port(&self) -> u16 {
        self.config.port
    }

    /// Scan, identify and replace the online set
    ///
    /// Scan failures and silent candidates are logged and skipped; an empty
    /// result is valid.
    pub async fn discover(&self, iface: &str) -> Vec<Rtu> {
        let candidates = match self.scanner.scan(iface).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Subnet scan failed: {}", e);
                Vec::new()
            },
        };

        let mut found = Vec::new();
        for address in &candidates {
            if let Some(rtu) = self.identify(address, self.config.identify_timeout()).await {
                found.push(rtu);
            }
        }

        if self.config.serial_enabled {
            if let Some(rtu) = self.identify(USB_ADDRESS, self.config.serial_timeout()).await {
                found.push(rtu);
            }
        }

        self.replace_online(found.clone());
        info!("There are {} RTUs online", found.len());
        found
    }

    /// Swap the whole online set
    pub fn replace_online(&self, rtus: Vec<Rtu>) {
        *self.online.write() = rtus;
    }

    async fn identify(&self, address: &str, timeout: std::time::Duration) -> Option<Rtu> {
        let reply = match self
            .link
            .send_idempotent(
                address,
                self.config.port,
                timeout,
                IDENTIFY,
                self.config.query_attempts,
            )
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                debug!("No identify reply from {}: {}", address, e);
                return None;
            },
        };

        let Some((rtuid, version)) = parse_identify(&reply) else {
            warn!("Unrecognized identify reply from {}: {:?}", address, reply);
            return None;
        };

        let modes = match self.store.load_pin_modes(&rtuid).await {
            Ok(modes) => modes,
            Err(e) => {
                warn!("Failed to load pin modes for {}: {}", rtuid, e);
                Vec::new()
            },
        };

        info!("Found {} ({}) at {}", rtuid, version, address);
        Some(Rtu::identified(rtuid, address, version).with_pin_modes(modes))
    }

    /// Snapshot of the online set
    pub fn online(&self) -> Vec<Rtu> {
        self.online.read().clone()
    }

    pub fn online_count(&self) -> usize {
        self.online.read().len()
    }

    pub fn find(&self, rtuid: &str) -> Option<Rtu> {
        self.online.read().iter().find(|r| r.rtuid == rtuid).cloned()
    }

    /// Devices whose live pin modes disagree with the configured ones
    ///
    /// A failed status fetch also counts as a mismatch. Reporting only.
    pub async fn validate_pin_modes(&self, rtus: &[Rtu]) -> Vec<Rtu> {
        let mut incongruent = Vec::new();
        for rtu in rtus {
            let reply = self
                .link
                .send_idempotent(
                    &rtu.address,
                    self.config.port,
                    self.config.pin_mode_timeout(),
                    PIN_MODES,
                    self.config.query_attempts,
                )
                .await;

            let congruent = match reply {
                Ok(reply) => {
                    let live = live_mode_string(&reply);
                    let configured = rtu.configured_mode_string();
                    let ok = pin_modes_congruent(live, &configured);
                    if !ok {
                        warn!(
                            "Pin modes of {} differ: device '{}', configured '{}'",
                            rtu.rtuid, live, configured
                        );
                    }
                    ok
                },
                Err(e) => {
                    warn!("Pin mode query to {} failed: {}", rtu.rtuid, e);
                    false
                },
            };

            if !congruent {
                incongruent.push(rtu.clone());
            }
        }
        incongruent
    }
}
