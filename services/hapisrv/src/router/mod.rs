//! Message Router - topic dispatch for inbound pub/sub traffic
//!
//! Topics are matched by prefix in a fixed order and the first match wins.
//! Handlers run on the delivery task; device commands are handed off to
//! their own task so a slow RTU never holds up delivery.

pub mod mqtt;
pub mod publisher;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use errors::{HapiError, HapiResult};
use hapi_model::{topics, AssetReading, StatusSnapshot, SyncEnvelope};
use hapi_store::Store;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

pub use publisher::{MqttPublisher, Publisher};

use crate::alert::AssetAlert;
use crate::config::AssetConfig;
use crate::device::Registry;
use crate::status::StatusReporter;
use crate::sync::Synchronizer;
use crate::telemetry::TelemetrySink;

/// Tag under which peer status snapshots are stored
pub const SYSTEM_STATUS_TAG: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Command,
    AssetQuery,
    AssetResponse,
    StatusQuery,
    StatusResponse,
    SchedulerResponse,
    SchedulerQuery,
    SyncVersion,
    SyncGet,
    SyncData,
    BrokerClients,
}

/// Dispatch order; first matching prefix wins
const ROUTES: [(&str, Route); 11] = [
    (topics::COMMAND_PREFIX, Route::Command),
    (topics::ASSET_QUERY, Route::AssetQuery),
    (topics::ASSET_RESPONSE, Route::AssetResponse),
    (topics::STATUS_QUERY, Route::StatusQuery),
    (topics::STATUS_RESPONSE, Route::StatusResponse),
    (topics::SCHEDULER_RESPONSE, Route::SchedulerResponse),
    (topics::SCHEDULER_QUERY, Route::SchedulerQuery),
    (topics::SYNC_VERSION, Route::SyncVersion),
    (topics::SYNC_GET, Route::SyncGet),
    (topics::SYNC_DATA, Route::SyncData),
    (topics::BROKER_CLIENTS, Route::BrokerClients),
];

impl Route {
    pub fn resolve(topic: &str) -> Option<Route> {
        ROUTES
            .iter()
            .find(|(prefix, _)| topic.starts_with(prefix))
            .map(|(_, route)| *route)
    }
}

pub struct Router {
    store: Store,
    registry: Arc<Registry>,
    status: Arc<StatusReporter>,
    telemetry: TelemetrySink,
    synchronizer: Synchronizer,
    publisher: Arc<dyn Publisher>,
    asset_id: Option<i64>,
    alert: AssetAlert,
    command_timeout: Duration,
    scheduler_found: AtomicBool,
    last_status: Mutex<Option<StatusSnapshot>>,
}

impl Router {
    pub fn new(
        store: Store,
        registry: Arc<Registry>,
        status: Arc<StatusReporter>,
        publisher: Arc<dyn Publisher>,
        asset: &AssetConfig,
        command_timeout: Duration,
    ) -> Self {
        Self {
            telemetry: TelemetrySink::new(store.clone()),
            synchronizer: Synchronizer::new(store.clone()),
            store,
            registry,
            status,
            publisher,
            asset_id: asset.id,
            alert: AssetAlert::new(asset),
            command_timeout,
            scheduler_found: AtomicBool::new(false),
            last_status: Mutex::new(None),
        }
    }

    /// Keep published core datasets within the broker's packet limit
    pub fn with_sync_payload_limit(mut self, bytes: usize) -> Self {
        self.synchronizer = self.synchronizer.with_max_payload(bytes);
        self
    }

    pub fn node(&self) -> &str {
        self.store.node()
    }

    /// Whether a peer has answered as the scheduler
    pub fn scheduler_found(&self) -> bool {
        self.scheduler_found.load(Ordering::Relaxed)
    }

    pub fn alert(&self) -> &AssetAlert {
        &self.alert
    }

    /// Publish this node's core rows, e.g. after (re)connecting
    pub async fn publish_core_db(&self) -> HapiResult<usize> {
        self.synchronizer.publish_core_db(self.publisher.as_ref()).await
    }

    /// Handle one inbound message; returns the route taken
    ///
    /// Handler failures are logged, never returned.
    pub async fn dispatch(&self, topic: &str, payload: &str) -> Option<Route> {
        let Some(route) = Route::resolve(topic) else {
            debug!("Ignoring message on {}", topic);
            return None;
        };

        let result = match route {
            Route::Command => self.on_command(topic, payload),
            Route::AssetQuery => self.on_asset_query().await,
            Route::AssetResponse => self.on_asset_response(topic, payload).await,
            Route::StatusQuery => self.on_status_query(),
            Route::StatusResponse => self.on_status_response(payload).await,
            Route::SchedulerResponse => {
                info!("Scheduler present at {}", payload.trim());
                self.scheduler_found.store(true, Ordering::Relaxed);
                Ok(())
            },
            Route::SchedulerQuery => self.on_scheduler_query(),
            Route::SyncVersion => self.on_sync_version().await,
            Route::SyncGet => self.on_sync_get(payload).await,
            Route::SyncData => self.synchronizer.synchronize(payload).await.map(|_| ()),
            Route::BrokerClients => self.on_broker_clients(payload),
        };

        if let Err(e) = result {
            warn!("Handling {} failed: {}", topic, e);
        }
        Some(route)
    }

    fn publish(&self, topic: impl Into<String>, payload: impl Into<String>) -> HapiResult<()> {
        self.publisher.publish(SyncEnvelope::new(topic, payload))
    }

    /// `COMMAND/<rtuid>`: run the payload on the device in the background
    fn on_command(&self, topic: &str, payload: &str) -> HapiResult<()> {
        let rtuid = topic.trim_start_matches(topics::COMMAND_PREFIX);
        let command = payload.trim().to_string();
        if rtuid.is_empty() || command.is_empty() {
            return Err(HapiError::Validation(format!(
                "Incomplete command message on {}",
                topic
            )));
        }
        let Some(rtu) = self.registry.find(rtuid) else {
            debug!("Command for {} ignored: not online here", rtuid);
            return Ok(());
        };

        let link = self.registry.link();
        let port = self.registry.device_port();
        let store = self.store.clone();
        let timeout = self.command_timeout;
        tokio::spawn(async move {
            match link.send(&rtu.address, port, timeout, &command).await {
                Ok(_) => {
                    if let Err(e) = store.insert_command_log(&rtu.rtuid, &command, Utc::now()).await {
                        warn!("Failed to log command for {}: {}", rtu.rtuid, e);
                    }
                },
                Err(e) => warn!("External command to {} failed: {}", rtu.rtuid, e),
            }
        });
        Ok(())
    }

    async fn on_asset_query(&self) -> HapiResult<()> {
        let Some(asset_id) = self.asset_id else {
            debug!("No local asset configured; ignoring asset query");
            return Ok(());
        };
        let reading = match self.store.latest_reading(asset_id).await? {
            Some(reading) => reading,
            None => {
                let unit = self
                    .store
                    .load_asset(asset_id)
                    .await?
                    .map(|a| a.unit)
                    .unwrap_or_default();
                AssetReading {
                    asset_id,
                    timestamp: Utc::now(),
                    value: None,
                    unit,
                }
            },
        };
        self.publish(
            topics::asset_response(asset_id),
            serde_json::to_string(&reading)?,
        )
    }

    async fn on_asset_response(&self, topic: &str, payload: &str) -> HapiResult<()> {
        let Some(asset_id) = self.asset_id else {
            return Ok(());
        };
        let id = topic
            .trim_start_matches(topics::ASSET_RESPONSE)
            .trim_start_matches('/');
        if id.parse::<i64>().ok() != Some(asset_id) {
            return Ok(());
        }

        let asset = self
            .store
            .load_asset(asset_id)
            .await?
            .ok_or_else(|| HapiError::not_found(format!("asset {}", asset_id)))?;
        let reading = AssetReading::parse(&asset, payload, Utc::now()).map_err(HapiError::Validation)?;

        let Some(value) = reading.value else {
            debug!("Asset {} response carries no value", asset_id);
            return Ok(());
        };
        self.alert.evaluate(value);
        self.telemetry.ingest_reading(&reading).await?;
        Ok(())
    }

    fn on_status_query(&self) -> HapiResult<()> {
        let snapshot = self.status.snapshot(self.registry.online_count());
        let payload = serde_json::to_string(&snapshot)?;
        *self.last_status.lock() = Some(snapshot);
        self.publish(topics::STATUS_RESPONSE, payload)
    }

    /// Store a peer's snapshot; fall back to the last local one if unreadable
    async fn on_status_response(&self, payload: &str) -> HapiResult<()> {
        let snapshot = match serde_json::from_str::<StatusSnapshot>(payload) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let last = self.last_status.lock().clone();
                match last {
                    Some(snapshot) => {
                        debug!("Unreadable status response ({}); using last local snapshot", e);
                        snapshot
                    },
                    None => return Err(e.into()),
                }
            },
        };
        self.telemetry
            .record_status(SYSTEM_STATUS_TAG, &snapshot)
            .await
    }

    fn on_scheduler_query(&self) -> HapiResult<()> {
        if !self.status.is_scheduler() {
            return Ok(());
        }
        self.publish(topics::SCHEDULER_RESPONSE, self.node())
    }

    async fn on_sync_version(&self) -> HapiResult<()> {
        let version = self.synchronizer.read_version().await?;
        self.publish(topics::SYNC_RESPONSE, serde_json::to_string(&version)?)
    }

    async fn on_sync_get(&self, payload: &str) -> HapiResult<()> {
        if payload.trim() != self.node() {
            return Ok(());
        }
        self.publish_core_db().await.map(|_| ())
    }

    fn on_broker_clients(&self, payload: &str) -> HapiResult<()> {
        let count: i64 = payload.trim().parse()?;
        self.status.set_broker_clients(count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_resolve_in_order() {
        assert_eq!(Route::resolve("COMMAND/RTU1"), Some(Route::Command));
        assert_eq!(Route::resolve("ASSET/QUERY"), Some(Route::AssetQuery));
        assert_eq!(Route::resolve("ASSET/RESPONSE/4"), Some(Route::AssetResponse));
        assert_eq!(Route::resolve("STATUS/RESPONSE"), Some(Route::StatusResponse));
        assert_eq!(Route::resolve("SYNCHRONIZE/DATA/node-b"), Some(Route::SyncData));
        assert_eq!(
            Route::resolve("$SYS/broker/clients/total"),
            Some(Route::BrokerClients)
        );
    }

    #[test]
    fn test_unknown_and_outbound_only_topics_do_not_route() {
        assert_eq!(Route::resolve("weather/today"), None);
        assert_eq!(Route::resolve("SYNCHRONIZE/RESPONSE"), None);
        assert_eq!(Route::resolve(""), None);
    }
}
