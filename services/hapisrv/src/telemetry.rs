//! Telemetry ingestion into `sensor_data` and `system_status`

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use errors::{HapiError, HapiResult};
use hapi_model::asset::numeric_value;
use hapi_model::{AssetReading, StatusSnapshot, VIRTUAL_TARGET};
use hapi_store::Store;
use serde_json::Value;
use tracing::debug;

#[derive(Clone)]
pub struct TelemetrySink {
    store: Store,
}

impl TelemetrySink {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Store the readings in a device telemetry reply
    ///
    /// The reply is a JSON object whose `name` field is the RTU id; every
    /// asset of that RTU takes its value from the key named by its pin.
    /// Returns the number of rows written.
    pub async fn log_device_response(&self, response: &str, now: DateTime<Utc>) -> HapiResult<usize> {
        let json: Value = serde_json::from_str(response.trim())?;
        let object = json
            .as_object()
            .ok_or_else(|| HapiError::protocol("Telemetry reply is not a JSON object"))?;
        let rtuid = object
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| HapiError::protocol("Telemetry reply has no 'name' field"))?;

        let values: BTreeMap<String, f64> = object
            .iter()
            .filter_map(|(k, v)| numeric_value(v).map(|n| (k.clone(), n)))
            .collect();
        self.log_values(rtuid, &values, now).await
    }

    /// Store the result of a local computation against virtual assets
    pub async fn log_virtual(
        &self,
        values: &BTreeMap<String, f64>,
        now: DateTime<Utc>,
    ) -> HapiResult<usize> {
        self.log_values(VIRTUAL_TARGET, values, now).await
    }

    async fn log_values(
        &self,
        rtuid: &str,
        values: &BTreeMap<String, f64>,
        now: DateTime<Utc>,
    ) -> HapiResult<usize> {
        let assets = self.store.load_assets().await?;
        let mut written = 0;

        for asset in assets.iter().filter(|a| a.rtuid == rtuid) {
            let Some(value) = values.get(&asset.pin) else {
                debug!("No value for {} pin {} in reply", asset.name, asset.pin);
                continue;
            };
            let reading = AssetReading {
                asset_id: asset.asset_id,
                timestamp: now,
                value: Some(*value),
                unit: asset.unit.clone(),
            };
            if self.store.insert_sensor_data(&reading).await? {
                written += 1;
            }
        }

        debug!("Logged {} readings for {}", written, rtuid);
        Ok(written)
    }

    /// Store one reading received from a peer; duplicates are ignored
    pub async fn ingest_reading(&self, reading: &AssetReading) -> HapiResult<bool> {
        Ok(self.store.insert_sensor_data(reading).await?)
    }

    pub async fn record_status(&self, tag: &str, snapshot: &StatusSnapshot) -> HapiResult<()> {
        Ok(self.store.insert_system_status(tag, snapshot).await?)
    }
}
