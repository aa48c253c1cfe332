//! Typed access to core and log tables
//!
//! Core table writes go through [`Store::save_core_row`] so they are stamped
//! and counted for synchronization.

use chrono::{DateTime, Utc};
use hapi_model::{
    Asset, AssetReading, IntervalJob, JobKind, JobTarget, PinMode, Sequence, SequenceStep, Site,
    StatusSnapshot, TimeUnit,
};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::rows;
use crate::store::Store;

/// One entry of the command audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandLogEntry {
    pub rtuid: String,
    pub timestamp: DateTime<Utc>,
    pub command: String,
}

impl Store {
    // ========================================================================
    // Site
    // ========================================================================

    /// Load the facility profile; `None` when the table is empty
    pub async fn load_site(&self) -> Result<Option<Site>> {
        let row = sqlx::query(
            r#"
            SELECT site_id, name, operator, email, phone, location, net_iface
            FROM site
            ORDER BY site_id
            LIMIT 1
            "#,
        )
        .fetch_optional(self.pool())
        .await?;

        row.map(|row| hydrate_site(&row)).transpose()
    }

    pub async fn save_site(&self, site: &Site) -> Result<()> {
        self.save_core_row(rows::site_row(site)).await
    }

    // ========================================================================
    // Jobs and sequences
    // ========================================================================

    /// Load every job row
    ///
    /// Malformed rows come back as errors in place so the caller can log and
    /// skip them without losing the rest of the schedule.
    pub async fn load_jobs(&self) -> Result<Vec<Result<IntervalJob>>> {
        let rows = sqlx::query(
            r#"
            SELECT job_id, job_name, rtuid, command, sequence, kind, time_unit,
                   interval, at_time, enabled, timeout
            FROM interval_schedule
            ORDER BY job_id
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(hydrate_job).collect())
    }

    pub async fn save_job(&self, job: &IntervalJob) -> Result<()> {
        self.save_core_row(rows::job_row(job)).await
    }

    /// Load a sequence with its steps in ascending order
    pub async fn load_sequence(&self, name: &str) -> Result<Sequence> {
        let rows = sqlx::query(
            r#"
            SELECT name, step, step_name, command, timeout
            FROM sequence
            WHERE name = ?
            ORDER BY step
            "#,
        )
        .bind(name)
        .fetch_all(self.pool())
        .await?;

        let mut steps = Vec::with_capacity(rows.len());
        for row in rows {
            steps.push(hydrate_step(&row)?);
        }
        Ok(Sequence::new(name, steps))
    }

    pub async fn save_sequence_step(&self, step: &SequenceStep) -> Result<()> {
        self.save_core_row(rows::step_row(step)).await
    }

    // ========================================================================
    // Pins and assets
    // ========================================================================

    /// Pin configuration of one RTU, ordered by position
    pub async fn load_pin_modes(&self, rtuid: &str) -> Result<Vec<PinMode>> {
        let rows = sqlx::query(
            r#"
            SELECT pin, mode, def_value, pos
            FROM pins
            WHERE rtuid = ?
            ORDER BY pos
            "#,
        )
        .bind(rtuid)
        .fetch_all(self.pool())
        .await?;

        let mut modes = Vec::with_capacity(rows.len());
        for row in rows {
            modes.push(PinMode {
                pin: row.try_get("pin")?,
                mode: row.try_get("mode")?,
                default_value: row.try_get("def_value")?,
                pos: row.try_get("pos")?,
            });
        }
        Ok(modes)
    }

    pub async fn save_pin_mode(&self, rtuid: &str, mode: &PinMode) -> Result<()> {
        self.save_core_row(rows::pin_row(rtuid, mode)).await
    }

    pub async fn load_assets(&self) -> Result<Vec<Asset>> {
        let rows = sqlx::query(
            r#"
            SELECT asset_id, rtuid, abbreviation, name, pin, unit
            FROM assets
            ORDER BY asset_id
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(hydrate_asset).collect()
    }

    pub async fn load_asset(&self, asset_id: i64) -> Result<Option<Asset>> {
        let row = sqlx::query(
            r#"
            SELECT asset_id, rtuid, abbreviation, name, pin, unit
            FROM assets
            WHERE asset_id = ?
            "#,
        )
        .bind(asset_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(|row| hydrate_asset(&row)).transpose()
    }

    pub async fn save_asset(&self, asset: &Asset) -> Result<()> {
        self.save_core_row(rows::asset_row(asset)).await
    }

    // ========================================================================
    // Telemetry and audit logs
    // ========================================================================

    /// Store one reading; a reading already stored for the same asset and
    /// timestamp is ignored. Returns whether a row was written.
    pub async fn insert_sensor_data(&self, reading: &AssetReading) -> Result<bool> {
        let _guard = self.write_guard().await;
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO sensor_data (asset_id, timestamp, value, unit)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(reading.asset_id)
        .bind(reading.timestamp)
        .bind(reading.value)
        .bind(&reading.unit)
        .execute(self.pool())
        .await?;

        let inserted = result.rows_affected() > 0;
        debug!(
            asset_id = reading.asset_id,
            value = ?reading.value,
            inserted,
            "Sensor data"
        );
        Ok(inserted)
    }

    /// Most recent reading of an asset
    pub async fn latest_reading(&self, asset_id: i64) -> Result<Option<AssetReading>> {
        let row = sqlx::query(
            r#"
            SELECT asset_id, timestamp, value, unit
            FROM sensor_data
            WHERE asset_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(asset_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(|row| hydrate_reading(&row)).transpose()
    }

    /// All readings of an asset, oldest first
    pub async fn readings(&self, asset_id: i64) -> Result<Vec<AssetReading>> {
        let rows = sqlx::query(
            r#"
            SELECT asset_id, timestamp, value, unit
            FROM sensor_data
            WHERE asset_id = ?
            ORDER BY timestamp, id
            "#,
        )
        .bind(asset_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(hydrate_reading).collect()
    }

    pub async fn insert_command_log(
        &self,
        rtuid: &str,
        command: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let _guard = self.write_guard().await;
        sqlx::query("INSERT INTO command_log (rtuid, timestamp, command) VALUES (?, ?, ?)")
            .bind(rtuid)
            .bind(timestamp)
            .bind(command)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Most recent audit entries, newest first
    pub async fn recent_commands(&self, limit: i64) -> Result<Vec<CommandLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT rtuid, timestamp, command
            FROM command_log
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(CommandLogEntry {
                rtuid: row.try_get("rtuid")?,
                timestamp: row.try_get("timestamp")?,
                command: row.try_get("command")?,
            });
        }
        Ok(entries)
    }

    /// Record a status snapshot under `tag` (e.g. `system`)
    pub async fn insert_system_status(&self, tag: &str, snapshot: &StatusSnapshot) -> Result<()> {
        let payload = serde_json::to_string(snapshot)?;
        let _guard = self.write_guard().await;
        sqlx::query(
            "INSERT INTO system_status (tag, host, timestamp, payload) VALUES (?, ?, ?, ?)",
        )
        .bind(tag)
        .bind(&snapshot.host)
        .bind(snapshot.timestamp)
        .bind(payload)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn count_system_status(&self, tag: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM system_status WHERE tag = ?")
            .bind(tag)
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }
}

// ============================================================================
// Hydration
// ============================================================================

fn hydrate_site(row: &SqliteRow) -> Result<Site> {
    Ok(Site {
        site_id: row.try_get("site_id")?,
        name: row.try_get("name")?,
        operator: row.try_get("operator")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        location: row.try_get("location")?,
        net_iface: row.try_get("net_iface")?,
    })
}

fn hydrate_job(row: &SqliteRow) -> Result<IntervalJob> {
    const TABLE: &str = "interval_schedule";

    let job_id: i64 = row.try_get("job_id")?;
    let command: Option<String> = row.try_get("command")?;
    let sequence: Option<String> = row.try_get("sequence")?;
    let kind: String = row.try_get("kind")?;
    let time_unit: String = row.try_get("time_unit")?;
    let interval: i64 = row.try_get("interval")?;
    let timeout: i64 = row.try_get("timeout")?;
    let at_time: Option<String> = row.try_get("at_time")?;

    let target = JobTarget::from_columns(command.as_deref(), sequence.as_deref())
        .map_err(|reason| StoreError::invalid_row(TABLE, job_id, reason))?;
    let kind: JobKind = kind
        .parse()
        .map_err(|reason: String| StoreError::invalid_row(TABLE, job_id, reason))?;
    let time_unit: TimeUnit = time_unit
        .parse()
        .map_err(|reason: String| StoreError::invalid_row(TABLE, job_id, reason))?;

    if interval == 0 || interval < -1 {
        return Err(StoreError::invalid_row(
            TABLE,
            job_id,
            format!("interval must be positive or -1, got {}", interval),
        ));
    }
    if timeout < 0 {
        return Err(StoreError::invalid_row(
            TABLE,
            job_id,
            format!("negative timeout {}", timeout),
        ));
    }

    Ok(IntervalJob {
        job_id,
        job_name: row.try_get("job_name")?,
        rtuid: row.try_get("rtuid")?,
        target,
        kind,
        time_unit,
        interval,
        at_time: at_time.filter(|s| !s.trim().is_empty()),
        enabled: row.try_get::<i64, _>("enabled")? != 0,
        timeout_secs: timeout as u64,
    })
}

fn hydrate_step(row: &SqliteRow) -> Result<SequenceStep> {
    let name: String = row.try_get("name")?;
    let step: i64 = row.try_get("step")?;
    let timeout: i64 = row.try_get("timeout")?;
    if timeout < 0 {
        return Err(StoreError::invalid_row(
            "sequence",
            format!("{}/{}", name, step),
            format!("negative timeout {}", timeout),
        ));
    }
    Ok(SequenceStep {
        step,
        step_name: row.try_get("step_name")?,
        command: row.try_get("command")?,
        timeout_secs: timeout as u64,
        name,
    })
}

fn hydrate_asset(row: &SqliteRow) -> Result<Asset> {
    Ok(Asset {
        asset_id: row.try_get("asset_id")?,
        rtuid: row.try_get("rtuid")?,
        abbreviation: row.try_get("abbreviation")?,
        name: row.try_get("name")?,
        pin: row.try_get("pin")?,
        unit: row.try_get("unit")?,
    })
}

fn hydrate_reading(row: &SqliteRow) -> Result<AssetReading> {
    Ok(AssetReading {
        asset_id: row.try_get("asset_id")?,
        timestamp: row.try_get("timestamp")?,
        value: row.try_get("value")?,
        unit: row.try_get("unit")?,
    })
}
