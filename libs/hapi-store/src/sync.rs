//! Core dataset access for synchronization
//!
//! The merge policy lives with the caller; the store only guarantees that a
//! merge runs as one transaction under the write lock, and that every applied
//! core write bumps the version counter.

use std::collections::BTreeMap;

use hapi_model::{CoreDataset, CoreRow, CoreTable, DbVersion};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Row, SqliteConnection};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::rows::row_key;
use crate::schema::{table_spec, ColumnKind, ColumnSpec, TableSpec, CORE_TABLES};
use crate::store::{now_ms, Store};

/// What to do with one inbound row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    Apply,
    Keep,
}

impl Store {
    /// All core rows in canonical order: table, then primary key
    pub async fn read_core_rows(&self) -> Result<Vec<CoreRow>> {
        let mut rows = Vec::new();
        for spec in &CORE_TABLES {
            let fetched = sqlx::query(&spec.select_sql())
                .fetch_all(self.pool())
                .await?;
            for row in &fetched {
                rows.push(hydrate_core_row(spec, row)?);
            }
        }
        Ok(rows)
    }

    /// Current local version: write counter plus content fingerprint
    pub async fn read_version(&self) -> Result<DbVersion> {
        let counter: i64 = sqlx::query_scalar("SELECT counter FROM sync_meta WHERE id = 1")
            .fetch_one(self.pool())
            .await?;
        let rows = self.read_core_rows().await?;
        Ok(DbVersion {
            node: self.node().to_string(),
            counter,
            fingerprint: fingerprint(&rows),
        })
    }

    /// Snapshot of the core tables for publishing
    pub async fn core_dataset(&self) -> Result<CoreDataset> {
        let rows = self.read_core_rows().await?;
        let counter: i64 = sqlx::query_scalar("SELECT counter FROM sync_meta WHERE id = 1")
            .fetch_one(self.pool())
            .await?;
        let version = DbVersion {
            node: self.node().to_string(),
            counter,
            fingerprint: fingerprint(&rows),
        };
        Ok(CoreDataset {
            node: self.node().to_string(),
            version,
            rows,
        })
    }

    /// Look up one core row by its primary key values, in key column order
    pub async fn core_row(&self, table: CoreTable, key: &[Value]) -> Result<Option<CoreRow>> {
        let spec = table_spec(table);
        if key.len() != spec.keys.len() {
            return Ok(None);
        }
        let values: BTreeMap<String, Value> = spec
            .keys
            .iter()
            .zip(key)
            .map(|(column, value)| (column.name.to_string(), value.clone()))
            .collect();
        let mut conn = self.pool().acquire().await?;
        fetch_core_row(&mut conn, spec, &values).await
    }

    /// Write a locally edited core row, stamped with now and this node
    pub async fn save_core_row(&self, mut row: CoreRow) -> Result<()> {
        row.updated_at = now_ms();
        row.origin = self.node().to_string();
        validate_core_row(&row)?;

        let _guard = self.write_guard().await;
        let mut tx = self.pool().begin().await?;
        upsert_core_row(&mut tx, &row).await?;
        bump_counter(&mut tx).await?;
        tx.commit().await?;
        debug!(table = %row.table, key = %row.key, "Saved core row");
        Ok(())
    }

    /// Merge inbound rows in one transaction
    ///
    /// `decide` sees the current local row (if any) and the inbound row and
    /// chooses whether to apply it. Applied rows keep their own stamp. Rows
    /// must have passed [`validate_core_row`]. Returns the number applied.
    pub async fn merge_core_rows<F>(&self, rows: &[CoreRow], mut decide: F) -> Result<usize>
    where
        F: FnMut(Option<&CoreRow>, &CoreRow) -> MergeAction,
    {
        let _guard = self.write_guard().await;
        let mut tx = self.pool().begin().await?;
        let mut applied = 0;

        for inbound in rows {
            let local =
                fetch_core_row(&mut tx, table_spec(inbound.table), &inbound.values).await?;
            if decide(local.as_ref(), inbound) == MergeAction::Apply {
                upsert_core_row(&mut tx, inbound).await?;
                applied += 1;
            }
        }

        if applied > 0 {
            bump_counter(&mut tx).await?;
        }
        tx.commit().await?;
        Ok(applied)
    }
}

/// Hex SHA-256 over the canonical content of `rows`
///
/// Stamps are excluded: two nodes holding the same data agree on the
/// fingerprint even when their rows were written at different times.
pub fn fingerprint(rows: &[CoreRow]) -> String {
    let mut sorted: Vec<&CoreRow> = rows.iter().collect();
    sorted.sort_by(|a, b| (a.table, &a.key).cmp(&(b.table, &b.key)));

    let mut hasher = Sha256::new();
    for row in sorted {
        hasher.update(row.table.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(row.key.as_bytes());
        hasher.update(b"\0");
        // BTreeMap serializes with sorted keys
        hasher.update(serde_json::to_string(&row.values).unwrap_or_default().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Check an inbound row against the table layout
pub fn validate_core_row(row: &CoreRow) -> Result<()> {
    let spec = table_spec(row.table);
    let malformed = |reason: String| StoreError::MalformedSyncRow {
        table: row.table.to_string(),
        reason,
    };

    if row.origin.trim().is_empty() {
        return Err(malformed("missing origin".into()));
    }
    for name in row.values.keys() {
        if !spec.all_columns().any(|c| c.name == name) {
            return Err(malformed(format!("unknown column '{}'", name)));
        }
    }
    for column in spec.all_columns() {
        let value = row
            .values
            .get(column.name)
            .ok_or_else(|| malformed(format!("missing column '{}'", column.name)))?;
        let is_key = spec.keys.iter().any(|k| k.name == column.name);
        let type_ok = match (column.kind, value) {
            (_, Value::Null) => column.nullable && !is_key,
            (ColumnKind::Text, Value::String(_)) => true,
            (ColumnKind::Integer, Value::Number(n)) => n.is_i64(),
            _ => false,
        };
        if !type_ok {
            return Err(malformed(format!(
                "bad value for '{}': {}",
                column.name, value
            )));
        }
    }
    if row_key(row.table, &row.values) != row.key {
        return Err(malformed(format!("key '{}' does not match columns", row.key)));
    }
    Ok(())
}

fn hydrate_core_row(spec: &TableSpec, row: &SqliteRow) -> Result<CoreRow> {
    let mut values = BTreeMap::new();
    for column in spec.all_columns() {
        let value = match column.kind {
            ColumnKind::Text => row
                .try_get::<Option<String>, _>(column.name)?
                .map_or(Value::Null, Value::String),
            ColumnKind::Integer => row
                .try_get::<Option<i64>, _>(column.name)?
                .map_or(Value::Null, Value::from),
        };
        values.insert(column.name.to_string(), value);
    }
    Ok(CoreRow {
        key: row_key(spec.table, &values),
        table: spec.table,
        values,
        updated_at: row.try_get("updated_at")?,
        origin: row.try_get("origin")?,
    })
}

fn bind_column<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    column: &ColumnSpec,
    value: Option<&Value>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match column.kind {
        ColumnKind::Text => query.bind(value.and_then(|v| match v {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })),
        ColumnKind::Integer => query.bind(value.and_then(Value::as_i64)),
    }
}

/// Select by the typed key column values; the joined key string is ambiguous
/// once a text key contains '/'
async fn fetch_core_row(
    conn: &mut SqliteConnection,
    spec: &TableSpec,
    values: &BTreeMap<String, Value>,
) -> Result<Option<CoreRow>> {
    let sql = spec.select_one_sql();
    let mut query = sqlx::query(&sql);
    for column in spec.keys {
        let value = values.get(column.name);
        let typed = match (column.kind, value) {
            (ColumnKind::Text, Some(Value::String(_))) => true,
            (ColumnKind::Integer, Some(v)) => v.is_i64(),
            _ => false,
        };
        if !typed {
            return Ok(None);
        }
        query = bind_column(query, column, value);
    }

    let row = query.fetch_optional(&mut *conn).await?;
    row.map(|row| hydrate_core_row(spec, &row)).transpose()
}

async fn upsert_core_row(conn: &mut SqliteConnection, row: &CoreRow) -> Result<()> {
    let spec = table_spec(row.table);
    let sql = spec.upsert_sql();
    let mut query = sqlx::query(&sql);
    for column in spec.all_columns() {
        query = bind_column(query, column, row.values.get(column.name));
    }
    query
        .bind(row.updated_at)
        .bind(row.origin.clone())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn bump_counter(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("UPDATE sync_meta SET counter = counter + 1 WHERE id = 1")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn asset_row(origin: &str, name: &str) -> CoreRow {
        let values: BTreeMap<String, Value> = [
            ("asset_id", json!(3)),
            ("rtuid", json!("RTU1")),
            ("abbreviation", json!("wt")),
            ("name", json!(name)),
            ("pin", json!("A0")),
            ("unit", json!("C")),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        CoreRow {
            table: CoreTable::Assets,
            key: "3".into(),
            values,
            updated_at: 100,
            origin: origin.into(),
        }
    }

    #[test]
    fn test_fingerprint_ignores_stamps_and_order() {
        let a = asset_row("alpha", "Water Temp");
        let mut b = a.clone();
        b.updated_at = 999;
        b.origin = "beta".into();
        assert_eq!(fingerprint(&[a.clone()]), fingerprint(&[b]));

        let c = asset_row("alpha", "Air Temp");
        assert_ne!(fingerprint(&[a.clone()]), fingerprint(&[c]));
    }

    #[test]
    fn test_validate_rejects_bad_rows() {
        assert!(validate_core_row(&asset_row("alpha", "x")).is_ok());

        let mut wrong_type = asset_row("alpha", "x");
        wrong_type.values.insert("asset_id".into(), json!("three"));
        assert!(validate_core_row(&wrong_type).is_err());

        let mut extra = asset_row("alpha", "x");
        extra.values.insert("colour".into(), json!("red"));
        assert!(validate_core_row(&extra).is_err());

        let mut wrong_key = asset_row("alpha", "x");
        wrong_key.key = "4".into();
        assert!(validate_core_row(&wrong_key).is_err());

        assert!(validate_core_row(&asset_row("", "x")).is_err());
    }
}
