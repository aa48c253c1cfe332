//! Database schema and core table layout
//!
//! Core tables carry `updated_at` (ms since epoch) and `origin` (writing node)
//! so rows can be merged across nodes. Log tables are local only.

use hapi_model::CoreTable;
use sqlx::SqlitePool;

use crate::error::Result;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS site (
        site_id TEXT PRIMARY KEY,
        name TEXT NOT NULL DEFAULT '',
        operator TEXT NOT NULL DEFAULT '',
        email TEXT NOT NULL DEFAULT '',
        phone TEXT NOT NULL DEFAULT '',
        location TEXT NOT NULL DEFAULT '',
        net_iface TEXT NOT NULL DEFAULT '',
        updated_at INTEGER NOT NULL DEFAULT 0,
        origin TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS interval_schedule (
        job_id INTEGER PRIMARY KEY,
        job_name TEXT NOT NULL,
        rtuid TEXT NOT NULL,
        command TEXT,
        sequence TEXT,
        kind TEXT NOT NULL DEFAULT 'command',
        time_unit TEXT NOT NULL,
        interval INTEGER NOT NULL,
        at_time TEXT,
        enabled INTEGER NOT NULL DEFAULT 1,
        timeout INTEGER NOT NULL DEFAULT 5,
        updated_at INTEGER NOT NULL DEFAULT 0,
        origin TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sequence (
        name TEXT NOT NULL,
        step INTEGER NOT NULL,
        step_name TEXT NOT NULL DEFAULT '',
        command TEXT NOT NULL,
        timeout INTEGER NOT NULL DEFAULT 5,
        updated_at INTEGER NOT NULL DEFAULT 0,
        origin TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (name, step)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pins (
        rtuid TEXT NOT NULL,
        pin TEXT NOT NULL,
        mode TEXT NOT NULL,
        def_value TEXT NOT NULL DEFAULT '',
        pos INTEGER NOT NULL,
        updated_at INTEGER NOT NULL DEFAULT 0,
        origin TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (rtuid, pin)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS assets (
        asset_id INTEGER PRIMARY KEY,
        rtuid TEXT NOT NULL,
        abbreviation TEXT NOT NULL DEFAULT '',
        name TEXT NOT NULL DEFAULT '',
        pin TEXT NOT NULL,
        unit TEXT NOT NULL DEFAULT '',
        updated_at INTEGER NOT NULL DEFAULT 0,
        origin TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sensor_data (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        asset_id INTEGER NOT NULL,
        timestamp TEXT NOT NULL,
        value REAL,
        unit TEXT NOT NULL DEFAULT '',
        UNIQUE (asset_id, timestamp)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS command_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        rtuid TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        command TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS system_status (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        tag TEXT NOT NULL,
        host TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        payload TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sync_meta (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        counter INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "INSERT OR IGNORE INTO sync_meta (id, counter) VALUES (1, 0)",
    "CREATE INDEX IF NOT EXISTS idx_sensor_data_asset ON sensor_data (asset_id, timestamp)",
];

/// Create all tables if missing
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

// ============================================================================
// Core table layout
// ============================================================================

/// Storage class of a synchronized column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
}

const fn text(name: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        kind: ColumnKind::Text,
        nullable: false,
    }
}

const fn opt_text(name: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        kind: ColumnKind::Text,
        nullable: true,
    }
}

const fn integer(name: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        kind: ColumnKind::Integer,
        nullable: false,
    }
}

/// Column layout of one core table, stamp columns excluded
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub table: CoreTable,
    pub keys: &'static [ColumnSpec],
    pub columns: &'static [ColumnSpec],
}

impl TableSpec {
    pub fn name(&self) -> &'static str {
        self.table.as_str()
    }

    /// Keys first, then data columns
    pub fn all_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.keys.iter().chain(self.columns.iter())
    }

    pub fn select_sql(&self) -> String {
        let cols: Vec<&str> = self.all_columns().map(|c| c.name).collect();
        let order: Vec<&str> = self.keys.iter().map(|c| c.name).collect();
        format!(
            "SELECT {}, updated_at, origin FROM {} ORDER BY {}",
            cols.join(", "),
            self.name(),
            order.join(", ")
        )
    }

    pub fn select_one_sql(&self) -> String {
        let cols: Vec<&str> = self.all_columns().map(|c| c.name).collect();
        let filter: Vec<String> = self.keys.iter().map(|c| format!("{} = ?", c.name)).collect();
        format!(
            "SELECT {}, updated_at, origin FROM {} WHERE {}",
            cols.join(", "),
            self.name(),
            filter.join(" AND ")
        )
    }

    pub fn upsert_sql(&self) -> String {
        let cols: Vec<&str> = self.all_columns().map(|c| c.name).collect();
        let placeholders = vec!["?"; cols.len() + 2].join(", ");
        let keys: Vec<&str> = self.keys.iter().map(|c| c.name).collect();
        let updates: Vec<String> = self
            .columns
            .iter()
            .map(|c| c.name)
            .chain(["updated_at", "origin"])
            .map(|name| format!("{name} = excluded.{name}"))
            .collect();
        format!(
            "INSERT INTO {} ({}, updated_at, origin) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {}",
            self.name(),
            cols.join(", "),
            placeholders,
            keys.join(", "),
            updates.join(", ")
        )
    }
}

pub const CORE_TABLES: [TableSpec; 5] = [
    TableSpec {
        table: CoreTable::Site,
        keys: &[text("site_id")],
        columns: &[
            text("name"),
            text("operator"),
            text("email"),
            text("phone"),
            text("location"),
            text("net_iface"),
        ],
    },
    TableSpec {
        table: CoreTable::IntervalSchedule,
        keys: &[integer("job_id")],
        columns: &[
            text("job_name"),
            text("rtuid"),
            opt_text("command"),
            opt_text("sequence"),
            text("kind"),
            text("time_unit"),
            integer("interval"),
            opt_text("at_time"),
            integer("enabled"),
            integer("timeout"),
        ],
    },
    TableSpec {
        table: CoreTable::Sequence,
        keys: &[text("name"), integer("step")],
        columns: &[text("step_name"), text("command"), integer("timeout")],
    },
    TableSpec {
        table: CoreTable::Pins,
        keys: &[text("rtuid"), text("pin")],
        columns: &[text("mode"), text("def_value"), integer("pos")],
    },
    TableSpec {
        table: CoreTable::Assets,
        keys: &[integer("asset_id")],
        columns: &[
            text("rtuid"),
            text("abbreviation"),
            text("name"),
            text("pin"),
            text("unit"),
        ],
    },
];

pub fn table_spec(table: CoreTable) -> &'static TableSpec {
    match table {
        CoreTable::Site => &CORE_TABLES[0],
        CoreTable::IntervalSchedule => &CORE_TABLES[1],
        CoreTable::Sequence => &CORE_TABLES[2],
        CoreTable::Pins => &CORE_TABLES[3],
        CoreTable::Assets => &CORE_TABLES[4],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_spec_lookup_matches_table() {
        for table in CoreTable::ALL {
            assert_eq!(table_spec(table).table, table);
        }
    }

    #[test]
    fn test_upsert_sql_shape() {
        let sql = table_spec(CoreTable::Pins).upsert_sql();
        assert_eq!(
            sql,
            "INSERT INTO pins (rtuid, pin, mode, def_value, pos, updated_at, origin) \
             VALUES (?, ?, ?, ?, ?, ?, ?) ON CONFLICT (rtuid, pin) DO UPDATE SET \
             mode = excluded.mode, def_value = excluded.def_value, pos = excluded.pos, \
             updated_at = excluded.updated_at, origin = excluded.origin"
        );
    }
}
