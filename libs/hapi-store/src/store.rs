//! Store handle: connection pool, write serialization and node identity

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::error::Result;
use crate::schema;

/// Handle to the node's SQLite database
///
/// Cheap to clone. Reads go straight to the pool; every write path takes the
/// store-wide write lock so at most one write transaction is in flight.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
    node: Arc<str>,
}

impl Store {
    /// Open (and create if missing) the database file at `path`
    pub async fn open(path: impl AsRef<Path>, node: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool, node).await?;
        info!("SQLite database ready: {}", path.display());
        Ok(store)
    }

    /// Private in-memory database, used by tests and `--validate` runs
    ///
    /// A single connection that never expires keeps the database alive for
    /// the lifetime of the pool.
    pub async fn open_in_memory(node: impl Into<String>) -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool, node).await
    }

    /// Wrap an existing pool and make sure the schema exists
    pub async fn from_pool(pool: SqlitePool, node: impl Into<String>) -> Result<Self> {
        schema::init_schema(&pool).await?;
        Ok(Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
            node: Arc::from(node.into()),
        })
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Node name stamped as `origin` on local core writes
    pub fn node(&self) -> &str {
        &self.node
    }

    pub(crate) async fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    /// Check if database is accessible
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Milliseconds since the Unix epoch, used as the write stamp
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
