//! SQLite storage behind an r2d2 pool.
//!
//! Every pooled connection gets WAL, a busy timeout and foreign keys, so the
//! cascades from bookings to invoices and payments hold on all paths.

use std::path::Path;
use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, error, info, warn};

use cb_core::config::DatabaseConfig;
use cb_core::error::{CbError, CbResult};

use crate::migrations;
use crate::schema;

type DbPool = Pool<SqliteConnectionManager>;

/// Shared handle to the pool. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    pool: Arc<DbPool>,
}

impl Database {
    /// Open (or create) the database file, then bring the schema up to date.
    pub fn init(db_path: &Path, config: &DatabaseConfig) -> CbResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("opening database at {}", db_path.display());

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_customizer(Box::new(ConnectionCustomizer {
                wal_mode: config.wal_mode,
            }))
            .build(manager)
            .map_err(|e| CbError::Pool(e.to_string()))?;

        let db = Self {
            pool: Arc::new(pool),
        };

        if config.integrity_check_on_startup {
            db.run_integrity_check()?;
        }

        {
            let conn = db.conn()?;
            schema::create_tables(&conn)?;
            migrations::run_migrations(&conn)?;
        }

        Ok(db)
    }

    pub fn conn(&self) -> CbResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| CbError::Pool(e.to_string()))
    }

    /// Run a SQLite integrity check.
    pub fn run_integrity_check(&self) -> CbResult<()> {
        let conn = self.conn()?;
        let result: String = conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))
            .map_err(|e| CbError::Database(e.to_string()))?;

        if result != "ok" {
            error!("database integrity check failed: {result}");
            return Err(CbError::IntegrityCheck(result));
        }

        debug!("database integrity check passed");
        Ok(())
    }

    /// Run `f` in a write transaction, committing only when it succeeds.
    ///
    /// The write lock is taken up front, so a slot checked inside `f` cannot
    /// be taken by another writer before the booking is stored.
    pub fn transaction<T, F>(&self, f: F) -> CbResult<T>
    where
        F: FnOnce(&Connection) -> CbResult<T>,
    {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| CbError::Database(e.to_string()))?;

        let result = f(&tx)?;

        tx.commit()
            .map_err(|e| CbError::Database(e.to_string()))?;

        Ok(result)
    }

    /// Get database statistics (row counts per table).
    pub fn stats(&self) -> CbResult<DatabaseStats> {
        let conn = self.conn()?;

        let count = |table: &str| -> CbResult<i64> {
            let sql = format!("SELECT COUNT(*) FROM {table}");
            conn.query_row(&sql, [], |row| row.get(0))
                .map_err(|e| CbError::Database(e.to_string()))
        };

        let mut tables = Vec::with_capacity(schema::COUNTED_TABLES.len());
        for table in schema::COUNTED_TABLES {
            tables.push((*table, count(table)?));
        }
        Ok(DatabaseStats { tables })
    }

    /// Reset the database by dropping and recreating all tables.
    pub fn reset(&self) -> CbResult<()> {
        warn!("resetting database - all data will be lost");
        let conn = self.conn()?;
        schema::drop_tables(&conn)?;
        schema::create_tables(&conn)?;
        migrations::run_migrations(&conn)?;
        info!("database reset complete");
        Ok(())
    }
}

/// Database row count statistics.
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub tables: Vec<(&'static str, i64)>,
}

impl DatabaseStats {
    /// Row count for one table, zero if it is not tracked.
    pub fn count(&self, table: &str) -> i64 {
        self.tables
            .iter()
            .find(|(name, _)| *name == table)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

impl std::fmt::Display for DatabaseStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .tables
            .iter()
            .map(|(name, n)| format!("{name}={n}"))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// r2d2 connection customizer that applies PRAGMA settings.
#[derive(Debug)]
struct ConnectionCustomizer {
    wal_mode: bool,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        if self.wal_mode {
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        }

        conn.execute_batch(
            "PRAGMA synchronous=NORMAL;
             PRAGMA temp_store=MEMORY;
             PRAGMA mmap_size=268435456;
             PRAGMA cache_size=-64000;
             PRAGMA busy_timeout=5000;
             PRAGMA foreign_keys=ON;",
        )?;

        Ok(())
    }
}
