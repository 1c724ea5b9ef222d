//! Versioned database migrations.
//!
//! Migrations run sequentially from the current stored version to the latest.
//! Each migration is idempotent.

use rusqlite::Connection;
use tracing::{info, warn};
use cb_core::error::{CbError, CbResult};
use cb_core::constants::DB_SCHEMA_VERSION;

/// Run all pending migrations on the database.
pub fn run_migrations(conn: &Connection) -> CbResult<()> {
    let current_version = get_schema_version(conn)?;

    if current_version >= DB_SCHEMA_VERSION {
        info!("database schema is up to date (version {current_version})");
        return Ok(());
    }

    info!("running migrations from version {current_version} to {DB_SCHEMA_VERSION}");

    for version in (current_version + 1)..=DB_SCHEMA_VERSION {
        run_migration(conn, version)?;
    }

    set_schema_version(conn, DB_SCHEMA_VERSION)?;
    info!("migrations complete, schema at version {DB_SCHEMA_VERSION}");
    Ok(())
}

/// Get the current schema version from the database.
fn get_schema_version(conn: &Connection) -> CbResult<i32> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
        .map_err(|e| CbError::Database(e.to_string()))?;

    if count == 0 {
        conn.execute("INSERT INTO schema_version (version) VALUES (0)", [])
            .map_err(|e| CbError::Database(e.to_string()))?;
        return Ok(0);
    }

    conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
        row.get(0)
    })
    .map_err(|e| CbError::Database(e.to_string()))
}

/// Set the schema version in the database.
fn set_schema_version(conn: &Connection, version: i32) -> CbResult<()> {
    conn.execute("UPDATE schema_version SET version = ?1", [version])
        .map_err(|e| CbError::Database(e.to_string()))?;
    Ok(())
}

/// Run a specific migration version.
fn run_migration(conn: &Connection, version: i32) -> CbResult<()> {
    info!("applying migration version {version}");

    match version {
        1 => migration_v1(conn),
        2 => migration_v2(conn),
        _ => {
            warn!("unknown migration version {version}, skipping");
            Ok(())
        }
    }
}

/// Migration v1: every business gets a price sheet and an agent configuration.
fn migration_v1(conn: &Connection) -> CbResult<()> {
    let settings = conn
        .execute(
            "INSERT INTO business_settings (business_id)
             SELECT b.id FROM businesses b
             WHERE NOT EXISTS (SELECT 1 FROM business_settings s WHERE s.business_id = b.id)",
            [],
        )
        .map_err(|e| CbError::Migration(e.to_string()))?;

    let agents = conn
        .execute(
            "INSERT INTO agent_configurations (business_id)
             SELECT b.id FROM businesses b
             WHERE NOT EXISTS (SELECT 1 FROM agent_configurations a WHERE a.business_id = b.id)",
            [],
        )
        .map_err(|e| CbError::Migration(e.to_string()))?;

    if settings + agents > 0 {
        info!("backfilled {settings} price sheets and {agents} agent configurations");
    }
    Ok(())
}

/// Migration v2: coupon codes are matched case-insensitively, store them trimmed and uppercased.
fn migration_v2(conn: &Connection) -> CbResult<()> {
    let changed = conn
        .execute(
            "UPDATE OR IGNORE coupons SET code = UPPER(TRIM(code)) WHERE code <> UPPER(TRIM(code))",
            [],
        )
        .map_err(|e| CbError::Migration(e.to_string()))?;
    if changed > 0 {
        info!("normalized {changed} coupon codes");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    #[test]
    fn test_migrations_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_tables(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, DB_SCHEMA_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_tables(&conn).unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
    }

    #[test]
    fn test_backfills_business_rows() {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_tables(&conn).unwrap();
        conn.execute(
            "INSERT INTO businesses (business_id, name, created_at) VALUES ('BUS-1001', 'Legacy', '2024-01-01')",
            [],
        )
        .unwrap();
        run_migrations(&conn).unwrap();

        let settings: i64 = conn
            .query_row("SELECT COUNT(*) FROM business_settings", [], |row| row.get(0))
            .unwrap();
        let agents: i64 = conn
            .query_row("SELECT COUNT(*) FROM agent_configurations", [], |row| row.get(0))
            .unwrap();
        assert_eq!((settings, agents), (1, 1));
    }

    #[test]
    fn test_coupon_codes_uppercased() {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_tables(&conn).unwrap();
        conn.execute(
            "INSERT INTO businesses (business_id, name, created_at) VALUES ('BUS-1002', 'Codes', '2024-01-01')",
            [],
        )
        .unwrap();
        conn.execute("INSERT INTO coupons (business_id, code) VALUES (1, ' spring10 ')", [])
            .unwrap();
        run_migrations(&conn).unwrap();

        let code: String = conn
            .query_row("SELECT code FROM coupons", [], |row| row.get(0))
            .unwrap();
        assert_eq!(code, "SPRING10");
    }
}
