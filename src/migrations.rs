//! Schema migrations.
//!
//! `MIGRATIONS[n]` upgrades a database from schema version `n` to `n + 1`.
//! The version lives in SQLite's `user_version` header field, so a fresh
//! file reads as version 0. Each step commits together with its version
//! bump.

use rusqlite::{Connection, DatabaseName};

const MIGRATIONS: &[&str] = &[include_str!("migrations/001_baseline.sql")];

fn schema_version(conn: &Connection) -> Result<i64, String> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| format!("Failed to read schema version: {}", e))
}

/// Copy a populated file database to `<path>.v<version>.bak` before it is
/// upgraded. Fresh and in-memory databases have nothing worth keeping.
fn snapshot_before_upgrade(conn: &Connection, version: i64) -> Result<(), String> {
    let path = match conn.path() {
        Some(path) if !path.is_empty() && version > 0 => path.to_string(),
        _ => return Ok(()),
    };
    let snapshot = format!("{}.v{}.bak", path, version);
    conn.backup(DatabaseName::Main, &snapshot, None)
        .map_err(|e| format!("Failed to snapshot database before upgrade: {}", e))?;
    log::info!("Snapshot of schema v{} written to {}", version, snapshot);
    Ok(())
}

fn migrate(conn: &Connection, steps: &[&str]) -> Result<usize, String> {
    let current = schema_version(conn)?;
    let latest = steps.len() as i64;
    if current > latest {
        return Err(format!(
            "Database schema v{} is newer than this build of Storydesk understands (v{}). \
             Update Storydesk before opening this database.",
            current, latest
        ));
    }
    if current == latest {
        return Ok(0);
    }

    snapshot_before_upgrade(conn, current)?;

    for (index, sql) in steps.iter().enumerate().skip(current as usize) {
        let version = index as i64 + 1;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| format!("Failed to start migration v{}: {}", version, e))?;
        tx.execute_batch(sql)
            .map_err(|e| format!("Migration v{} failed: {}", version, e))?;
        tx.pragma_update(None, "user_version", version)
            .map_err(|e| format!("Failed to record migration v{}: {}", version, e))?;
        tx.commit()
            .map_err(|e| format!("Failed to commit migration v{}: {}", version, e))?;
        log::info!("Schema upgraded to v{}", version);
    }

    Ok((latest - current) as usize)
}

/// Bring the schema up to date. Returns the number of steps applied.
pub fn run_migrations(conn: &Connection) -> Result<usize, String> {
    migrate(conn, MIGRATIONS)
}
