//! SQLite-backed store for projects, stakeholders, stories, storylines and
//! their follow-up records.
//!
//! The database lives at `~/.storydesk/storydesk.db` unless the config
//! supplies `dbPath`. Every query is parameterized; multi-row writes go
//! through [`StoryDb::with_transaction`].

use std::path::{Path, PathBuf};

use chrono::Local;
use rusqlite::{params, Connection};

pub mod follow_ups;
pub mod projects;
pub mod stakeholders;
pub mod stories;
pub mod types;
pub use types::*;

pub struct StoryDb {
    conn: Connection,
}

impl StoryDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Self) -> Result<T, DbError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(val) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(val)
            }
            Err(e) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    log::warn!("Rollback failed after error '{}': {}", e, rollback);
                }
                Err(e)
            }
        }
    }

    /// Open (or create) the database at the default location, or at
    /// `override_path` when the config names one, and apply the schema.
    pub fn open(override_path: Option<&Path>) -> Result<Self, DbError> {
        let path = match override_path {
            Some(p) => p.to_path_buf(),
            None => Self::db_path()?,
        };
        Self::open_at(path)
    }

    /// Open a database at an explicit path.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        log::debug!("Opened database at {}", path.display());
        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.storydesk/storydesk.db`.
    pub fn db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".storydesk").join("storydesk.db"))
    }

    /// Replace the ordered stakeholder references held in a junction table.
    ///
    /// `table` and `owner_col` are always compile-time constants from the
    /// entity modules, never caller input.
    pub(crate) fn replace_ordered_ids(
        &self,
        table: &'static str,
        owner_col: &'static str,
        owner_id: &str,
        ids: &[String],
    ) -> Result<(), DbError> {
        self.conn.execute(
            &format!("DELETE FROM {table} WHERE {owner_col} = ?1"),
            params![owner_id],
        )?;
        let insert = format!(
            "INSERT OR IGNORE INTO {table} ({owner_col}, stakeholder_id, position)
             VALUES (?1, ?2, ?3)"
        );
        let mut stmt = self.conn.prepare(&insert)?;
        for (position, id) in ids.iter().enumerate() {
            stmt.execute(params![owner_id, id, position as i64])?;
        }
        Ok(())
    }

    /// Load the ordered stakeholder references held in a junction table.
    pub(crate) fn load_ordered_ids(
        &self,
        table: &'static str,
        owner_col: &'static str,
        owner_id: &str,
    ) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT stakeholder_id FROM {table} WHERE {owner_col} = ?1 ORDER BY position"
        ))?;
        let rows = stmt.query_map(params![owner_id], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

/// Current time as RFC 3339 with the local offset, the form stored in every
/// `*_at` column. The date prefix is the local day.
pub(crate) fn now_rfc3339() -> String {
    Local::now().to_rfc3339()
}


#[cfg(test)]
mod tests {
    use super::test_utils::test_db;
    use super::*;

    #[test]
    fn test_open_creates_tables() {
        let db = test_db();
        for table in [
            "projects",
            "subprojects",
            "stakeholders",
            "stories",
            "storylines",
            "follow_up_records",
        ] {
            let count: i32 = db
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .unwrap_or_else(|e| panic!("{table} should exist: {e}"));
            assert_eq!(count, 0);
        }
    }

    #[test]
    fn test_open_at_creates_parent_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("deeper").join("db.sqlite");
        let _db = StoryDb::open_at(path.clone()).expect("open nested path");
        assert!(path.exists());
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = test_db();
        let result: Result<(), DbError> = db.with_transaction(|tx| {
            tx.conn.execute(
                "INSERT INTO projects (id, name, created_at, updated_at)
                 VALUES ('p1', 'Apollo', '2024-01-01', '2024-01-01')",
                [],
            )?;
            Err(DbError::Migration("forced".to_string()))
        });
        assert!(result.is_err());

        let count: i32 = db
            .conn
            .query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 0, "insert should have been rolled back");
    }

    #[test]
    fn test_ordered_ids_round_trip_keeps_position() {
        let db = test_db();
        db.conn
            .execute(
                "INSERT INTO follow_up_records
                    (id, parent_kind, parent_id, content, event_date, created_at)
                 VALUES ('r1', 'story', 's1', 'call', '2024-01-01', '2024-01-01')",
                [],
            )
            .expect("seed record");
        let ids = vec!["9".to_string(), "3".to_string(), "7".to_string()];
        db.replace_ordered_ids("follow_up_contacts", "record_id", "r1", &ids)
            .expect("replace");
        let loaded = db
            .load_ordered_ids("follow_up_contacts", "record_id", "r1")
            .expect("load");
        assert_eq!(loaded, ids);

        db.replace_ordered_ids("follow_up_contacts", "record_id", "r1", &["3".to_string()])
            .expect("replace again");
        let loaded = db
            .load_ordered_ids("follow_up_contacts", "record_id", "r1")
            .expect("load");
        assert_eq!(loaded, vec!["3".to_string()]);
    }
}
