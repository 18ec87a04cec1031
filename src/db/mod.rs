//! SQLite-backed escalation log.
//!
//! The database lives at `~/.escalateai/escalations.db` unless `databasePath`
//! (or `ESCALATEAI_DB`) points elsewhere. Rows are append-only: subject, body,
//! urgency and entities never change after insert, and `status` only moves
//! from Pending to Resolved.

use std::path::{Path, PathBuf};

use rusqlite::Connection;

pub mod escalations;
pub mod types;
pub use types::*;

pub struct EscalationDb {
    conn: Connection,
}

impl EscalationDb {
    /// Raw connection, for tests and one-off queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside `BEGIN IMMEDIATE`; commit if it returns Ok, roll back otherwise.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Self) -> Result<T, StoreError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(val) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Open (or create) the database at the default location and apply the schema.
    pub fn open() -> Result<Self, StoreError> {
        let path = Self::default_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path.
    pub fn open_at(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(StoreError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;

        // WAL keeps readers (`list`, the re-check) off the writer's lock
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        crate::migrations::run_migrations(&conn)?;

        log::debug!("Opened escalation database at {}", path.display());
        Ok(Self { conn })
    }

    /// Open a throwaway in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        crate::migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.escalateai/escalations.db`.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let home = dirs::home_dir().ok_or(StoreError::HomeDirNotFound)?;
        Ok(home.join(".escalateai").join("escalations.db"))
    }

    /// Open the configured path, or the default one when none is set.
    pub fn open_configured(path: Option<&Path>) -> Result<Self, StoreError> {
        match path {
            Some(p) => Self::open_at(p.to_path_buf()),
            None => Self::open(),
        }
    }
}

// =============================================================================
// Shared test utilities
// =============================================================================
