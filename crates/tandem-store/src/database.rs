//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees
//! that migrations are run before any other operation. All typed CRUD
//! helpers live in the sibling modules as `impl Database` blocks.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the application database at [`default_db_path`],
    /// creating the data directory if needed.
    pub fn new() -> Result<Self> {
        let db_path = default_db_path()?;
        if let Some(dir) = db_path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path.
    ///
    /// This is what the server uses (the path comes from configuration) and
    /// what tests use with a temporary directory.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open a fresh in-memory database. Used by tests and ephemeral
    /// tooling; data does not survive the handle.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Build a store over an already-open connection, running migrations
    /// first.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        // Recommended SQLite settings.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        // Run schema migrations.
        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    ///
    /// Callers should prefer the typed helpers, but direct access is
    /// occasionally needed for ad-hoc queries.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }
}

/// Platform-appropriate location of the application database,
/// e.g. `~/.local/share/tandem/tandem.db` on Linux.
pub fn default_db_path() -> Result<PathBuf> {
    let project_dirs =
        ProjectDirs::from("com", "tandem", "tandem").ok_or(StoreError::NoDataDir)?;
    Ok(project_dirs.data_dir().join("tandem.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        let db = Database::open_at(&path).expect("should open");
        assert!(db.path().is_some());
    }

    #[test]
    fn open_in_memory_migrates() {
        Database::open_in_memory().expect("should migrate");
    }

    #[test]
    fn default_path_names_the_db_file() {
        let path = default_db_path().expect("should resolve a data dir");
        assert!(path.ends_with("tandem.db"));
    }
}
