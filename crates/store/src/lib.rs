mod schema;
mod queries;

use std::sync::Mutex;
use scmbridge_types::Result;

/// SQLite-backed implementation of the scmbridge collaborator traits
/// ([`scmbridge_types::CommitStore`], [`scmbridge_types::BranchPolicy`],
/// [`scmbridge_types::IssueLookup`], [`scmbridge_types::AuditLog`]).
pub struct SqliteStore {
    pub(crate) conn: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    /// Open a persistent on-disk database at `path`.
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let conn = rusqlite::Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    /// Open an in-memory database (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    /// Run all pragmas and schema DDL.
    fn init(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(schema::SCHEMA_SQL)?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
