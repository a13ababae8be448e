//! SQLite access to the platform tables and the pollers' bookkeeping.
//!
//! All access is serialized through a `Mutex<Connection>`; each logical
//! operation takes the lock and releases it, so no transaction ever spans
//! a whole tick.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, Transaction};

pub mod cursor_repo;
pub mod error;
pub mod file_repo;
pub mod message_repo;
pub mod migrations;
pub mod room_repo;
pub mod settings_repo;

pub use error::DatabaseError;

/// Shared handle to one SQLite connection. Clones share the connection.
///
/// File databases run in WAL mode with a busy timeout so the chat and
/// evidence pollers can share one file from separate processes.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens the database file at `path`, creating it and its directory if
    /// needed, and brings the schema up to date.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| DatabaseError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let db = Self::prepare(
            Connection::open(path)?,
            "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;",
        )?;
        log::info!("Using database {}", path.display());
        Ok(db)
    }

    /// Private in-memory database with the full schema.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::prepare(Connection::open_in_memory()?, "PRAGMA foreign_keys=ON;")
    }

    fn prepare(conn: Connection, pragmas: &str) -> Result<Self, DatabaseError> {
        conn.execute_batch(pragmas)?;
        migrations::run_all(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` with the connection locked.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    /// Runs `f` inside a single transaction. Commits on `Ok`, rolls back
    /// when `f` fails or the transaction is dropped.
    pub fn with_tx<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        let tx = conn.unchecked_transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}
