//! Errors raised by the SQLite layer.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database's parent directory could not be created.
    #[error("cannot prepare database directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("migration v{version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// A timestamp column held text that is not RFC 3339.
    #[error("unparseable timestamp {value:?} in column {column}")]
    InvalidTimestamp { column: &'static str, value: String },

    #[error("database mutex poisoned by a panicking holder")]
    LockPoisoned,
}
