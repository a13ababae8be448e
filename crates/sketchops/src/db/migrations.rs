//! Idempotent schema bootstrap.
//!
//! Applied versions are tracked in a `_migrations` table. The platform
//! tables are normally owned by the chat service; creating them here with
//! `IF NOT EXISTS` keeps standalone deployments and tests self-contained.

use std::collections::HashSet;

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
    /// Column whose presence means the change is already in place; the
    /// platform may add it before we do.
    skip_if_column: Option<(&'static str, &'static str)>,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_platform_tables",
        sql: include_str!("sql/001_create_platform_tables.sql"),
        skip_if_column: None,
    },
    Migration {
        version: 2,
        name: "create_bookkeeping_tables",
        sql: include_str!("sql/002_create_bookkeeping.sql"),
        skip_if_column: None,
    },
    Migration {
        version: 3,
        name: "add_processing_note_to_uploaded_files",
        sql: include_str!("sql/003_add_processing_note.sql"),
        skip_if_column: Some(("uploaded_files", "processing_note")),
    },
];

/// Applies every migration not yet recorded in `_migrations`, each in its
/// own transaction together with its bookkeeping row.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );",
    )?;

    let applied = applied_versions(conn)?;
    let pending = MIGRATIONS.iter().filter(|m| !applied.contains(&m.version));

    for migration in pending {
        let tx = conn.unchecked_transaction()?;

        let present = match migration.skip_if_column {
            Some((table, column)) => column_exists(&tx, table, column)?,
            None => false,
        };
        if present {
            log::info!(
                "Migration v{} ({}) already in place, recording only",
                migration.version,
                migration.name
            );
        } else {
            log::info!("Applying migration v{} ({})", migration.version, migration.name);
            tx.execute_batch(migration.sql)
                .map_err(|e| DatabaseError::Migration {
                    version: migration.version,
                    reason: e.to_string(),
                })?;
        }

        tx.execute(
            "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.name],
        )?;
        tx.commit()?;
    }

    Ok(())
}

fn applied_versions(conn: &Connection) -> Result<HashSet<u32>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT version FROM _migrations")?;
    let versions = stmt
        .query_map([], |row| row.get::<_, u32>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(versions)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        rusqlite::params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
