//! Room (origin) queries.

use rusqlite::params;

use super::{Database, DatabaseError};
use crate::models::Origin;

/// Lists active rooms ordered by id. Rooms without a sketch are included;
/// the selector decides to skip them.
pub fn list_active(db: &Database) -> Result<Vec<Origin>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, name, active, sketch_id FROM rooms WHERE active = 1 ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Origin {
                id: row.get(0)?,
                name: row.get(1)?,
                active: row.get(2)?,
                collection_id: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

/// Looks up one room by id regardless of its active flag.
pub fn find(db: &Database, id: i64) -> Result<Option<Origin>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT id, name, active, sketch_id FROM rooms WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], |row| {
            Ok(Origin {
                id: row.get(0)?,
                name: row.get(1)?,
                active: row.get(2)?,
                collection_id: row.get(3)?,
            })
        })?;
        Ok(rows.next().transpose()?)
    })
}
