//! Per-room high-water-mark cursors.
//!
//! A cursor only ever moves forward: `advance` is a single upsert that keeps
//! `MAX(stored, new)`, so two overlapping writers can never move it back.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{Database, DatabaseError};
use crate::models::{format_timestamp, parse_timestamp, SourceKind};

/// Returns the cursor for `(room, source)`, or the Unix epoch when none
/// has been recorded yet.
pub fn get(db: &Database, room_id: i64, source: SourceKind) -> Result<DateTime<Utc>, DatabaseError> {
    db.with_conn(|conn| get_on(conn, room_id, source))
}

pub(crate) fn get_on(
    conn: &Connection,
    room_id: i64,
    source: SourceKind,
) -> Result<DateTime<Utc>, DatabaseError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT last_processed_at FROM room_cursors WHERE room_id = ?1 AND source = ?2",
            params![room_id, source.as_str()],
            |r| r.get(0),
        )
        .optional()?;

    match raw {
        None => Ok(DateTime::<Utc>::UNIX_EPOCH),
        Some(value) => parse_timestamp(&value).ok_or(DatabaseError::InvalidTimestamp {
            column: "room_cursors.last_processed_at",
            value,
        }),
    }
}

/// Moves the cursor to `to` unless it is already at or beyond it.
pub fn advance(
    db: &Database,
    room_id: i64,
    source: SourceKind,
    to: &DateTime<Utc>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| advance_on(conn, room_id, source, to))
}

pub(crate) fn advance_on(
    conn: &Connection,
    room_id: i64,
    source: SourceKind,
    to: &DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let now = format_timestamp(&Utc::now());
    conn.execute(
        "INSERT INTO room_cursors (room_id, source, last_processed_at, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(room_id, source) DO UPDATE SET
            last_processed_at = MAX(room_cursors.last_processed_at, excluded.last_processed_at),
            updated_at = excluded.updated_at",
        params![room_id, source.as_str(), format_timestamp(to), now],
    )?;
    Ok(())
}
