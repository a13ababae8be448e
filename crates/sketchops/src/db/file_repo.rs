//! Uploaded evidence file queries and processed-state updates.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{Database, DatabaseError};
use crate::models::{format_timestamp, Outcome, UploadedFile, NO_RELEVANT_CONTENT};

/// Processed-state projection of a file row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStateRow {
    pub processed: bool,
    pub processing_error: Option<String>,
    pub processing_note: Option<String>,
    pub processed_at: Option<String>,
}

/// Unprocessed, error-free files belonging to active rooms, oldest first.
///
/// `created_at` only orders the result. It is compared through
/// `julianday()` so any layout SQLite understands sorts correctly; rows it
/// cannot read go last instead of failing the query.
pub fn list_unprocessed(db: &Database) -> Result<Vec<UploadedFile>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT f.id, f.room_id, f.sketch_id, f.filename, f.file_path, f.file_type,
                    f.uploader_username, f.uploader_team
             FROM uploaded_files f
             JOIN rooms r ON f.room_id = r.id
             WHERE r.active = 1
               AND f.processed = 0
               AND f.processing_error IS NULL
             ORDER BY julianday(f.created_at) IS NULL, julianday(f.created_at), f.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(UploadedFile {
                id: row.get(0)?,
                origin_id: row.get(1)?,
                collection_id: row.get(2)?,
                filename: row.get(3)?,
                stored_path: row.get(4)?,
                content_type: row.get(5)?,
                uploader_username: row.get(6)?,
                uploader_team: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    })
}

/// Marks a file processed with the given outcome.
///
/// The update is conditional on `processed = 0`; returns `false` when the
/// file had already been marked (by this or another poller).
pub fn mark_processed(
    db: &Database,
    file_id: i64,
    outcome: &Outcome,
) -> Result<bool, DatabaseError> {
    let note = match outcome {
        Outcome::NoRelevantContent => Some(NO_RELEVANT_CONTENT),
        _ => None,
    };
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE uploaded_files
             SET processed = 1,
                 processing_error = ?1,
                 processing_note = ?2,
                 processed_at = ?3
             WHERE id = ?4 AND processed = 0",
            params![
                outcome.error(),
                note,
                format_timestamp(&Utc::now()),
                file_id
            ],
        )?;
        Ok(changed == 1)
    })
}

pub fn find_state(db: &Database, file_id: i64) -> Result<Option<FileStateRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT processed, processing_error, processing_note, processed_at
                 FROM uploaded_files WHERE id = ?1",
                params![file_id],
                |row| {
                    Ok(FileStateRow {
                        processed: row.get(0)?,
                        processing_error: row.get(1)?,
                        processing_note: row.get(2)?,
                        processed_at: row.get(3)?,
                    })
                },
            )
            .optional()?)
    })
}
