//! Chat message queries and the `processed_messages` dedup table.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{cursor_repo, Database, DatabaseError};
use crate::models::{format_timestamp, parse_timestamp, Message, Outcome, SourceKind};

/// A processed-message record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedMessageRow {
    pub message_id: i64,
    pub room_id: i64,
    pub outcome: String,
    pub processing_error: Option<String>,
    pub processed_at: String,
}

/// A message as listed for selection.
///
/// `instant` is `created_at` in whole milliseconds as SQLite's date
/// functions read it; cursor comparisons in SQL happen at that resolution,
/// so batches must never split messages sharing one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedMessage {
    pub message: Message,
    pub instant: i64,
}

/// A message row whose `created_at` could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableMessage {
    pub id: i64,
    pub created_at: String,
}

#[derive(Debug, Default)]
pub struct MessagePage {
    pub messages: Vec<ListedMessage>,
    pub unreadable: Vec<UnreadableMessage>,
}

const PENDING_SELECT: &str = "
    SELECT m.id, m.room_id, m.content, m.created_at, u.username, m.force_process,
           CAST(round(julianday(m.created_at) * 86400000.0) AS INTEGER)
    FROM messages m
    JOIN users u ON m.user_id = u.id
    WHERE m.room_id = ?1
      AND m.id NOT IN (SELECT message_id FROM processed_messages)";

/// Unrecorded messages of `room_id` created strictly after `after`, oldest
/// first, at most `limit` of them.
///
/// Rows whose `created_at` is not a date SQLite understands are listed
/// after every readable row, as `unreadable`.
pub fn list_after(
    db: &Database,
    room_id: i64,
    after: &DateTime<Utc>,
    limit: usize,
) -> Result<MessagePage, DatabaseError> {
    let sql = format!(
        "{PENDING_SELECT}
           AND (julianday(m.created_at) > julianday(?2) OR julianday(m.created_at) IS NULL)
         ORDER BY julianday(m.created_at) IS NULL, julianday(m.created_at), m.id
         LIMIT ?3"
    );
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    query_page(db, &sql, params![room_id, format_timestamp(after), limit])
}

/// Every unrecorded message of `room_id` after `after` and up to and
/// including `through`, with no limit.
pub fn list_through(
    db: &Database,
    room_id: i64,
    after: &DateTime<Utc>,
    through: &DateTime<Utc>,
) -> Result<MessagePage, DatabaseError> {
    let sql = format!(
        "{PENDING_SELECT}
           AND julianday(m.created_at) > julianday(?2)
           AND julianday(m.created_at) <= julianday(?3)
         ORDER BY julianday(m.created_at), m.id"
    );
    query_page(
        db,
        &sql,
        params![room_id, format_timestamp(after), format_timestamp(through)],
    )
}

fn query_page(
    db: &Database,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<MessagePage, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut page = MessagePage::default();

        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let raw: String = row.get(3)?;
            let instant: Option<i64> = row.get(6)?;
            let (Some(created_at), Some(instant)) = (parse_timestamp(&raw), instant) else {
                page.unreadable.push(UnreadableMessage {
                    id,
                    created_at: raw,
                });
                continue;
            };
            page.messages.push(ListedMessage {
                message: Message {
                    id,
                    origin_id: row.get(1)?,
                    content: row.get(2)?,
                    created_at,
                    author: row.get(4)?,
                    force_process: row.get(5)?,
                },
                instant,
            });
        }
        Ok(page)
    })
}

/// Records the outcome of a message batch and, when `advance_to` is set,
/// moves the room's chat cursor in the same transaction.
///
/// Existing records are left untouched, so a message is marked at most
/// once. Returns the number of newly recorded messages.
pub fn record_batch(
    db: &Database,
    room_id: i64,
    message_ids: &[i64],
    outcome: &Outcome,
    advance_to: Option<&DateTime<Utc>>,
) -> Result<usize, DatabaseError> {
    let now = format_timestamp(&Utc::now());
    db.with_tx(|tx| {
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO processed_messages
                    (message_id, room_id, outcome, processing_error, processed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for id in message_ids {
                inserted += stmt.execute(params![
                    id,
                    room_id,
                    outcome.as_str(),
                    outcome.error(),
                    now
                ])?;
            }
        }
        if let Some(to) = advance_to {
            cursor_repo::advance_on(tx, room_id, SourceKind::Chat, to)?;
        }
        Ok(inserted)
    })
}

pub fn find_record(
    db: &Database,
    message_id: i64,
) -> Result<Option<ProcessedMessageRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT message_id, room_id, outcome, processing_error, processed_at
                 FROM processed_messages WHERE message_id = ?1",
                params![message_id],
                |row| {
                    Ok(ProcessedMessageRow {
                        message_id: row.get(0)?,
                        room_id: row.get(1)?,
                        outcome: row.get(2)?,
                        processing_error: row.get(3)?,
                        processed_at: row.get(4)?,
                    })
                },
            )
            .optional()?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support;
    use chrono::TimeZone;

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        test_support::room(&db, 7, "room-7", Some(42));
        test_support::user(&db, 1, "alice");
        db
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 16, 8, minute, 0).unwrap()
    }

    fn ids(page: &MessagePage) -> Vec<i64> {
        page.messages.iter().map(|m| m.message.id).collect()
    }

    fn insert_raw(db: &Database, id: i64, created_at: &str) {
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, room_id, user_id, content, created_at) VALUES (?1, 7, 1, 'raw', ?2)",
                params![id, created_at],
            )?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_list_after_is_strict_and_ordered() {
        let db = seeded();
        test_support::message(&db, 2, 7, 1, at(5), "second");
        test_support::message(&db, 1, 7, 1, at(0), "first");
        test_support::message(&db, 3, 7, 1, at(10), "third");

        let all = list_after(&db, 7, &DateTime::<Utc>::UNIX_EPOCH, 10).unwrap();
        assert_eq!(ids(&all), vec![1, 2, 3]);
        assert_eq!(all.messages[0].message.author, "alice");
        assert!(all.unreadable.is_empty());

        let later = list_after(&db, 7, &at(5), 10).unwrap();
        assert_eq!(ids(&later), vec![3]);

        let capped = list_after(&db, 7, &DateTime::<Utc>::UNIX_EPOCH, 2).unwrap();
        assert_eq!(ids(&capped), vec![1, 2]);
    }

    #[test]
    fn test_list_after_skips_recorded_messages() {
        let db = seeded();
        test_support::message(&db, 1, 7, 1, at(0), "failed earlier");
        test_support::message(&db, 2, 7, 1, at(1), "fresh");
        record_batch(&db, 7, &[1], &Outcome::Failed("provider error: x".into()), None).unwrap();

        let page = list_after(&db, 7, &DateTime::<Utc>::UNIX_EPOCH, 1).unwrap();
        assert_eq!(ids(&page), vec![2]);
    }

    #[test]
    fn test_list_after_reads_sqlite_timestamps() {
        let db = seeded();
        test_support::message(&db, 1, 7, 1, at(0), "canonical");
        insert_raw(&db, 2, "2024-10-16 08:03:00");
        insert_raw(&db, 3, "not a date");

        let page = list_after(&db, 7, &at(1), 10).unwrap();
        assert_eq!(ids(&page), vec![2]);
        assert_eq!(page.messages[0].message.created_at, at(3));
        assert_eq!(
            page.unreadable,
            vec![UnreadableMessage {
                id: 3,
                created_at: "not a date".into()
            }]
        );
    }

    #[test]
    fn test_instant_is_shared_within_a_millisecond() {
        let db = seeded();
        test_support::message(&db, 1, 7, 1, at(0), "a");
        insert_raw(&db, 2, "2024-10-16 08:00:00.000");
        test_support::message(&db, 3, 7, 1, at(0) + chrono::Duration::milliseconds(1), "b");

        let page = list_after(&db, 7, &DateTime::<Utc>::UNIX_EPOCH, 10).unwrap();
        let instants: Vec<i64> = page.messages.iter().map(|m| m.instant).collect();
        assert_eq!(instants[0], instants[1]);
        assert_eq!(instants[2], instants[0] + 1);
    }

    #[test]
    fn test_list_through_is_inclusive() {
        let db = seeded();
        for (id, minute) in [(1, 0), (2, 1), (3, 1), (4, 2)] {
            test_support::message(&db, id, 7, 1, at(minute), "m");
        }
        let page = list_through(&db, 7, &at(0), &at(1)).unwrap();
        assert_eq!(ids(&page), vec![2, 3]);
    }

    #[test]
    fn test_record_batch_marks_once() {
        let db = seeded();
        test_support::message(&db, 1, 7, 1, at(0), "a");

        let first = record_batch(&db, 7, &[1], &Outcome::Imported, None).unwrap();
        let second = record_batch(
            &db,
            7,
            &[1],
            &Outcome::Failed("provider error: boom".into()),
            None,
        )
        .unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);

        let row = find_record(&db, 1).unwrap().unwrap();
        assert_eq!(row.outcome, "imported");
        assert!(row.processing_error.is_none());
    }

    #[test]
    fn test_record_batch_advances_cursor_atomically() {
        let db = seeded();
        record_batch(&db, 7, &[1, 2], &Outcome::NoRelevantContent, Some(&at(3))).unwrap();
        assert_eq!(cursor_repo::get(&db, 7, SourceKind::Chat).unwrap(), at(3));
        assert!(find_record(&db, 1).unwrap().is_some());
        assert!(find_record(&db, 2).unwrap().is_some());
        assert!(find_record(&db, 3).unwrap().is_none());
    }
}
