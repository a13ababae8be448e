//! Finds the work each poller still has to do.
//!
//! Chat messages are selected by the per-room cursor, skipping any already
//! in the processed-message table; uploaded files by their processed
//! flag. Both return one [`PendingWork`] per room, keyed by room id so
//! batches run in a stable order.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::db::message_repo::{ListedMessage, UnreadableMessage};
use crate::db::{cursor_repo, file_repo, message_repo, room_repo, Database, DatabaseError};
use crate::models::{Message, Origin, Outcome, SourceKind, UploadedFile};

/// Units of one origin that are ready for the pipeline.
#[derive(Debug, Clone)]
pub struct PendingWork<U> {
    pub origin: Origin,
    pub collection_id: i64,
    pub units: Vec<U>,
}

fn with_collection(origin: &Origin, source: SourceKind) -> Option<i64> {
    if origin.collection_id.is_none() {
        warn!(
            "Room '{}' (ID: {}) has no sketch; skipping for {}",
            origin.name, origin.id, source
        );
    }
    origin.collection_id
}

/// Selects unprocessed messages per active room, oldest first.
///
/// At most `max_batch` messages are returned per room, unless more than
/// that share the oldest pending instant; the remainder is picked up on the
/// next tick once the cursor has moved. Messages whose `created_at` cannot
/// be read are recorded as failed here so they never block the room.
pub fn select_messages(
    db: &Database,
    max_batch: usize,
) -> Result<BTreeMap<i64, PendingWork<Message>>, DatabaseError> {
    let max_batch = max_batch.max(1);
    let mut pending = BTreeMap::new();

    for origin in room_repo::list_active(db)? {
        let Some(collection_id) = with_collection(&origin, SourceKind::Chat) else {
            continue;
        };

        let cursor = cursor_repo::get(db, origin.id, SourceKind::Chat)?;
        let page = message_repo::list_after(db, origin.id, &cursor, max_batch + 1)?;
        record_unreadable(db, origin.id, &page.unreadable)?;

        let units = cap_batch(db, origin.id, &cursor, page.messages, max_batch)?;
        if units.is_empty() {
            continue;
        }

        pending.insert(
            origin.id,
            PendingWork {
                origin,
                collection_id,
                units,
            },
        );
    }

    Ok(pending)
}

/// Cuts `listed` to at most `max_batch` messages without splitting an
/// instant. The cursor moves to the batch's last instant, and anything left
/// behind at that instant would never be listed again.
fn cap_batch(
    db: &Database,
    room_id: i64,
    cursor: &DateTime<Utc>,
    mut listed: Vec<ListedMessage>,
    max_batch: usize,
) -> Result<Vec<Message>, DatabaseError> {
    if listed.len() > max_batch {
        let cut = listed[max_batch].instant;
        let keep = listed.iter().take_while(|m| m.instant < cut).count();
        if keep > 0 {
            debug!(
                "Room {} has more than {} pending messages; taking the oldest {}",
                room_id, max_batch, keep
            );
            listed.truncate(keep);
        } else {
            // The oldest instant alone fills the batch: take all of it.
            let through = listed[max_batch].message.created_at;
            listed = message_repo::list_through(db, room_id, cursor, &through)?.messages;
            debug!(
                "Room {} has {} messages at {}; taking them as one batch",
                room_id,
                listed.len(),
                through
            );
        }
    }
    Ok(listed.into_iter().map(|m| m.message).collect())
}

fn record_unreadable(
    db: &Database,
    room_id: i64,
    rows: &[UnreadableMessage],
) -> Result<(), DatabaseError> {
    for row in rows {
        warn!(
            "Message {} in room {} has unreadable created_at {:?}; recording it as failed",
            row.id, room_id, row.created_at
        );
        let outcome = Outcome::Failed(format!("unreadable created_at {:?}", row.created_at));
        message_repo::record_batch(db, room_id, &[row.id], &outcome, None)?;
    }
    Ok(())
}

/// Selects unprocessed uploaded files per active room, oldest first.
pub fn select_files(
    db: &Database,
) -> Result<BTreeMap<i64, PendingWork<UploadedFile>>, DatabaseError> {
    let origins: BTreeMap<i64, Origin> = room_repo::list_active(db)?
        .into_iter()
        .map(|o| (o.id, o))
        .collect();

    let mut pending: BTreeMap<i64, PendingWork<UploadedFile>> = BTreeMap::new();
    let mut skipped = HashSet::new();

    for file in file_repo::list_unprocessed(db)? {
        let Some(origin) = origins.get(&file.origin_id) else {
            continue;
        };
        if let Some(work) = pending.get_mut(&origin.id) {
            work.units.push(file);
            continue;
        }
        if skipped.contains(&origin.id) {
            continue;
        }
        match with_collection(origin, SourceKind::Evidence) {
            Some(collection_id) => {
                pending.insert(
                    origin.id,
                    PendingWork {
                        origin: origin.clone(),
                        collection_id,
                        units: vec![file],
                    },
                );
            }
            None => {
                skipped.insert(origin.id);
            }
        }
    }

    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support;
    use chrono::TimeZone;

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        test_support::room(&db, 7, "room-7", Some(42));
        test_support::room(&db, 8, "no-sketch", None);
        test_support::user(&db, 1, "alice");
        db
    }

    #[test]
    fn test_select_messages_groups_by_room() {
        let db = seeded();
        let t1 = Utc.with_ymd_and_hms(2024, 10, 16, 9, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 10, 16, 9, 5, 0).unwrap();
        test_support::message(&db, 2, 7, 1, t2, "second");
        test_support::message(&db, 1, 7, 1, t1, "first");
        test_support::message(&db, 3, 8, 1, t1, "ignored");

        let pending = select_messages(&db, 200).unwrap();
        assert_eq!(pending.len(), 1);
        let work = &pending[&7];
        assert_eq!(work.collection_id, 42);
        let ids: Vec<i64> = work.units.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_processed_messages_are_not_reselected() {
        let db = seeded();
        let t1 = Utc.with_ymd_and_hms(2024, 10, 16, 9, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 10, 16, 9, 5, 0).unwrap();
        test_support::message(&db, 1, 7, 1, t1, "first");
        test_support::message(&db, 2, 7, 1, t2, "second");

        // Failed batches are recorded without moving the cursor.
        message_repo::record_batch(&db, 7, &[1], &Outcome::Failed("x".into()), None).unwrap();

        let pending = select_messages(&db, 200).unwrap();
        let ids: Vec<i64> = pending[&7].units.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2]);

        message_repo::record_batch(&db, 7, &[2], &Outcome::Imported, Some(&t2)).unwrap();
        assert!(select_messages(&db, 200).unwrap().is_empty());
    }

    #[test]
    fn test_batch_cap() {
        let db = seeded();
        let base = Utc.with_ymd_and_hms(2024, 10, 16, 9, 0, 0).unwrap();
        for i in 0..5 {
            test_support::message(&db, i + 1, 7, 1, base + chrono::Duration::seconds(i), "m");
        }
        let pending = select_messages(&db, 3).unwrap();
        let ids: Vec<i64> = pending[&7].units.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_batch_cap_never_splits_an_instant() {
        let db = seeded();
        let t = Utc.with_ymd_and_hms(2024, 10, 16, 9, 0, 0).unwrap();
        let t2 = t + chrono::Duration::seconds(1);
        test_support::message(&db, 1, 7, 1, t, "a");
        test_support::message(&db, 2, 7, 1, t2, "b");
        test_support::message(&db, 3, 7, 1, t2, "c");

        let pending = select_messages(&db, 2).unwrap();
        let ids: Vec<i64> = pending[&7].units.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1]);

        message_repo::record_batch(&db, 7, &ids, &Outcome::Imported, Some(&t)).unwrap();
        let pending = select_messages(&db, 2).unwrap();
        let ids: Vec<i64> = pending[&7].units.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_instant_larger_than_cap_is_taken_whole() {
        let db = seeded();
        let t = Utc.with_ymd_and_hms(2024, 10, 16, 9, 0, 0).unwrap();
        for id in 1..=3 {
            test_support::message(&db, id, 7, 1, t, "burst");
        }
        test_support::message(&db, 4, 7, 1, t + chrono::Duration::seconds(1), "later");

        let pending = select_messages(&db, 2).unwrap();
        let ids: Vec<i64> = pending[&7].units.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        message_repo::record_batch(&db, 7, &ids, &Outcome::Imported, Some(&t)).unwrap();
        let pending = select_messages(&db, 2).unwrap();
        let ids: Vec<i64> = pending[&7].units.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![4]);
        for id in 1..=3 {
            assert!(message_repo::find_record(&db, id).unwrap().is_some());
        }
    }

    #[test]
    fn test_unreadable_timestamp_does_not_block_room() {
        let db = seeded();
        let t = Utc.with_ymd_and_hms(2024, 10, 16, 9, 0, 0).unwrap();
        test_support::message(&db, 1, 7, 1, t, "canonical");
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, room_id, user_id, content, created_at)
                 VALUES (2, 7, 1, 'platform default', '2024-10-16 09:00:30'),
                        (3, 7, 1, 'garbage', '16/10/2024')",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        let pending = select_messages(&db, 200).unwrap();
        let ids: Vec<i64> = pending[&7].units.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2]);

        let record = message_repo::find_record(&db, 3).unwrap().unwrap();
        assert_eq!(record.outcome, "failed");
        assert!(record.processing_error.unwrap().contains("16/10/2024"));
    }

    #[test]
    fn test_select_files_skips_rooms_without_sketch() {
        let db = seeded();
        let t = Utc.with_ymd_and_hms(2024, 10, 16, 9, 0, 0).unwrap();
        test_support::uploaded_file(&db, 10, 7, "fw.log", t);
        test_support::uploaded_file(&db, 11, 8, "other.log", t);
        test_support::uploaded_file(&db, 12, 7, "dns.csv", t + chrono::Duration::seconds(1));

        let pending = select_files(&db).unwrap();
        assert_eq!(pending.len(), 1);
        let ids: Vec<i64> = pending[&7].units.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![10, 12]);

        file_repo::mark_processed(&db, 10, &Outcome::Imported).unwrap();
        let pending = select_files(&db).unwrap();
        let ids: Vec<i64> = pending[&7].units.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![12]);
    }
}
