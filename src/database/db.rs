//! SQLite-backed store
//!
//! Handles schema creation, location capture, per-location progress and the
//! append-only review ledger. The connection lives as long as the store and is
//! closed when it is dropped.

use super::{Result, ReviewStore, StorageError};
use crate::models::{
    CardEntry, CardFilter, CardState, Location, NewLocation, Quality, ReviewEvent, ScheduleRecord,
};
use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::path::Path;

impl ToSql for CardState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for CardState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for Quality {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(i64::from(self.value())))
    }
}

impl FromSql for Quality {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Quality::try_from(value.as_i64()?).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(idx)?;
    DateTime::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs))
}

fn location_from_row(row: &Row<'_>) -> rusqlite::Result<Location> {
    Ok(Location {
        id: row.get(0)?,
        country: row.get(1)?,
        meta: row.get(2)?,
        note: row.get(3)?,
        image_url: row.get(4)?,
        created_at: timestamp_at(row, 5)?,
    })
}

/// Reads progress columns starting at `offset`; `None` when the LEFT JOIN found no row.
fn schedule_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Option<ScheduleRecord>> {
    let Some(card_id) = row.get::<_, Option<i64>>(offset)? else {
        return Ok(None);
    };
    Ok(Some(ScheduleRecord {
        card_id,
        repetitions: row.get(offset + 1)?,
        ease_factor: row.get(offset + 2)?,
        interval: row.get(offset + 3)?,
        state: row.get(offset + 4)?,
        lapses: row.get(offset + 5)?,
        due_at: timestamp_at(row, offset + 6)?,
    }))
}

fn upsert_progress(conn: &Connection, record: &ScheduleRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO progress
            (location_id, repetitions, ease_factor, interval_days, state, lapses, due_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(location_id) DO UPDATE SET
            repetitions = excluded.repetitions,
            ease_factor = excluded.ease_factor,
            interval_days = excluded.interval_days,
            state = excluded.state,
            lapses = excluded.lapses,
            due_at = excluded.due_at",
        params![
            record.card_id,
            record.repetitions,
            record.ease_factor,
            record.interval,
            record.state,
            record.lapses,
            record.due_at.timestamp()
        ],
    )?;
    Ok(())
}

fn insert_review(conn: &Connection, event: &ReviewEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO reviews (location_id, quality, reviewed_at) VALUES (?1, ?2, ?3)",
        params![event.card_id, event.quality, event.reviewed_at.timestamp()],
    )?;
    Ok(())
}

const LOCATION_COLUMNS: &str = "l.id, l.country, l.meta, l.note, l.image_url, l.created_at";
const PROGRESS_COLUMNS: &str =
    "p.location_id, p.repetitions, p.ease_factor, p.interval_days, p.state, p.lapses, p.due_at";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) the database file and makes sure the tables exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        info!("Opened study database at {}", path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Creates tables for locations and their progress.
    /// The review ledger table is created on the first append.
    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS locations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                country TEXT NOT NULL,
                meta TEXT NOT NULL,
                note TEXT NOT NULL DEFAULT '',
                image_url TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_locations_country ON locations(country);

            CREATE TABLE IF NOT EXISTS progress (
                location_id INTEGER PRIMARY KEY,
                repetitions INTEGER NOT NULL DEFAULT 0,
                ease_factor REAL NOT NULL DEFAULT 2.5,
                interval_days INTEGER NOT NULL DEFAULT 0,
                state TEXT NOT NULL DEFAULT 'new',
                lapses INTEGER NOT NULL DEFAULT 0,
                due_at INTEGER NOT NULL,
                FOREIGN KEY (location_id) REFERENCES locations(id) ON DELETE CASCADE
            );",
        )?;
        Ok(Self { conn })
    }

    fn has_ledger(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'reviews'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn ensure_ledger(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS reviews (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                location_id INTEGER NOT NULL,
                quality INTEGER NOT NULL CHECK (quality BETWEEN 0 AND 5),
                reviewed_at INTEGER NOT NULL
            )",
            (),
        )?;
        Ok(())
    }
}

impl ReviewStore for SqliteStore {
    fn add_location(&mut self, location: NewLocation, now: DateTime<Utc>) -> Result<Location> {
        let created_at = crate::models::review_data::truncate_to_seconds(now);
        self.conn.execute(
            "INSERT INTO locations (country, meta, note, image_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                location.country,
                location.meta,
                location.note,
                location.image_url,
                created_at.timestamp()
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!("Location {} captured for {}", id, location.country);

        Ok(Location {
            id,
            country: location.country,
            meta: location.meta,
            note: location.note,
            image_url: location.image_url,
            created_at,
        })
    }

    fn get_location(&self, id: i64) -> Result<Option<Location>> {
        let location = self
            .conn
            .query_row(
                &format!("SELECT {LOCATION_COLUMNS} FROM locations l WHERE l.id = ?1"),
                params![id],
                location_from_row,
            )
            .optional()?;
        Ok(location)
    }

    fn get_schedule(&self, card_id: i64) -> Result<Option<ScheduleRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {PROGRESS_COLUMNS} FROM progress p WHERE p.location_id = ?1"),
                params![card_id],
                |row| schedule_from_row(row, 0),
            )
            .optional()?;
        Ok(record.flatten())
    }

    fn put_schedule(&mut self, record: &ScheduleRecord) -> Result<()> {
        if self.get_location(record.card_id)?.is_none() {
            return Err(StorageError::LocationNotFound(record.card_id));
        }

        upsert_progress(&self.conn, record)
    }

    fn list_cards_with_schedules(&self, filter: &CardFilter) -> Result<Vec<CardEntry>> {
        let country_clause = if filter.is_unrestricted() {
            String::new()
        } else {
            let placeholders = vec!["?"; filter.countries.len()].join(", ");
            format!("WHERE l.country IN ({placeholders})")
        };

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LOCATION_COLUMNS}, {PROGRESS_COLUMNS}
             FROM locations l
             LEFT JOIN progress p ON p.location_id = l.id
             {country_clause}
             ORDER BY l.id ASC"
        ))?;

        let entries = stmt
            .query_map(params_from_iter(filter.countries.iter()), |row| {
                Ok(CardEntry {
                    location: location_from_row(row)?,
                    schedule: schedule_from_row(row, 6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entries)
    }

    fn append_review_event(&mut self, event: &ReviewEvent) -> Result<()> {
        self.ensure_ledger()?;
        insert_review(&self.conn, event)
    }

    fn record_review(&mut self, record: &ScheduleRecord, event: &ReviewEvent) -> Result<()> {
        if self.get_location(record.card_id)?.is_none() {
            return Err(StorageError::LocationNotFound(record.card_id));
        }
        self.ensure_ledger()?;

        let tx = self.conn.transaction()?;
        upsert_progress(&tx, record)?;
        insert_review(&tx, event)?;
        tx.commit()?;
        Ok(())
    }

    fn list_review_events(&self) -> Result<Vec<ReviewEvent>> {
        if !self.has_ledger()? {
            return Ok(Vec::new());
        }

        let mut stmt = self
            .conn
            .prepare("SELECT location_id, quality, reviewed_at FROM reviews ORDER BY id ASC")?;
        let events = stmt
            .query_map([], |row| {
                Ok(ReviewEvent {
                    card_id: row.get(0)?,
                    quality: row.get(1)?,
                    reviewed_at: timestamp_at(row, 2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn store_with(countries: &[&str]) -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        for country in countries {
            store
                .add_location(NewLocation::new(*country, "bollard"), now())
                .unwrap();
        }
        store
    }

    #[test]
    fn test_add_and_get_location() {
        let mut store = store_with(&[]);
        let added = store
            .add_location(
                NewLocation::new("Poland", "yellow-topped bollards").with_note("rural roads"),
                now(),
            )
            .unwrap();

        let loaded = store.get_location(added.id).unwrap().unwrap();
        assert_eq!(loaded, added);
        assert!(store.get_location(999).unwrap().is_none());
    }

    #[test]
    fn test_schedule_upsert() {
        let mut store = store_with(&["Poland"]);
        assert!(store.get_schedule(1).unwrap().is_none());

        let mut record = ScheduleRecord::new(1, now());
        store.put_schedule(&record).unwrap();
        assert_eq!(store.get_schedule(1).unwrap(), Some(record.clone()));

        record.state = CardState::Lapsed;
        record.lapses = 1;
        record.ease_factor = 2.3;
        record.interval = 7;
        record.due_at = now() + Duration::days(7);
        store.put_schedule(&record).unwrap();
        assert_eq!(store.get_schedule(1).unwrap(), Some(record));
    }

    #[test]
    fn test_put_schedule_for_missing_location() {
        let mut store = store_with(&[]);
        let err = store.put_schedule(&ScheduleRecord::new(42, now())).unwrap_err();
        assert!(matches!(err, StorageError::LocationNotFound(42)));
    }

    #[test]
    fn test_list_cards_left_joins_progress() {
        let mut store = store_with(&["Poland", "Chile", "Poland"]);
        store.put_schedule(&ScheduleRecord::new(2, now())).unwrap();

        let all = store.list_cards_with_schedules(&CardFilter::all()).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[0].schedule.is_none());
        assert_eq!(all[1].schedule.as_ref().map(|s| s.card_id), Some(2));

        let poland = store
            .list_cards_with_schedules(&CardFilter::countries(["Poland"]))
            .unwrap();
        let ids: Vec<i64> = poland.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_unknown_state_in_database_is_an_error() {
        let mut store = store_with(&["Poland"]);
        store.put_schedule(&ScheduleRecord::new(1, now())).unwrap();
        store
            .conn
            .execute("UPDATE progress SET state = 'graduated'", ())
            .unwrap();

        assert!(store.get_schedule(1).is_err());
    }

    #[test]
    fn test_ledger_created_on_first_append() {
        let mut store = store_with(&["Poland"]);
        assert!(!store.has_ledger().unwrap());
        assert!(store.list_review_events().unwrap().is_empty());

        let event = ReviewEvent::new(1, Quality::try_from(4_i64).unwrap(), now());
        store.append_review_event(&event).unwrap();
        store
            .append_review_event(&ReviewEvent::new(1, Quality::try_from(1_i64).unwrap(), now()))
            .unwrap();

        let events = store.list_review_events().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], event);
    }

    #[test]
    fn test_reopen_file_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("study.sqlite3");

        {
            let mut store = SqliteStore::open(&path).unwrap();
            store
                .add_location(NewLocation::new("Kenya", "snorkel"), now())
                .unwrap();
            store.put_schedule(&ScheduleRecord::new(1, now())).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let entries = store.list_cards_with_schedules(&CardFilter::all()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].location.country, "Kenya");
        assert!(entries[0].schedule.is_some());
    }

    #[test]
    fn test_record_review_commits_both() {
        let mut store = store_with(&["Poland"]);
        let mut record = ScheduleRecord::new(1, now());
        record.state = CardState::Learning;
        record.repetitions = 1;
        let event = ReviewEvent::new(1, Quality::try_from(4_i64).unwrap(), now());

        store.record_review(&record, &event).unwrap();
        assert_eq!(store.get_schedule(1).unwrap(), Some(record));
        assert_eq!(store.list_review_events().unwrap(), vec![event]);
    }

    #[test]
    fn test_record_review_rolls_back_when_ledger_rejects() {
        let mut store = store_with(&["Poland"]);
        let before = ScheduleRecord::new(1, now());
        store.put_schedule(&before).unwrap();
        // A ledger that refuses every row
        store
            .conn
            .execute(
                "CREATE TABLE reviews (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    location_id INTEGER NOT NULL,
                    quality INTEGER NOT NULL CHECK (quality < 0),
                    reviewed_at INTEGER NOT NULL
                )",
                (),
            )
            .unwrap();

        let mut after = before.clone();
        after.state = CardState::Lapsed;
        after.lapses = 1;
        after.interval = 7;
        let event = ReviewEvent::new(1, Quality::try_from(0_i64).unwrap(), now());

        let err = store.record_review(&after, &event).unwrap_err();
        assert!(matches!(err, StorageError::Sqlite(_)));
        assert_eq!(store.get_schedule(1).unwrap(), Some(before));
        assert!(store.list_review_events().unwrap().is_empty());
    }

    #[test]
    fn test_far_future_due_time_survives_storage() {
        let mut store = store_with(&["Poland"]);
        let mut record = ScheduleRecord::new(1, now());
        record.interval = u32::MAX;
        record.due_at = crate::models::review_data::truncate_to_seconds(DateTime::<Utc>::MAX_UTC);
        store.put_schedule(&record).unwrap();
        assert_eq!(store.get_schedule(1).unwrap(), Some(record));
    }
}
