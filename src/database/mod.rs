//! Persistence for locations, their scheduling progress and the review ledger.

pub mod db;
pub mod memory;

pub use db::SqliteStore;
pub use memory::MemoryStore;

use crate::models::{CardEntry, CardFilter, Location, NewLocation, ReviewEvent, ScheduleRecord};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Location not found: {0}")]
    LocationNotFound(i64),

    #[error("Invalid backup: {0}")]
    InvalidBackup(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Everything the scheduler core needs from storage. Writes to one location's
/// progress are last-write-wins.
pub trait ReviewStore {
    fn add_location(&mut self, location: NewLocation, now: DateTime<Utc>) -> Result<Location>;

    fn get_location(&self, id: i64) -> Result<Option<Location>>;

    fn get_schedule(&self, card_id: i64) -> Result<Option<ScheduleRecord>>;

    /// Inserts or overwrites the progress for `record.card_id`.
    fn put_schedule(&mut self, record: &ScheduleRecord) -> Result<()>;

    /// Every location passing `filter` with its progress, ordered by id.
    fn list_cards_with_schedules(&self, filter: &CardFilter) -> Result<Vec<CardEntry>>;

    fn append_review_event(&mut self, event: &ReviewEvent) -> Result<()>;

    /// Writes the graded progress and its ledger event together; neither lands if either fails.
    fn record_review(&mut self, record: &ScheduleRecord, event: &ReviewEvent) -> Result<()>;

    /// All review events in the order they were appended.
    fn list_review_events(&self) -> Result<Vec<ReviewEvent>>;
}
