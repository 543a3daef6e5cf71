//! In-memory store, for tests and throwaway sessions.
use super::{Result, ReviewStore, StorageError};
use crate::models::review_data::truncate_to_seconds;
use crate::models::{CardEntry, CardFilter, Location, NewLocation, ReviewEvent, ScheduleRecord};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[derive(Default)]
pub struct MemoryStore {
    locations: BTreeMap<i64, Location>,
    schedules: BTreeMap<i64, ScheduleRecord>,
    events: Vec<ReviewEvent>,
    next_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReviewStore for MemoryStore {
    fn add_location(&mut self, location: NewLocation, now: DateTime<Utc>) -> Result<Location> {
        self.next_id += 1;
        let location = Location {
            id: self.next_id,
            country: location.country,
            meta: location.meta,
            note: location.note,
            image_url: location.image_url,
            created_at: truncate_to_seconds(now),
        };
        self.locations.insert(location.id, location.clone());
        Ok(location)
    }

    fn get_location(&self, id: i64) -> Result<Option<Location>> {
        Ok(self.locations.get(&id).cloned())
    }

    fn get_schedule(&self, card_id: i64) -> Result<Option<ScheduleRecord>> {
        Ok(self.schedules.get(&card_id).cloned())
    }

    fn put_schedule(&mut self, record: &ScheduleRecord) -> Result<()> {
        if !self.locations.contains_key(&record.card_id) {
            return Err(StorageError::LocationNotFound(record.card_id));
        }
        let mut record = record.clone();
        record.due_at = truncate_to_seconds(record.due_at);
        self.schedules.insert(record.card_id, record);
        Ok(())
    }

    fn list_cards_with_schedules(&self, filter: &CardFilter) -> Result<Vec<CardEntry>> {
        Ok(self
            .locations
            .values()
            .filter(|location| filter.matches(location))
            .map(|location| CardEntry {
                location: location.clone(),
                schedule: self.schedules.get(&location.id).cloned(),
            })
            .collect())
    }

    fn append_review_event(&mut self, event: &ReviewEvent) -> Result<()> {
        self.events.push(event.clone());
        Ok(())
    }

    fn record_review(&mut self, record: &ScheduleRecord, event: &ReviewEvent) -> Result<()> {
        self.put_schedule(record)?;
        self.events.push(event.clone());
        Ok(())
    }

    fn list_review_events(&self) -> Result<Vec<ReviewEvent>> {
        Ok(self.events.clone())
    }
}
