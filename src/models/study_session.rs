//! Study session wiring: picks a location, grades it and records the review.
//!
//! The selector, the scheduler and the ledger aggregation never call each other;
//! this is the one place that strings them together against a store.

use super::due_queue::{self, DueCounts, NextCard};
use super::review_data::{ReviewEvent, ScheduleRecord};
use super::sm2::{self, Quality, Reschedule};
use super::stats::{self, DailyStat};
use super::{CardFilter, Location, NewLocation};
use crate::database::{ReviewStore, StorageError};
use chrono::{DateTime, Utc};
use log::{debug, info};
use rand::Rng;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Location not found: {0}")]
    CardNotFound(i64),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// What grading a location produced.
#[derive(Clone, Debug, PartialEq)]
pub struct GradeOutcome {
    pub record: ScheduleRecord,
    pub reschedule: Reschedule,
}

pub struct StudySession<S: ReviewStore> {
    store: S,
    filter: CardFilter,
}

impl<S: ReviewStore> StudySession<S> {
    pub fn new(store: S, filter: CardFilter) -> Self {
        Self { store, filter }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn filter(&self) -> &CardFilter {
        &self.filter
    }

    pub fn add_location(&mut self, location: NewLocation, now: DateTime<Utc>) -> Result<Location> {
        let location = self.store.add_location(location, now)?;
        info!("Added location {} ({})", location.id, location.country);
        Ok(location)
    }

    pub fn next_card<R: Rng + ?Sized>(&self, now: DateTime<Utc>, rng: &mut R) -> Result<NextCard> {
        let entries = self.store.list_cards_with_schedules(&self.filter)?;
        Ok(due_queue::select_next(&entries, now, &self.filter, rng))
    }

    /// Grades a location. A location that was never scheduled is graded from a fresh record.
    pub fn grade(&mut self, card_id: i64, quality: Quality, now: DateTime<Utc>) -> Result<GradeOutcome> {
        if self.store.get_location(card_id)?.is_none() {
            return Err(SessionError::CardNotFound(card_id));
        }

        let previous = match self.store.get_schedule(card_id)? {
            Some(record) => record,
            None => {
                debug!("Location {} has no progress yet, starting fresh", card_id);
                ScheduleRecord::new(card_id, now)
            }
        };

        let next = sm2::next_schedule(quality, &previous);
        let reschedule = next.reschedule;
        let record = next.into_record(card_id, now);

        self.store
            .record_review(&record, &ReviewEvent::new(card_id, quality, now))?;

        info!(
            "Graded location {} with {}: {} -> {}, due {}",
            card_id, quality, previous.state, record.state, record.due_at
        );
        Ok(GradeOutcome { record, reschedule })
    }

    pub fn due_counts(&self, now: DateTime<Utc>) -> Result<DueCounts> {
        let entries = self.store.list_cards_with_schedules(&self.filter)?;
        Ok(due_queue::due_counts(&entries, now, &self.filter))
    }

    pub fn daily_stats(&self) -> Result<Vec<DailyStat>> {
        Ok(stats::daily_stats(&self.store.list_review_events()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MemoryStore, SqliteStore};
    use crate::models::CardState;
    use chrono::Duration;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn q(value: i64) -> Quality {
        Quality::try_from(value).unwrap()
    }

    fn session_with<S: ReviewStore>(store: S, countries: &[&str]) -> StudySession<S> {
        let mut session = StudySession::new(store, CardFilter::all());
        for country in countries {
            session
                .add_location(NewLocation::new(*country, "pole"), now())
                .unwrap();
        }
        session
    }

    #[test]
    fn test_grading_unscheduled_location_starts_fresh() {
        let mut session = session_with(MemoryStore::new(), &["Poland"]);
        let outcome = session.grade(1, q(4), now()).unwrap();

        assert_eq!(outcome.record.state, CardState::Learning);
        assert_eq!(outcome.record.repetitions, 1);
        assert_eq!(outcome.record.interval, 1);
        assert_eq!(outcome.record.due_at, now() + Duration::days(1));
        assert_eq!(session.store().get_schedule(1).unwrap(), Some(outcome.record));
    }

    #[test]
    fn test_grading_unknown_location() {
        let mut session = session_with(MemoryStore::new(), &[]);
        let err = session.grade(5, q(3), now()).unwrap_err();
        assert!(matches!(err, SessionError::CardNotFound(5)));
        assert!(session.daily_stats().unwrap().is_empty());
    }

    #[test]
    fn test_lapsed_recovery_is_due_in_ten_minutes() {
        let mut session = session_with(SqliteStore::open_in_memory().unwrap(), &["Chile"]);
        session.grade(1, q(0), now()).unwrap();

        let later = now() + Duration::days(7);
        let outcome = session.grade(1, q(4), later).unwrap();
        assert_eq!(outcome.record.state, CardState::Learning);
        assert_eq!(outcome.record.repetitions, 1);
        assert_eq!(outcome.record.interval, 1);
        assert_eq!(outcome.record.lapses, 1);
        assert_eq!(outcome.reschedule, Reschedule::Soon { minutes: 10 });
        assert_eq!(outcome.record.due_at, later + Duration::minutes(10));
    }

    #[test]
    fn test_review_loop_moves_through_queue() {
        let mut session = session_with(SqliteStore::open_in_memory().unwrap(), &["Poland", "Chile"]);
        let mut rng = StdRng::seed_from_u64(7);

        assert_eq!(session.next_card(now(), &mut rng).unwrap(), NextCard::Due(1));
        session.grade(1, q(5), now()).unwrap();

        assert_eq!(session.next_card(now(), &mut rng).unwrap(), NextCard::Due(2));
        session.grade(2, q(2), now()).unwrap();

        // Location 2 comes back after five minutes, location 1 after a day
        let counts = session.due_counts(now() + Duration::minutes(6)).unwrap();
        assert_eq!(counts.new_due, 1);
        assert_eq!(counts.total(), 2);
        assert_eq!(
            session.next_card(now() + Duration::minutes(6), &mut rng).unwrap(),
            NextCard::Due(2)
        );

        let stats = session.daily_stats().unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].count, 2);
        assert!((stats[0].success_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_falls_back_when_nothing_is_due() {
        let mut session = session_with(MemoryStore::new(), &["Poland"]);
        session.grade(1, q(4), now()).unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            session.next_card(now(), &mut rng).unwrap(),
            NextCard::LeastSeen(1)
        );
    }

    #[test]
    fn test_filter_restricts_session() {
        let mut store = MemoryStore::new();
        store.add_location(NewLocation::new("Poland", "a"), now()).unwrap();
        store.add_location(NewLocation::new("Chile", "b"), now()).unwrap();
        let session = StudySession::new(store, CardFilter::countries(["Chile"]));

        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(session.next_card(now(), &mut rng).unwrap(), NextCard::Due(2));
        assert_eq!(session.due_counts(now()).unwrap().total(), 1);
    }

    #[test]
    fn test_repeated_easy_grades_never_panic() {
        let mut session = session_with(MemoryStore::new(), &["Poland"]);
        let mut last = None;
        for _ in 0..20 {
            last = Some(session.grade(1, q(5), now()).unwrap());
        }

        let record = last.unwrap().record;
        assert_eq!(record.repetitions, 20);
        assert!(record.due_at > now());
        assert_eq!(session.daily_stats().unwrap()[0].count, 20);
    }
}
