//! Picks the next location to study and reports how many are due.
//!
//! Due locations are ordered by an explicit comparator instead of leaning on a
//! query engine's NULL ordering. When nothing is due, one of the ten least-seen
//! locations is picked at random so there is always something to practice.

use super::location::{CardFilter, Location};
use super::review_data::{CardState, ScheduleRecord};
use chrono::{DateTime, Utc};
use log::debug;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::cmp::Ordering;

pub const FALLBACK_POOL_SIZE: usize = 10;

/// A location together with its scheduling record, if it has ever been scheduled.
#[derive(Clone, Debug, PartialEq)]
pub struct CardEntry {
    pub location: Location,
    pub schedule: Option<ScheduleRecord>,
}

impl CardEntry {
    pub fn id(&self) -> i64 {
        self.location.id
    }

    pub fn state(&self) -> Option<CardState> {
        self.schedule.as_ref().map(|s| s.state)
    }

    /// Unscheduled locations are always due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.schedule.as_ref().is_none_or(|s| s.is_due(now))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NextCard {
    /// Earliest-due location.
    Due(i64),
    /// Nothing is due; picked among the least-seen locations.
    LeastSeen(i64),
    NoCardsAvailable,
}

impl NextCard {
    pub fn card_id(self) -> Option<i64> {
        match self {
            NextCard::Due(id) | NextCard::LeastSeen(id) => Some(id),
            NextCard::NoCardsAvailable => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DueCounts {
    pub new_due: usize,
    pub review_due: usize,
    pub lapsed_due: usize,
    pub new_total: usize,
    pub review_total: usize,
    pub lapsed_total: usize,
}

impl DueCounts {
    pub fn due(&self) -> usize {
        self.new_due + self.review_due + self.lapsed_due
    }

    pub fn total(&self) -> usize {
        self.new_total + self.review_total + self.lapsed_total
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Bucket {
    New,
    Review,
    Lapsed,
}

fn bucket(state: Option<CardState>) -> Bucket {
    match state {
        None | Some(CardState::New) | Some(CardState::Learning) => Bucket::New,
        Some(CardState::Review) => Bucket::Review,
        Some(CardState::Lapsed) => Bucket::Lapsed,
    }
}

/// Priority among due locations: lapsed, then review, then everything still being learned.
fn due_priority(state: Option<CardState>) -> u8 {
    match state {
        Some(CardState::Lapsed) => 0,
        Some(CardState::Review) => 1,
        None | Some(CardState::New) | Some(CardState::Learning) => 2,
    }
}

/// Priority for the least-seen fallback: new, learning, lapsed, review.
fn fallback_priority(state: Option<CardState>) -> u8 {
    match state {
        None | Some(CardState::New) => 0,
        Some(CardState::Learning) => 1,
        Some(CardState::Lapsed) => 2,
        Some(CardState::Review) => 3,
    }
}

/// Scheduled before unscheduled, then earliest due, then state priority, then id.
pub fn compare_due(a: &CardEntry, b: &CardEntry) -> Ordering {
    let due_a = a.schedule.as_ref().map(|s| s.due_at);
    let due_b = b.schedule.as_ref().map(|s| s.due_at);

    due_a
        .is_none()
        .cmp(&due_b.is_none())
        .then_with(|| due_a.cmp(&due_b))
        .then_with(|| due_priority(a.state()).cmp(&due_priority(b.state())))
        .then_with(|| a.id().cmp(&b.id()))
}

/// State priority, then fewest repetitions, then id.
pub fn compare_least_seen(a: &CardEntry, b: &CardEntry) -> Ordering {
    let reps = |e: &CardEntry| e.schedule.as_ref().map_or(0, |s| s.repetitions);

    fallback_priority(a.state())
        .cmp(&fallback_priority(b.state()))
        .then_with(|| reps(a).cmp(&reps(b)))
        .then_with(|| a.id().cmp(&b.id()))
}

/// The least-seen candidates the random fallback chooses from, in order.
pub fn fallback_candidates<'a>(entries: &'a [CardEntry], filter: &CardFilter) -> Vec<&'a CardEntry> {
    let mut candidates: Vec<&CardEntry> = entries
        .iter()
        .filter(|e| filter.matches(&e.location))
        .collect();
    candidates.sort_by(|a, b| compare_least_seen(a, b));
    candidates.truncate(FALLBACK_POOL_SIZE);
    candidates
}

/// Chooses the next location to present.
pub fn select_next<R: Rng + ?Sized>(
    entries: &[CardEntry],
    now: DateTime<Utc>,
    filter: &CardFilter,
    rng: &mut R,
) -> NextCard {
    let due = entries
        .iter()
        .filter(|e| filter.matches(&e.location))
        .filter(|e| e.is_due(now))
        .min_by(|a, b| compare_due(a, b));

    if let Some(entry) = due {
        debug!("next location {} is due", entry.id());
        return NextCard::Due(entry.id());
    }

    let candidates = fallback_candidates(entries, filter);
    match candidates.choose(rng) {
        Some(entry) => {
            debug!(
                "nothing due, picked location {} among {} least-seen",
                entry.id(),
                candidates.len()
            );
            NextCard::LeastSeen(entry.id())
        }
        None => NextCard::NoCardsAvailable,
    }
}

/// Due and total counts per bucket. Every location that passes the filter lands in exactly one bucket.
pub fn due_counts(entries: &[CardEntry], now: DateTime<Utc>, filter: &CardFilter) -> DueCounts {
    entries
        .iter()
        .filter(|e| filter.matches(&e.location))
        .fold(DueCounts::default(), |mut counts, entry| {
            let is_due = entry.is_due(now);
            let (due, total) = match bucket(entry.state()) {
                Bucket::New => (&mut counts.new_due, &mut counts.new_total),
                Bucket::Review => (&mut counts.review_due, &mut counts.review_total),
                Bucket::Lapsed => (&mut counts.lapsed_due, &mut counts.lapsed_total),
            };
            *total += 1;
            if is_due {
                *due += 1;
            }
            counts
        })
}
