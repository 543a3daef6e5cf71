//! SM-2 variant used to reschedule a location after it has been graded.
//!
//! Grades run 0-5. Rules are checked in order and the first match wins:
//! - A brand-new location graded 2 ("hard") goes to learning and comes back in 5 minutes
//! - Any grade of 0-1 is a lapse: interval 7 days, ease -0.2, repetitions reset
//! - A lapsed location with no repetitions graded 3+ recovers into learning, back in 10 minutes
//! - Otherwise the interval grows: 1 day, then 3 or 6 days, then multiplied by the ease factor
//!
//! The ease factor never drops below 1.3.

use super::review_data::{CardState, ScheduleRecord};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const LAPSE_INTERVAL_DAYS: u32 = 7;
pub const FRESH_HARD_DELAY_MINUTES: u32 = 5;
pub const LAPSE_RECOVERY_DELAY_MINUTES: u32 = 10;
const EASY_BONUS: f64 = 1.3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid grade {0:?}: expected an integer between 0 and 5")]
    InvalidGrade(String),

    #[error("invalid card state {0:?}")]
    InvalidState(String),
}

/// A validated grade in 0..=5. Out-of-range values are rejected, never clamped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Quality(u8);

impl Quality {
    pub const MAX: u8 = 5;

    pub fn value(self) -> u8 {
        self.0
    }

    /// Grades of 3 and above count as a successful recall.
    pub fn is_success(self) -> bool {
        self.0 >= 3
    }
}

impl TryFrom<i64> for Quality {
    type Error = ScheduleError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .filter(|q| *q <= Self::MAX)
            .map(Quality)
            .ok_or_else(|| ScheduleError::InvalidGrade(value.to_string()))
    }
}

impl From<Quality> for u8 {
    fn from(quality: Quality) -> Self {
        quality.0
    }
}

impl FromStr for Quality {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map_err(|_| ScheduleError::InvalidGrade(s.to_string()))
            .and_then(Quality::try_from)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// When the location should be shown again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reschedule {
    /// Steady-state scheduling, whole days out.
    InDays { days: u32 },
    /// Short re-show within the same sitting.
    Soon { minutes: u32 },
}

impl Reschedule {
    pub fn delay(self) -> Duration {
        match self {
            Reschedule::InDays { days } => Duration::days(i64::from(days)),
            Reschedule::Soon { minutes } => Duration::minutes(i64::from(minutes)),
        }
    }
}

/// Output of the scheduler: the new progress fields plus when to show the location again.
#[derive(Clone, Debug, PartialEq)]
pub struct NextSchedule {
    pub repetitions: u32,
    pub ease_factor: f64,
    pub interval: u32,
    pub state: CardState,
    pub lapses: u32,
    pub reschedule: Reschedule,
}

impl NextSchedule {
    /// Saturates at the latest representable time once the interval outgrows the calendar.
    pub fn due_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let due = now
            .checked_add_signed(self.reschedule.delay())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        super::review_data::truncate_to_seconds(due)
    }

    pub fn into_record(self, card_id: i64, now: DateTime<Utc>) -> ScheduleRecord {
        let due_at = self.due_at(now);
        ScheduleRecord {
            card_id,
            repetitions: self.repetitions,
            ease_factor: self.ease_factor,
            interval: self.interval,
            state: self.state,
            lapses: self.lapses,
            due_at,
        }
    }
}

/// Computes the next scheduling state. Pure: depends only on the grade and the previous record.
pub fn next_schedule(quality: Quality, record: &ScheduleRecord) -> NextSchedule {
    let q = quality.value();
    let ScheduleRecord {
        repetitions,
        ease_factor,
        interval,
        state,
        lapses,
        ..
    } = *record;

    // Fresh-hard shortcut
    if repetitions == 0 && q == 2 && state != CardState::Lapsed {
        return NextSchedule {
            repetitions: 0,
            ease_factor,
            interval: 0,
            state: CardState::Learning,
            lapses,
            reschedule: Reschedule::Soon {
                minutes: FRESH_HARD_DELAY_MINUTES,
            },
        };
    }

    // Lapse
    if q <= 1 {
        return NextSchedule {
            repetitions: 0,
            ease_factor: (ease_factor - 0.2).max(MIN_EASE_FACTOR),
            interval: LAPSE_INTERVAL_DAYS,
            state: CardState::Lapsed,
            lapses: lapses.saturating_add(1),
            reschedule: Reschedule::InDays {
                days: LAPSE_INTERVAL_DAYS,
            },
        };
    }

    // Lapse recovery
    if state == CardState::Lapsed && repetitions == 0 && q >= 3 {
        return NextSchedule {
            repetitions: 1,
            ease_factor,
            interval: 1,
            state: CardState::Learning,
            lapses,
            reschedule: Reschedule::Soon {
                minutes: LAPSE_RECOVERY_DELAY_MINUTES,
            },
        };
    }

    let (new_repetitions, new_interval, new_state) = match repetitions {
        0 => (1, 1, CardState::Learning),
        1 => (2, if q == 2 { 3 } else { 6 }, CardState::Review),
        n => {
            let grown = if q == 2 {
                round_days(f64::from(interval) / 2.0).max(1)
            } else {
                let scaled = round_days(f64::from(interval) * ease_factor);
                if q == 5 {
                    round_days(f64::from(scaled) * EASY_BONUS)
                } else {
                    scaled
                }
            };
            (n.saturating_add(1), grown, CardState::Review)
        }
    };

    NextSchedule {
        repetitions: new_repetitions,
        ease_factor: adjust_ease(ease_factor, q),
        interval: new_interval,
        state: new_state,
        lapses,
        reschedule: Reschedule::InDays { days: new_interval },
    }
}

/// Grades a record and stamps the resulting due time relative to `now`.
pub fn calculate_next_review(
    record: &ScheduleRecord,
    quality: Quality,
    now: DateTime<Utc>,
) -> ScheduleRecord {
    next_schedule(quality, record).into_record(record.card_id, now)
}

/// EF' = EF + (0.1 - (5-q) * (0.08 + (5-q) * 0.02)), floored at 1.3
fn adjust_ease(ease_factor: f64, q: u8) -> f64 {
    let miss = f64::from(Quality::MAX - q);
    (ease_factor + (0.1 - miss * (0.08 + miss * 0.02))).max(MIN_EASE_FACTOR)
}

/// Float-to-int `as` saturates, so runaway growth pins at `u32::MAX` days.
fn round_days(days: f64) -> u32 {
    days.round().max(0.0) as u32
}
