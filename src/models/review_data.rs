//! Per-location scheduling state and the review events appended after each grading.
use super::sm2::{Quality, ScheduleError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_EASE_FACTOR: f64 = 2.5;

/// Where a location sits in the review state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardState {
    New,
    Learning,
    Review,
    Lapsed,
}

impl CardState {
    pub fn as_str(self) -> &'static str {
        match self {
            CardState::New => "new",
            CardState::Learning => "learning",
            CardState::Review => "review",
            CardState::Lapsed => "lapsed",
        }
    }
}

impl fmt::Display for CardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardState {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(CardState::New),
            "learning" => Ok(CardState::Learning),
            "review" => Ok(CardState::Review),
            "lapsed" => Ok(CardState::Lapsed),
            other => Err(ScheduleError::InvalidState(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub card_id: i64,
    pub repetitions: u32,
    pub ease_factor: f64,
    pub interval: u32,
    pub state: CardState,
    pub lapses: u32,
    pub due_at: DateTime<Utc>,
}

impl ScheduleRecord {
    /// Fresh record for a location that has never been graded.
    pub fn new(card_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            card_id,
            repetitions: 0,
            ease_factor: DEFAULT_EASE_FACTOR,
            interval: 0,
            state: CardState::New,
            lapses: 0,
            due_at: truncate_to_seconds(now),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }
}

/// One grading action. Only ever appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub card_id: i64,
    pub quality: Quality,
    pub reviewed_at: DateTime<Utc>,
}

impl ReviewEvent {
    pub fn new(card_id: i64, quality: Quality, reviewed_at: DateTime<Utc>) -> Self {
        Self {
            card_id,
            quality,
            reviewed_at: truncate_to_seconds(reviewed_at),
        }
    }

    pub fn is_success(&self) -> bool {
        self.quality.is_success()
    }
}

/// Timestamps are persisted as whole unix seconds.
pub fn truncate_to_seconds(time: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or(time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parse() {
        assert_eq!("lapsed".parse::<CardState>().unwrap(), CardState::Lapsed);
        assert_eq!(CardState::Learning.to_string(), "learning");
    }

    #[test]
    fn test_unknown_state_is_rejected() {
        let err = "relearning".parse::<CardState>().unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidState(s) if s == "relearning"));
        assert!("".parse::<CardState>().is_err());
        assert!("New".parse::<CardState>().is_err());
    }

    #[test]
    fn test_fresh_record() {
        let now = Utc::now();
        let record = ScheduleRecord::new(7, now);
        assert_eq!(record.repetitions, 0);
        assert_eq!(record.ease_factor, 2.5);
        assert_eq!(record.interval, 0);
        assert_eq!(record.state, CardState::New);
        assert_eq!(record.lapses, 0);
        assert!(record.is_due(now));
        assert_eq!(record.due_at.timestamp(), now.timestamp());
    }
}
