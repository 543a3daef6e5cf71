pub mod due_queue;
pub mod location;
pub mod review_data;
pub mod sm2;
pub mod stats;
pub mod study_session;

pub use due_queue::{CardEntry, DueCounts, NextCard};
pub use location::{CardFilter, Location, NewLocation};
pub use review_data::{CardState, ReviewEvent, ScheduleRecord};
pub use sm2::{NextSchedule, Quality, Reschedule, ScheduleError};
pub use stats::DailyStat;
pub use study_session::{GradeOutcome, SessionError, StudySession};
