pub mod config;
pub mod database;
pub mod export;
pub mod models;

pub use models::{
    CardEntry, CardFilter, CardState, Location, NextCard, Quality, ReviewEvent, ScheduleRecord,
    StudySession,
};
