//! Daily aggregates over the review ledger.
use super::review_data::ReviewEvent;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DailyStat {
    pub day: NaiveDate,
    pub count: usize,
    pub success_rate: f64,
}

/// Groups events by UTC calendar day, oldest day first.
/// Days without events are not emitted; no events gives an empty list.
pub fn daily_stats(events: &[ReviewEvent]) -> Vec<DailyStat> {
    let mut days: BTreeMap<NaiveDate, (usize, usize)> = BTreeMap::new();
    for event in events {
        let (count, successes) = days.entry(event.reviewed_at.date_naive()).or_default();
        *count += 1;
        if event.is_success() {
            *successes += 1;
        }
    }

    days.into_iter()
        .map(|(day, (count, successes))| DailyStat {
            day,
            count,
            success_rate: if count == 0 {
                0.0
            } else {
                successes as f64 / count as f64
            },
        })
        .collect()
}
