//! Duration and distance summaries over a record snapshot.
//!
//! Pure functions, independent of sync and cache state: pass them whatever
//! [`crate::SyncEngine::current_records`] returned.
//!
//! ## Example
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use workoutsync::stats::{summarize, DateRange};
//! use workoutsync::Record;
//!
//! let end = Utc.with_ymd_and_hms(2024, 5, 6, 7, 30, 0).unwrap();
//! let run = Record::new("w-1", end - chrono::Duration::minutes(30), end, "Run", 1800.0)
//!     .with_distance(5_000.0);
//!
//! let week = DateRange::new(
//!     Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap(),
//!     Utc.with_ymd_and_hms(2024, 5, 13, 0, 0, 0).unwrap(),
//! );
//! let summary = summarize(&[run], Some(&week));
//! assert_eq!(summary.count, 1);
//! assert_eq!(summary.total_distance_meters, 5_000.0);
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Record;

/// Half-open time range `[start, end)` matched against a record's start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, record: &Record) -> bool {
        record.start_time >= self.start && record.start_time < self.end
    }
}

/// Totals for one activity type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityTotals {
    pub count: u32,
    pub duration_seconds: f64,
    pub distance_meters: f64,
}

/// Aggregate over a set of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSummary {
    pub count: u32,
    pub total_duration_seconds: f64,
    /// Records without a distance contribute nothing
    pub total_distance_meters: f64,
    /// Duration-weighted average heart rate over records that report one
    pub avg_heart_rate: Option<f64>,
    pub by_activity: BTreeMap<String, ActivityTotals>,
}

/// Summarize `records`, optionally restricted to `range`.
pub fn summarize(records: &[Record], range: Option<&DateRange>) -> WorkoutSummary {
    let mut summary = WorkoutSummary::default();
    let mut hr_weighted = 0.0;
    let mut hr_duration = 0.0;

    for record in records
        .iter()
        .filter(|r| range.is_none_or(|range| range.contains(r)))
    {
        let distance = record.distance_meters.unwrap_or(0.0);
        summary.count += 1;
        summary.total_duration_seconds += record.duration_seconds;
        summary.total_distance_meters += distance;

        if let Some(hr) = record.avg_heart_rate {
            hr_weighted += hr * record.duration_seconds;
            hr_duration += record.duration_seconds;
        }

        let totals = summary
            .by_activity
            .entry(record.activity_type.clone())
            .or_default();
        totals.count += 1;
        totals.duration_seconds += record.duration_seconds;
        totals.distance_meters += distance;
    }

    if hr_duration > 0.0 {
        summary.avg_heart_rate = Some(hr_weighted / hr_duration);
    }
    summary
}

/// Records sharing a UTC calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayGroup {
    pub day: NaiveDate,
    pub records: Vec<Record>,
}

/// Group records by the UTC day of their `end_time`, newest day first.
///
/// Order within a day follows the input order.
pub fn group_by_day(records: &[Record]) -> Vec<DayGroup> {
    let mut days: BTreeMap<NaiveDate, Vec<Record>> = BTreeMap::new();
    for record in records {
        days.entry(record.end_time.date_naive())
            .or_default()
            .push(record.clone());
    }
    days.into_iter()
        .rev()
        .map(|(day, records)| DayGroup { day, records })
        .collect()
}
