use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MILLIS_PER_DAY;
use crate::domain::medication::Medication;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressInfo {
    pub days_needed: u32,
    pub days_elapsed: i64,
    pub days_remaining: i64,
    pub progress_percent: f64,
    pub is_complete: bool,
}

/// Where a medication's course stands relative to `now`.
///
/// Elapsed days are the ceiling of the absolute distance from the start, so a
/// course starting in the future also reports a positive elapsed count.
pub fn compute_progress(medication: &Medication, now: DateTime<Utc>) -> Option<ProgressInfo> {
    let course = medication.course?;
    if course.days_needed == 0 {
        return None;
    }
    let days_needed = i64::from(course.days_needed);

    let distance = (now - course.start_date).num_milliseconds().unsigned_abs();
    let days_elapsed = i64::try_from(distance.div_ceil(MILLIS_PER_DAY as u64)).unwrap_or(i64::MAX);
    let left = days_needed.saturating_sub(days_elapsed);
    let is_complete = left <= 0;

    let progress_percent = if is_complete {
        100.0
    } else {
        (100.0 * days_elapsed as f64 / days_needed as f64).min(100.0)
    };

    Some(ProgressInfo {
        days_needed: course.days_needed,
        days_elapsed,
        days_remaining: left.max(0),
        progress_percent,
        is_complete,
    })
}
