use chrono::{NaiveDate, TimeZone};

use super::local_day;
use crate::domain::medication::Medication;

/// Whether a medication should appear on `date`. Medications without a course
/// are ongoing and appear every day; otherwise both ends are inclusive and
/// only calendar days are compared.
pub fn is_active_on<Tz: TimeZone>(medication: &Medication, date: NaiveDate, tz: &Tz) -> bool {
    let Some(course) = medication.course else { return true };
    let start = local_day(&course.start_date, tz);
    let end = local_day(&course.end_date, tz);
    start <= date && date <= end
}
