//! Conversion between a day count and an explicit start/end range.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::{local_day, parse_calendar_date, start_of_day};
use crate::domain::errors::MedicationError;
use crate::domain::medication::TreatmentCourse;

/// How the user expressed a treatment length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationInput {
    Days(u32),
    Range { start: NaiveDate, end: NaiveDate },
}

/// Wire form of a duration, as sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DurationRequest {
    Days { days: Option<u32> },
    Range { start: Option<String>, end: Option<String> },
}

impl DurationRequest {
    /// Missing or zero inputs mean "no duration"; unparseable dates are errors.
    pub fn parse(&self) -> Result<Option<DurationInput>, MedicationError> {
        match self {
            DurationRequest::Days { days: Some(days) } if *days > 0 => Ok(Some(DurationInput::Days(*days))),
            DurationRequest::Days { .. } => Ok(None),
            DurationRequest::Range { start: Some(start), end: Some(end) }
                if !start.trim().is_empty() && !end.trim().is_empty() =>
            {
                Ok(Some(DurationInput::Range {
                    start: parse_calendar_date(start)?,
                    end: parse_calendar_date(end)?,
                }))
            }
            DurationRequest::Range { .. } => Ok(None),
        }
    }
}

/// Resolves a duration input into a full treatment course.
///
/// A day count anchors the course to the local day containing `now`, so
/// re-submitting a count while editing always restarts the course today.
pub fn resolve_duration<Tz: TimeZone>(input: Option<DurationInput>, now: &DateTime<Tz>) -> Option<TreatmentCourse> {
    match input? {
        DurationInput::Days(0) => None,
        DurationInput::Days(days) => {
            let tz = now.timezone();
            let start_date = start_of_day(now.date_naive(), &tz);
            Some(TreatmentCourse {
                days_needed: days,
                start_date,
                end_date: start_date + Duration::days(i64::from(days)),
            })
        }
        DurationInput::Range { start, end } => {
            let tz = now.timezone();
            Some(TreatmentCourse {
                days_needed: days_in_range(start, end),
                start_date: start_of_day(start, &tz),
                end_date: start_of_day(end, &tz),
            })
        }
    }
}

/// Inclusive day count of a range: a range from a day to itself is one day.
pub fn days_in_range(start: NaiveDate, end: NaiveDate) -> u32 {
    let span = (end - start).num_days().unsigned_abs();
    u32::try_from(span).unwrap_or(u32::MAX - 1) + 1
}

/// Rebuilds a course from stored dates when the day count is missing.
pub fn course_from_dates<Tz: TimeZone>(
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    tz: &Tz,
) -> TreatmentCourse {
    TreatmentCourse {
        days_needed: days_in_range(local_day(&start_date, tz), local_day(&end_date, tz)),
        start_date,
        end_date,
    }
}

/// Course for a copy of a medication. A counted course starts over today;
/// a bare range (no day count) is carried across unchanged.
pub fn copied_course<Tz: TimeZone>(course: Option<TreatmentCourse>, now: &DateTime<Tz>) -> Option<TreatmentCourse> {
    let course = course?;
    match course.days_needed {
        0 => Some(course),
        days => resolve_duration(Some(DurationInput::Days(days)), now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate};

    fn tz() -> FixedOffset { FixedOffset::east_opt(3600).unwrap() }

    fn now() -> DateTime<FixedOffset> {
        tz().with_ymd_and_hms(2024, 5, 20, 14, 37, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

    #[test]
    fn days_anchor_to_start_of_today() {
        let course = resolve_duration(Some(DurationInput::Days(7)), &now()).unwrap();
        assert_eq!(course.days_needed, 7);
        assert_eq!(course.start_date, start_of_day(date(2024, 5, 20), &tz()));
        assert_eq!((course.end_date - course.start_date).num_hours(), 7 * 24);
    }

    #[test]
    fn days_round_trip_through_range() {
        for days in [1u32, 2, 10, 30, 365] {
            let course = resolve_duration(Some(DurationInput::Days(days)), &now()).unwrap();
            let start = local_day(&course.start_date, &tz());
            let end = local_day(&course.end_date, &tz());
            let back = days_in_range(start, end);
            assert!(back == days || back == days + 1, "days={days} back={back}");
        }
    }

    #[test]
    fn same_day_range_is_one_day() {
        let d = date(2024, 1, 1);
        let course = resolve_duration(Some(DurationInput::Range { start: d, end: d }), &now()).unwrap();
        assert_eq!(course.days_needed, 1);
        assert_eq!(course.start_date, course.end_date);
    }

    #[test]
    fn range_counts_both_endpoints() {
        let input = DurationInput::Range { start: date(2024, 1, 1), end: date(2024, 1, 10) };
        let course = resolve_duration(Some(input), &now()).unwrap();
        assert_eq!(course.days_needed, 10);
        assert_eq!(course.start_date, start_of_day(date(2024, 1, 1), &tz()));
    }

    #[test]
    fn nothing_to_resolve_is_none() {
        assert_eq!(resolve_duration(None, &now()), None);
        assert_eq!(resolve_duration(Some(DurationInput::Days(0)), &now()), None);
    }

    #[test]
    fn request_parsing() {
        let days: DurationRequest = serde_json::from_str(r#"{"mode":"days","days":5}"#).unwrap();
        assert_eq!(days.parse().unwrap(), Some(DurationInput::Days(5)));

        let empty: DurationRequest = serde_json::from_str(r#"{"mode":"days"}"#).unwrap();
        assert_eq!(empty.parse().unwrap(), None);

        let half: DurationRequest = serde_json::from_str(r#"{"mode":"range","start":"2024-01-01"}"#).unwrap();
        assert_eq!(half.parse().unwrap(), None);

        let bad = DurationRequest::Range { start: Some("tomorrow".into()), end: Some("2024-01-02".into()) };
        assert!(matches!(bad.parse(), Err(MedicationError::InvalidDate(_))));
    }

    #[test]
    fn course_rebuilt_from_dates() {
        let start = start_of_day(date(2024, 2, 1), &tz());
        let end = start_of_day(date(2024, 2, 3), &tz());
        assert_eq!(course_from_dates(start, end, &tz()).days_needed, 3);
    }

    #[test]
    fn copied_counted_course_restarts_today() {
        let old = TreatmentCourse {
            days_needed: 5,
            start_date: start_of_day(date(2024, 1, 1), &tz()),
            end_date: start_of_day(date(2024, 1, 6), &tz()),
        };
        let copy = copied_course(Some(old), &now()).unwrap();
        assert_eq!(copy.days_needed, 5);
        assert_eq!(copy.start_date, start_of_day(date(2024, 5, 20), &tz()));
        assert_eq!((copy.end_date - copy.start_date).num_days(), 5);
    }

    #[test]
    fn copied_bare_range_is_kept() {
        let old = TreatmentCourse {
            days_needed: 0,
            start_date: start_of_day(date(2024, 1, 1), &tz()),
            end_date: start_of_day(date(2024, 1, 6), &tz()),
        };
        assert_eq!(copied_course(Some(old), &now()), Some(old));
        assert_eq!(copied_course(None, &now()), None);
    }
}
