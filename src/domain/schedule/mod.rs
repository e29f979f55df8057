//! Pure scheduling logic: treatment durations, per-day activity, schedule
//! projection, course progress and taken-state reconciliation.
//!
//! Nothing here performs I/O. Every function works on a snapshot already in
//! memory, and calendar-day questions are answered in the caller's time zone
//! (`chrono::Local` in the binaries, a fixed offset in tests).

pub mod activity;
pub mod duration;
pub mod progress;
pub mod projector;
pub mod reconcile;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use super::errors::MedicationError;

pub const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;
const MINUTES_PER_DAY: i64 = 24 * 60;

/// First instant of the local calendar day `date`.
///
/// Usually local midnight. In zones whose DST jump skips midnight, the day
/// opens at the first wall-clock minute that exists, so the instant still
/// falls on `date` locally.
pub fn start_of_day<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    (0..MINUTES_PER_DAY)
        .map(|minute| midnight + Duration::minutes(minute))
        .take_while(|local| local.date() == date)
        .find_map(|local| tz.from_local_datetime(&local).earliest())
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| tz.from_utc_datetime(&midnight).with_timezone(&Utc))
}

/// The `[00:00, next 00:00)` window of a local calendar day.
pub fn day_window<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let next = date.succ_opt().unwrap_or(date);
    (start_of_day(date, tz), start_of_day(next, tz))
}

/// Local calendar day an instant falls on.
pub fn local_day<Tz: TimeZone>(instant: &DateTime<Utc>, tz: &Tz) -> NaiveDate {
    instant.with_timezone(tz).date_naive()
}

/// Parses a `YYYY-MM-DD` calendar date.
pub fn parse_calendar_date(raw: &str) -> Result<NaiveDate, MedicationError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| MedicationError::InvalidDate(raw.to_string()))
}

/// Checks a dose time is a valid zero-padded `HH:MM`.
pub fn validate_dose_time(raw: &str) -> Result<(), MedicationError> {
    let well_formed = raw.len() == 5 && NaiveTime::parse_from_str(raw, "%H:%M").is_ok();
    if well_formed {
        Ok(())
    } else {
        Err(MedicationError::Validation(format!("time must be HH:MM, got {raw:?}")))
    }
}
