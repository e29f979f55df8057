use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use super::activity::is_active_on;
use crate::domain::errors::MedicationError;
use crate::domain::medication::MedicationView;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Time,
    Name,
    Status,
}

impl SortBy {
    pub fn next(self) -> Self {
        match self {
            SortBy::Time => SortBy::Name,
            SortBy::Name => SortBy::Status,
            SortBy::Status => SortBy::Time,
        }
    }
}

impl FromStr for SortBy {
    type Err = MedicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "time" => Ok(SortBy::Time),
            "name" => Ok(SortBy::Name),
            "status" => Ok(SortBy::Status),
            other => Err(MedicationError::Validation(format!("unknown sort order {other:?}"))),
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortBy::Time => write!(f, "time"),
            SortBy::Name => write!(f, "name"),
            SortBy::Status => write!(f, "status"),
        }
    }
}

/// Builds the ordered list shown for one day.
///
/// Keeps the medications active on `date`, drops taken ones unless
/// `show_completed`, then sorts stably so equal keys keep input order. The
/// input slice is left untouched.
pub fn project_schedule<Tz: TimeZone>(
    medications: &[MedicationView],
    date: NaiveDate,
    show_completed: bool,
    sort_by: SortBy,
    tz: &Tz,
) -> Vec<MedicationView> {
    let mut day: Vec<MedicationView> = medications
        .iter()
        .filter(|view| is_active_on(&view.medication, date, tz))
        .filter(|view| show_completed || !view.taken)
        .cloned()
        .collect();

    match sort_by {
        SortBy::Time => day.sort_by(|a, b| a.medication.time.cmp(&b.medication.time)),
        SortBy::Name => day.sort_by(|a, b| a.medication.name.cmp(&b.medication.name)),
        SortBy::Status => day.sort_by_key(|view| view.taken),
    }
    day
}
