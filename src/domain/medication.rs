use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::schedule::duration::DurationRequest;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct MedicationId(pub Uuid);

impl Default for MedicationId {
    fn default() -> Self { Self(Uuid::new_v4()) }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl Default for UserId {
    fn default() -> Self { Self(Uuid::new_v4()) }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct LogId(pub Uuid);

impl Default for LogId {
    fn default() -> Self { Self(Uuid::new_v4()) }
}

/// A bounded treatment course. The day count and the date range are two views
/// of the same fact, so they only ever exist together.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreatmentCourse {
    pub days_needed: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Medication {
    pub id: MedicationId,
    pub user_id: UserId,
    pub name: String,
    pub person_name: Option<String>,
    /// Zero-padded 24-hour `HH:MM`.
    pub time: String,
    pub dosage: Option<String>,
    pub notes: Option<String>,
    #[serde(flatten)]
    pub course: Option<TreatmentCourse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Record that a medication was taken on one local calendar day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MedicationLog {
    pub id: LogId,
    pub medication_id: MedicationId,
    pub user_id: UserId,
    pub taken_at: DateTime<Utc>,
    /// Local calendar day of `taken_at`; at most one log per (medication, day).
    pub taken_day: NaiveDate,
    pub scheduled_time: String,
    pub marked_by: Option<String>,
}

/// A medication merged with the taken state of the day being rendered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicationView {
    #[serde(flatten)]
    pub medication: Medication,
    pub taken: bool,
    pub taken_at: Option<DateTime<Utc>>,
    pub marked_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMedication {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub time: String,
    pub dosage: Option<String>,
    pub person_name: Option<String>,
    pub notes: Option<String>,
    pub duration: Option<DurationRequest>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MedicationPatch {
    pub name: Option<String>,
    pub time: Option<String>,
    pub dosage: Option<String>,
    pub person_name: Option<String>,
    pub notes: Option<String>,
    pub duration: Option<DurationRequest>,
    #[serde(default)]
    pub clear_duration: bool,
}
