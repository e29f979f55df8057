use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use super::change_feed::{ChangeFeed, ChangeSignal, ChangedTable};
use crate::domain::{
    errors::MedicationError,
    medication::{
        LogId, Medication, MedicationId, MedicationLog, MedicationPatch, MedicationView, NewMedication, TreatmentCourse, UserId,
    },
    repository::MedicationRepository,
    schedule::{
        day_window,
        duration::{copied_course, resolve_duration, DurationRequest},
        local_day,
        progress::{compute_progress, ProgressInfo},
        projector::{project_schedule, SortBy},
        reconcile::{reconcile_all, TakenState, Transition},
        validate_dose_time,
    },
};

/// One row of a projected day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleEntry {
    pub medication: MedicationView,
    pub progress: Option<ProgressInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "log", rename_all = "snake_case")]
pub enum MarkOutcome {
    Created(MedicationLog),
    AlreadyTaken(MedicationLog),
}

impl MarkOutcome {
    pub fn log(&self) -> &MedicationLog {
        match self {
            MarkOutcome::Created(log) | MarkOutcome::AlreadyTaken(log) => log,
        }
    }
}

#[async_trait]
pub trait MedicationService: Send + Sync + 'static {
    async fn check_setup(&self) -> Result<bool>;
    async fn create(&self, user: UserId, input: NewMedication) -> Result<Medication>;
    async fn get(&self, user: UserId, id: MedicationId) -> Result<Option<Medication>>;
    async fn list(&self, user: UserId) -> Result<Vec<Medication>>;
    async fn update(&self, user: UserId, id: MedicationId, patch: MedicationPatch) -> Result<Option<Medication>>;
    async fn delete(&self, user: UserId, id: MedicationId) -> Result<bool>;
    async fn duplicate(&self, user: UserId, id: MedicationId) -> Result<Option<Medication>>;
    async fn day_view(&self, user: UserId, date: NaiveDate) -> Result<Vec<MedicationView>>;
    async fn schedule(&self, user: UserId, date: NaiveDate, show_completed: bool, sort_by: SortBy) -> Result<Vec<ScheduleEntry>>;
    async fn logs_for_day(&self, user: UserId, date: NaiveDate) -> Result<Vec<MedicationLog>>;
    async fn mark_taken(&self, user: UserId, id: MedicationId, marked_by: Option<String>) -> Result<MarkOutcome>;
    async fn unmark(&self, user: UserId, id: MedicationId, date: NaiveDate) -> Result<bool>;
    fn subscribe(&self) -> broadcast::Receiver<ChangeSignal>;
}

#[derive(Clone)]
pub struct MedicationServiceImpl<R: MedicationRepository> {
    repo: R,
    feed: ChangeFeed,
}

impl<R: MedicationRepository> MedicationServiceImpl<R> {
    pub fn new(repo: R, feed: ChangeFeed) -> Self { Self { repo, feed } }

    pub fn repository(&self) -> &R { &self.repo }
}

fn required(field: &str, value: String) -> Result<String, MedicationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(MedicationError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn resolve(request: Option<&DurationRequest>, now: &DateTime<Local>) -> Result<Option<TreatmentCourse>, MedicationError> {
    let input = match request {
        Some(request) => request.parse()?,
        None => None,
    };
    Ok(resolve_duration(input, now))
}

#[async_trait]
impl<R: MedicationRepository> MedicationService for MedicationServiceImpl<R> {
    async fn check_setup(&self) -> Result<bool> {
        self.repo.check_setup().await
    }

    async fn create(&self, user: UserId, input: NewMedication) -> Result<Medication> {
        let name = required("name", input.name)?;
        let time = required("time", input.time)?;
        validate_dose_time(&time)?;
        let now = Local::now();
        let course = resolve(input.duration.as_ref(), &now)?;

        let created_at = now.with_timezone(&Utc);
        let medication = Medication {
            id: MedicationId::default(),
            user_id: user,
            name,
            person_name: optional(input.person_name),
            time,
            dosage: optional(input.dosage),
            notes: optional(input.notes),
            course,
            created_at,
            updated_at: created_at,
        };
        self.repo.insert_medication(&medication).await?;
        tracing::info!(user_id = %user.0, medication_id = %medication.id.0, "medication created");
        self.feed.publish(user, ChangedTable::Medications);
        Ok(medication)
    }

    async fn get(&self, user: UserId, id: MedicationId) -> Result<Option<Medication>> {
        self.repo.get_medication(user, id).await
    }

    async fn list(&self, user: UserId) -> Result<Vec<Medication>> {
        self.repo.list_medications(user).await
    }

    async fn update(&self, user: UserId, id: MedicationId, patch: MedicationPatch) -> Result<Option<Medication>> {
        let Some(mut medication) = self.repo.get_medication(user, id).await? else { return Ok(None) };
        let now = Local::now();

        if let Some(name) = patch.name { medication.name = required("name", name)?; }
        if let Some(time) = patch.time {
            let time = required("time", time)?;
            validate_dose_time(&time)?;
            medication.time = time;
        }
        if let Some(dosage) = patch.dosage { medication.dosage = optional(Some(dosage)); }
        if let Some(person) = patch.person_name { medication.person_name = optional(Some(person)); }
        if let Some(notes) = patch.notes { medication.notes = optional(Some(notes)); }

        if patch.clear_duration {
            medication.course = None;
        } else if let Some(course) = resolve(patch.duration.as_ref(), &now)? {
            medication.course = Some(course);
        }
        medication.updated_at = now.with_timezone(&Utc);

        if !self.repo.update_medication(&medication).await? {
            return Ok(None);
        }
        tracing::info!(user_id = %user.0, medication_id = %id.0, "medication updated");
        self.feed.publish(user, ChangedTable::Medications);
        Ok(Some(medication))
    }

    async fn delete(&self, user: UserId, id: MedicationId) -> Result<bool> {
        let deleted = self.repo.delete_medication(user, id).await?;
        if deleted {
            tracing::info!(user_id = %user.0, medication_id = %id.0, "medication deleted");
            self.feed.publish(user, ChangedTable::Medications);
        }
        Ok(deleted)
    }

    async fn duplicate(&self, user: UserId, id: MedicationId) -> Result<Option<Medication>> {
        let Some(source) = self.repo.get_medication(user, id).await? else { return Ok(None) };
        let now = Local::now();
        let created_at = now.with_timezone(&Utc);
        let copy = Medication {
            id: MedicationId::default(),
            name: format!("{} (Copy)", source.name),
            course: copied_course(source.course, &now),
            created_at,
            updated_at: created_at,
            ..source
        };
        self.repo.insert_medication(&copy).await?;
        tracing::info!(user_id = %user.0, source_id = %id.0, medication_id = %copy.id.0, "medication duplicated");
        self.feed.publish(user, ChangedTable::Medications);
        Ok(Some(copy))
    }

    async fn day_view(&self, user: UserId, date: NaiveDate) -> Result<Vec<MedicationView>> {
        let medications = self.repo.list_medications(user).await?;
        let logs = self.logs_for_day(user, date).await?;
        Ok(reconcile_all(medications, &logs))
    }

    async fn schedule(&self, user: UserId, date: NaiveDate, show_completed: bool, sort_by: SortBy) -> Result<Vec<ScheduleEntry>> {
        let views = self.day_view(user, date).await?;
        let now = Utc::now();
        Ok(project_schedule(&views, date, show_completed, sort_by, &Local)
            .into_iter()
            .map(|view| ScheduleEntry { progress: compute_progress(&view.medication, now), medication: view })
            .collect())
    }

    async fn logs_for_day(&self, user: UserId, date: NaiveDate) -> Result<Vec<MedicationLog>> {
        let (from, to) = day_window(date, &Local);
        self.repo.logs_between(user, from, to).await
    }

    async fn mark_taken(&self, user: UserId, id: MedicationId, marked_by: Option<String>) -> Result<MarkOutcome> {
        let medication = self.repo.get_medication(user, id).await?.ok_or(MedicationError::NotFound)?;
        let taken_at = Utc::now();
        let taken_day = local_day(&taken_at, &Local);

        let existing = self.repo.find_log(user, id, taken_day).await?;
        if TakenState::of(existing.as_ref()).mark() == Transition::Noop {
            if let Some(log) = existing {
                tracing::debug!(user_id = %user.0, medication_id = %id.0, "already taken today");
                return Ok(MarkOutcome::AlreadyTaken(log));
            }
        }

        // Unnamed marks are credited to the person the medication is for.
        let marked_by = optional(marked_by).or(medication.person_name);
        let log = MedicationLog {
            id: LogId::default(),
            medication_id: id,
            user_id: user,
            taken_at,
            taken_day,
            scheduled_time: medication.time,
            marked_by,
        };
        if self.repo.insert_log(&log).await? {
            tracing::info!(user_id = %user.0, medication_id = %id.0, day = %taken_day, "marked taken");
            self.feed.publish(user, ChangedTable::Logs);
            return Ok(MarkOutcome::Created(log));
        }

        // Lost a race with another device; the stored log wins.
        match self.repo.find_log(user, id, taken_day).await? {
            Some(stored) => Ok(MarkOutcome::AlreadyTaken(stored)),
            None => Ok(MarkOutcome::AlreadyTaken(log)),
        }
    }

    async fn unmark(&self, user: UserId, id: MedicationId, date: NaiveDate) -> Result<bool> {
        let existing = self.repo.find_log(user, id, date).await?;
        match TakenState::of(existing.as_ref()).unmark() {
            Transition::DeleteLog => {
                let removed = self.repo.delete_log(user, id, date).await?;
                if removed {
                    tracing::info!(user_id = %user.0, medication_id = %id.0, day = %date, "unmarked");
                    self.feed.publish(user, ChangedTable::Logs);
                }
                Ok(removed)
            }
            Transition::Noop | Transition::CreateLog => {
                tracing::debug!(user_id = %user.0, medication_id = %id.0, day = %date, "nothing to unmark");
                Ok(false)
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeSignal> {
        self.feed.subscribe()
    }
}
