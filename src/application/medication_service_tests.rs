use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveDate, Utc};

use super::change_feed::{ChangeFeed, ChangedTable};
use super::medication_service::{MarkOutcome, MedicationService, MedicationServiceImpl};
use crate::domain::{
    errors::MedicationError,
    medication::{LogId, Medication, MedicationId, MedicationLog, MedicationPatch, NewMedication, TreatmentCourse, User, UserId},
    repository::MedicationRepository,
    schedule::{duration::DurationRequest, projector::SortBy, start_of_day},
};

#[derive(Clone, Default)]
struct InMemoryRepo {
    users: Arc<Mutex<Vec<User>>>,
    medications: Arc<Mutex<HashMap<MedicationId, Medication>>>,
    logs: Arc<Mutex<Vec<MedicationLog>>>,
    // find_log calls that report no log, as if another device had not written yet
    stale_finds: Arc<Mutex<usize>>,
}

impl InMemoryRepo {
    fn log_count(&self) -> usize { self.logs.lock().unwrap().len() }

    fn go_stale(&self, finds: usize) { *self.stale_finds.lock().unwrap() = finds; }
}

#[async_trait]
impl MedicationRepository for InMemoryRepo {
    async fn init(&self) -> Result<()> { Ok(()) }
    async fn check_setup(&self) -> Result<bool> { Ok(true) }
    async fn create_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == user.email) {
            return Err(MedicationError::Conflict(user.email.clone()).into());
        }
        users.push(user.clone());
        Ok(())
    }
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.email == email).cloned())
    }
    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.token == token).cloned())
    }
    async fn insert_medication(&self, medication: &Medication) -> Result<()> {
        self.medications.lock().unwrap().insert(medication.id, medication.clone());
        Ok(())
    }
    async fn get_medication(&self, user: UserId, id: MedicationId) -> Result<Option<Medication>> {
        Ok(self.medications.lock().unwrap().get(&id).filter(|m| m.user_id == user).cloned())
    }
    async fn list_medications(&self, user: UserId) -> Result<Vec<Medication>> {
        let mut meds: Vec<_> = self.medications.lock().unwrap().values().filter(|m| m.user_id == user).cloned().collect();
        meds.sort_by(|a, b| a.time.cmp(&b.time));
        Ok(meds)
    }
    async fn update_medication(&self, medication: &Medication) -> Result<bool> {
        let mut map = self.medications.lock().unwrap();
        match map.get_mut(&medication.id) {
            Some(existing) if existing.user_id == medication.user_id => { *existing = medication.clone(); Ok(true) }
            _ => Ok(false),
        }
    }
    async fn delete_medication(&self, user: UserId, id: MedicationId) -> Result<bool> {
        self.logs.lock().unwrap().retain(|l| !(l.medication_id == id && l.user_id == user));
        let mut map = self.medications.lock().unwrap();
        if map.get(&id).is_some_and(|m| m.user_id == user) {
            map.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }
    async fn logs_between(&self, user: UserId, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<MedicationLog>> {
        Ok(self.logs.lock().unwrap().iter().filter(|l| l.user_id == user && l.taken_at >= from && l.taken_at < to).cloned().collect())
    }
    async fn find_log(&self, user: UserId, medication: MedicationId, day: NaiveDate) -> Result<Option<MedicationLog>> {
        let mut stale = self.stale_finds.lock().unwrap();
        if *stale > 0 {
            *stale -= 1;
            return Ok(None);
        }
        Ok(self.logs.lock().unwrap().iter().find(|l| l.user_id == user && l.medication_id == medication && l.taken_day == day).cloned())
    }
    async fn insert_log(&self, log: &MedicationLog) -> Result<bool> {
        let mut logs = self.logs.lock().unwrap();
        if logs.iter().any(|l| l.medication_id == log.medication_id && l.taken_day == log.taken_day) {
            return Ok(false);
        }
        logs.push(log.clone());
        Ok(true)
    }
    async fn delete_log(&self, user: UserId, medication: MedicationId, day: NaiveDate) -> Result<bool> {
        let mut logs = self.logs.lock().unwrap();
        let before = logs.len();
        logs.retain(|l| !(l.user_id == user && l.medication_id == medication && l.taken_day == day));
        Ok(logs.len() < before)
    }
}

fn service() -> (MedicationServiceImpl<InMemoryRepo>, InMemoryRepo) {
    let repo = InMemoryRepo::default();
    (MedicationServiceImpl::new(repo.clone(), ChangeFeed::default()), repo)
}

fn new_med(name: &str, time: &str) -> NewMedication {
    NewMedication { name: name.into(), time: time.into(), dosage: None, person_name: None, notes: None, duration: None }
}

fn today() -> NaiveDate { Local::now().date_naive() }

#[tokio::test]
async fn create_requires_name_and_time() {
    let (service, _) = service();
    let user = UserId::default();

    let err = service.create(user, new_med("  ", "08:00")).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<MedicationError>(), Some(MedicationError::Validation(_))));

    let err = service.create(user, new_med("Aspirin", "8am")).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<MedicationError>(), Some(MedicationError::Validation(_))));
}

#[tokio::test]
async fn create_with_day_count_starts_today() {
    let (service, _) = service();
    let mut input = new_med("Amoxicillin", "08:00");
    input.duration = Some(DurationRequest::Days { days: Some(7) });

    let med = service.create(UserId::default(), input).await.unwrap();
    let course = med.course.unwrap();
    assert_eq!(course.days_needed, 7);
    assert_eq!(course.start_date, start_of_day(today(), &Local));
}

#[tokio::test]
async fn bad_range_date_is_reported() {
    let (service, _) = service();
    let mut input = new_med("Amoxicillin", "08:00");
    input.duration = Some(DurationRequest::Range { start: Some("soon".into()), end: Some("2024-01-01".into()) });

    let err = service.create(UserId::default(), input).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<MedicationError>(), Some(MedicationError::InvalidDate(_))));
}

#[tokio::test]
async fn marking_twice_keeps_one_log() {
    let (service, repo) = service();
    let user = UserId::default();
    let med = service.create(user, new_med("Vitamin D", "09:00")).await.unwrap();

    let first = service.mark_taken(user, med.id, Some("Mum".into())).await.unwrap();
    let second = service.mark_taken(user, med.id, Some("Dad".into())).await.unwrap();

    assert!(matches!(first, MarkOutcome::Created(_)));
    assert!(matches!(second, MarkOutcome::AlreadyTaken(_)));
    assert_eq!(second.log().marked_by.as_deref(), Some("Mum"));
    assert_eq!(repo.log_count(), 1);
    assert_eq!(first.log().scheduled_time, "09:00");
}

#[tokio::test]
async fn losing_the_insert_race_returns_the_stored_log() {
    let (service, repo) = service();
    let user = UserId::default();
    let med = service.create(user, new_med("Vitamin D", "09:00")).await.unwrap();

    let taken_at = Utc::now();
    let other_device = MedicationLog {
        id: LogId::default(),
        medication_id: med.id,
        user_id: user,
        taken_at,
        taken_day: taken_at.with_timezone(&Local).date_naive(),
        scheduled_time: med.time.clone(),
        marked_by: Some("Mum".into()),
    };
    assert!(repo.insert_log(&other_device).await.unwrap());
    repo.go_stale(1);

    let outcome = service.mark_taken(user, med.id, Some("Dad".into())).await.unwrap();
    assert_eq!(outcome, MarkOutcome::AlreadyTaken(other_device));
    assert_eq!(repo.log_count(), 1);
}

#[tokio::test]
async fn unmarking_twice_is_safe() {
    let (service, repo) = service();
    let user = UserId::default();
    let med = service.create(user, new_med("Vitamin D", "09:00")).await.unwrap();
    service.mark_taken(user, med.id, None).await.unwrap();
    let day = Local::now().date_naive();

    assert!(service.unmark(user, med.id, day).await.unwrap());
    assert!(!service.unmark(user, med.id, day).await.unwrap());
    assert_eq!(repo.log_count(), 0);
}

#[tokio::test]
async fn marking_unknown_medication_is_not_found() {
    let (service, _) = service();
    let err = service.mark_taken(UserId::default(), MedicationId::default(), None).await.unwrap_err();
    assert_eq!(err.downcast_ref::<MedicationError>(), Some(&MedicationError::NotFound));
}

#[tokio::test]
async fn day_view_reflects_taken_state() {
    let (service, _) = service();
    let user = UserId::default();
    let taken = service.create(user, new_med("Iron", "08:00")).await.unwrap();
    service.create(user, new_med("Zinc", "12:00")).await.unwrap();
    service.mark_taken(user, taken.id, Some("Sam".into())).await.unwrap();

    let views = service.day_view(user, today()).await.unwrap();
    assert_eq!(views.len(), 2);
    let iron = views.iter().find(|v| v.medication.id == taken.id).unwrap();
    assert!(iron.taken);
    assert_eq!(iron.marked_by.as_deref(), Some("Sam"));
    assert!(views.iter().filter(|v| v.medication.id != taken.id).all(|v| !v.taken));

    // A different day has no logs.
    let tomorrow = today().succ_opt().unwrap();
    assert!(service.day_view(user, tomorrow).await.unwrap().iter().all(|v| !v.taken));
}

#[tokio::test]
async fn schedule_hides_completed_and_attaches_progress() {
    let (service, _) = service();
    let user = UserId::default();
    let mut course = new_med("Antibiotic", "07:00");
    course.duration = Some(DurationRequest::Days { days: Some(5) });
    let antibiotic = service.create(user, course).await.unwrap();
    let done = service.create(user, new_med("Aspirin", "06:00")).await.unwrap();
    service.mark_taken(user, done.id, None).await.unwrap();

    let all = service.schedule(user, today(), true, SortBy::Time).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].medication.medication.id, done.id);

    let pending = service.schedule(user, today(), false, SortBy::Time).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].medication.medication.id, antibiotic.id);
    let progress = pending[0].progress.unwrap();
    assert_eq!(progress.days_needed, 5);
    assert!(!progress.is_complete);

    // Outside the course window nothing but the ongoing medication shows.
    let later = today() + Duration::days(30);
    let later_items = service.schedule(user, later, true, SortBy::Name).await.unwrap();
    assert_eq!(later_items.len(), 1);
    assert_eq!(later_items[0].medication.medication.id, done.id);
}

#[tokio::test]
async fn delete_cascades_logs() {
    let (service, repo) = service();
    let user = UserId::default();
    let med = service.create(user, new_med("Iron", "08:00")).await.unwrap();
    service.mark_taken(user, med.id, None).await.unwrap();

    assert!(service.delete(user, med.id).await.unwrap());
    assert_eq!(repo.log_count(), 0);
    assert!(!service.delete(user, med.id).await.unwrap());
}

#[tokio::test]
async fn users_cannot_see_each_other() {
    let (service, _) = service();
    let alice = UserId::default();
    let bob = UserId::default();
    let med = service.create(alice, new_med("Iron", "08:00")).await.unwrap();

    assert!(service.get(bob, med.id).await.unwrap().is_none());
    assert!(service.list(bob).await.unwrap().is_empty());
    assert!(service.update(bob, med.id, MedicationPatch { name: Some("X".into()), ..Default::default() }).await.unwrap().is_none());
    assert!(!service.delete(bob, med.id).await.unwrap());
    assert!(service.mark_taken(bob, med.id, None).await.is_err());
}

#[tokio::test]
async fn editing_in_days_mode_restarts_course_today() {
    let (service, repo) = service();
    let user = UserId::default();
    let med = service.create(user, new_med("Prednisone", "08:00")).await.unwrap();

    // Pretend the course was set up ten days ago.
    let old_start = start_of_day(today() - Duration::days(10), &Local);
    let mut stored = med.clone();
    stored.course = Some(TreatmentCourse { days_needed: 14, start_date: old_start, end_date: old_start + Duration::days(14) });
    repo.update_medication(&stored).await.unwrap();

    let patch = MedicationPatch { duration: Some(DurationRequest::Days { days: Some(14) }), ..Default::default() };
    let updated = service.update(user, med.id, patch).await.unwrap().unwrap();
    assert_eq!(updated.course.unwrap().start_date, start_of_day(today(), &Local));
}

#[tokio::test]
async fn update_keeps_or_clears_course() {
    let (service, _) = service();
    let user = UserId::default();
    let mut input = new_med("Prednisone", "08:00");
    input.duration = Some(DurationRequest::Range { start: Some("2024-01-01".into()), end: Some("2024-01-10".into()) });
    let med = service.create(user, input).await.unwrap();
    assert_eq!(med.course.unwrap().days_needed, 10);

    let renamed = service
        .update(user, med.id, MedicationPatch { name: Some("Prednisolone".into()), dosage: Some("5mg".into()), ..Default::default() })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(renamed.name, "Prednisolone");
    assert_eq!(renamed.course, med.course);

    let cleared = service.update(user, med.id, MedicationPatch { clear_duration: true, ..Default::default() }).await.unwrap().unwrap();
    assert_eq!(cleared.course, None);
}

#[tokio::test]
async fn writes_publish_change_signals() {
    let (service, _) = service();
    let mut rx = service.subscribe();
    let user = UserId::default();
    let med = service.create(user, new_med("Iron", "08:00")).await.unwrap();
    service.mark_taken(user, med.id, None).await.unwrap();

    assert_eq!(rx.recv().await.unwrap().table, ChangedTable::Medications);
    let signal = rx.recv().await.unwrap();
    assert_eq!(signal.table, ChangedTable::Logs);
    assert_eq!(signal.user_id, user);
}

#[tokio::test]
async fn duplicate_restarts_counted_course_today() {
    let (service, repo) = service();
    let user = UserId::default();
    let mut input = new_med("Amoxicillin", "08:00");
    input.dosage = Some("500mg".into());
    input.person_name = Some("Sam".into());
    let med = service.create(user, input).await.unwrap();

    let old_start = start_of_day(today() - Duration::days(20), &Local);
    let mut stored = med.clone();
    stored.course = Some(TreatmentCourse { days_needed: 7, start_date: old_start, end_date: old_start + Duration::days(7) });
    repo.update_medication(&stored).await.unwrap();

    let copy = service.duplicate(user, med.id).await.unwrap().unwrap();
    assert_ne!(copy.id, med.id);
    assert_eq!(copy.name, "Amoxicillin (Copy)");
    assert_eq!(copy.time, "08:00");
    assert_eq!(copy.dosage.as_deref(), Some("500mg"));
    assert_eq!(copy.person_name.as_deref(), Some("Sam"));
    let course = copy.course.unwrap();
    assert_eq!(course.days_needed, 7);
    assert_eq!(course.start_date, start_of_day(today(), &Local));
    assert_eq!(service.list(user).await.unwrap().len(), 2);
}

#[tokio::test]
async fn duplicate_keeps_a_bare_range() {
    let (service, repo) = service();
    let user = UserId::default();
    let med = service.create(user, new_med("Iron", "08:00")).await.unwrap();

    let start = start_of_day(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), &Local);
    let range = TreatmentCourse { days_needed: 0, start_date: start, end_date: start + Duration::days(9) };
    let mut stored = med.clone();
    stored.course = Some(range);
    repo.update_medication(&stored).await.unwrap();

    let copy = service.duplicate(user, med.id).await.unwrap().unwrap();
    assert_eq!(copy.course, Some(range));
}

#[tokio::test]
async fn duplicate_is_scoped_to_the_owner() {
    let (service, _) = service();
    let alice = UserId::default();
    let med = service.create(alice, new_med("Iron", "08:00")).await.unwrap();
    let mut rx = service.subscribe();

    assert!(service.duplicate(UserId::default(), med.id).await.unwrap().is_none());
    assert!(service.duplicate(alice, MedicationId::default()).await.unwrap().is_none());

    service.duplicate(alice, med.id).await.unwrap().unwrap();
    assert_eq!(rx.recv().await.unwrap().table, ChangedTable::Medications);
}

#[tokio::test]
async fn unnamed_marks_credit_the_patient() {
    let (service, _) = service();
    let user = UserId::default();
    let mut input = new_med("Iron", "08:00");
    input.person_name = Some("Grandpa".into());
    let med = service.create(user, input).await.unwrap();

    let outcome = service.mark_taken(user, med.id, Some("  ".into())).await.unwrap();
    assert_eq!(outcome.log().marked_by.as_deref(), Some("Grandpa"));
}
