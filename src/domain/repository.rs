use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::medication::{Medication, MedicationId, MedicationLog, User, UserId};

/// Storage for accounts, medications and their logs. Every medication and log
/// call is scoped to one user; rows of other users are invisible.
#[async_trait]
pub trait MedicationRepository: Send + Sync + 'static {
    async fn init(&self) -> anyhow::Result<()>;
    /// Whether both medication tables exist.
    async fn check_setup(&self) -> anyhow::Result<bool>;

    /// Fails with `MedicationError::Conflict` when the email is taken.
    async fn create_user(&self, user: &User) -> anyhow::Result<()>;
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_user_by_token(&self, token: &str) -> anyhow::Result<Option<User>>;

    async fn insert_medication(&self, medication: &Medication) -> anyhow::Result<()>;
    async fn get_medication(&self, user: UserId, id: MedicationId) -> anyhow::Result<Option<Medication>>;
    /// Ordered by dose time.
    async fn list_medications(&self, user: UserId) -> anyhow::Result<Vec<Medication>>;
    /// Last writer wins. Returns false when the row no longer exists.
    async fn update_medication(&self, medication: &Medication) -> anyhow::Result<bool>;
    /// Removes the medication together with all of its logs.
    async fn delete_medication(&self, user: UserId, id: MedicationId) -> anyhow::Result<bool>;

    /// Logs whose `taken_at` lies in `[from, to)`.
    async fn logs_between(&self, user: UserId, from: DateTime<Utc>, to: DateTime<Utc>) -> anyhow::Result<Vec<MedicationLog>>;
    async fn find_log(&self, user: UserId, medication: MedicationId, day: NaiveDate) -> anyhow::Result<Option<MedicationLog>>;
    /// Returns false, writing nothing, when a log for the same (medication, day) exists.
    async fn insert_log(&self, log: &MedicationLog) -> anyhow::Result<bool>;
    async fn delete_log(&self, user: UserId, medication: MedicationId, day: NaiveDate) -> anyhow::Result<bool>;
}
