use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, SecondsFormat, Utc};
use sqlx::{sqlite::{SqlitePoolOptions, SqliteRow}, Pool, Row, Sqlite};
use uuid::Uuid;

use crate::domain::{
    errors::MedicationError,
    medication::{LogId, Medication, MedicationId, MedicationLog, TreatmentCourse, User, UserId},
    repository::MedicationRepository,
    schedule::duration::course_from_dates,
};

const MEDICATION_COLUMNS: &str = "id, user_id, name, person_name, dosage, time, duration_days, start_date, end_date, notes, created_at, updated_at";
const LOG_COLUMNS: &str = "id, medication_id, user_id, taken_at, taken_day, scheduled_time, marked_by";

#[derive(Clone)]
pub struct SqliteMedicationRepository {
    pool: Arc<Pool<Sqlite>>,
}

impl SqliteMedicationRepository {
    pub async fn connect(database_url: &str) -> Result<Self> {
        // Every connection to an in-memory database is a separate database.
        let options = if database_url.starts_with("sqlite::memory:") {
            SqlitePoolOptions::new().max_connections(1).min_connections(1).idle_timeout(None).max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = options
            .connect(database_url)
            .await
            .with_context(|| format!("connecting to {database_url}"))?;
        Ok(Self { pool: Arc::new(pool) })
    }
}

#[async_trait]
impl MedicationRepository for SqliteMedicationRepository {
    async fn init(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                token TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS medications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                person_name TEXT,
                dosage TEXT,
                time TEXT NOT NULL,
                duration_days INTEGER,
                start_date TEXT,
                end_date TEXT,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS medication_logs (
                id TEXT PRIMARY KEY,
                medication_id TEXT NOT NULL REFERENCES medications(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                taken_at TEXT NOT NULL,
                taken_day TEXT NOT NULL,
                scheduled_time TEXT NOT NULL,
                marked_by TEXT,
                created_at TEXT NOT NULL
            )",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_medication_logs_once_per_day ON medication_logs(medication_id, taken_day)",
            "CREATE INDEX IF NOT EXISTS idx_medications_user_id ON medications(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_medications_time ON medications(time)",
            "CREATE INDEX IF NOT EXISTS idx_medication_logs_user_id ON medication_logs(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_medication_logs_taken_at ON medication_logs(taken_at)",
        ];
        let mut tx = self.pool.begin().await?;
        for statement in statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn check_setup(&self) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name IN ('medications', 'medication_logs')",
        )
        .fetch_one(&*self.pool)
        .await?;
        let found: i64 = row.try_get("n")?;
        Ok(found == 2)
    }

    async fn create_user(&self, user: &User) -> Result<()> {
        let result = sqlx::query("INSERT INTO users (id, email, name, token, created_at) VALUES (?1, ?2, ?3, ?4, ?5)")
            .bind(user.id.0.to_string())
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.token)
            .bind(timestamp(&Utc::now()))
            .execute(&*self.pool)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(MedicationError::Conflict(format!("account {} already exists", user.email)).into())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, email, name, token FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(&*self.pool)
            .await?;
        row.map(row_to_user).transpose()
    }

    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, email, name, token FROM users WHERE token = ?1")
            .bind(token)
            .fetch_optional(&*self.pool)
            .await?;
        row.map(row_to_user).transpose()
    }

    async fn insert_medication(&self, medication: &Medication) -> Result<()> {
        let course = medication.course;
        sqlx::query(
            "INSERT INTO medications (id, user_id, name, person_name, dosage, time, duration_days, start_date, end_date, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(medication.id.0.to_string())
        .bind(medication.user_id.0.to_string())
        .bind(&medication.name)
        .bind(&medication.person_name)
        .bind(&medication.dosage)
        .bind(&medication.time)
        .bind(course.map(|c| i64::from(c.days_needed)))
        .bind(course.map(|c| timestamp(&c.start_date)))
        .bind(course.map(|c| timestamp(&c.end_date)))
        .bind(&medication.notes)
        .bind(timestamp(&medication.created_at))
        .bind(timestamp(&medication.updated_at))
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn get_medication(&self, user: UserId, id: MedicationId) -> Result<Option<Medication>> {
        let row = sqlx::query(&format!("SELECT {MEDICATION_COLUMNS} FROM medications WHERE id = ?1 AND user_id = ?2"))
            .bind(id.0.to_string())
            .bind(user.0.to_string())
            .fetch_optional(&*self.pool)
            .await?;
        row.map(row_to_medication).transpose()
    }

    async fn list_medications(&self, user: UserId) -> Result<Vec<Medication>> {
        let rows = sqlx::query(&format!("SELECT {MEDICATION_COLUMNS} FROM medications WHERE user_id = ?1 ORDER BY time ASC, created_at ASC"))
            .bind(user.0.to_string())
            .fetch_all(&*self.pool)
            .await?;
        rows.into_iter().map(row_to_medication).collect()
    }

    async fn update_medication(&self, medication: &Medication) -> Result<bool> {
        let course = medication.course;
        let result = sqlx::query(
            "UPDATE medications SET name = ?3, person_name = ?4, dosage = ?5, time = ?6, duration_days = ?7,
                start_date = ?8, end_date = ?9, notes = ?10, updated_at = ?11
             WHERE id = ?1 AND user_id = ?2",
        )
        .bind(medication.id.0.to_string())
        .bind(medication.user_id.0.to_string())
        .bind(&medication.name)
        .bind(&medication.person_name)
        .bind(&medication.dosage)
        .bind(&medication.time)
        .bind(course.map(|c| i64::from(c.days_needed)))
        .bind(course.map(|c| timestamp(&c.start_date)))
        .bind(course.map(|c| timestamp(&c.end_date)))
        .bind(&medication.notes)
        .bind(timestamp(&medication.updated_at))
        .execute(&*self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_medication(&self, user: UserId, id: MedicationId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM medication_logs WHERE medication_id = ?1 AND user_id = ?2")
            .bind(id.0.to_string())
            .bind(user.0.to_string())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM medications WHERE id = ?1 AND user_id = ?2")
            .bind(id.0.to_string())
            .bind(user.0.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn logs_between(&self, user: UserId, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<MedicationLog>> {
        let rows = sqlx::query(&format!(
            "SELECT {LOG_COLUMNS} FROM medication_logs WHERE user_id = ?1 AND taken_at >= ?2 AND taken_at < ?3 ORDER BY taken_at ASC"
        ))
        .bind(user.0.to_string())
        .bind(timestamp(&from))
        .bind(timestamp(&to))
        .fetch_all(&*self.pool)
        .await?;
        rows.into_iter().map(row_to_log).collect()
    }

    async fn find_log(&self, user: UserId, medication: MedicationId, day: NaiveDate) -> Result<Option<MedicationLog>> {
        let row = sqlx::query(&format!(
            "SELECT {LOG_COLUMNS} FROM medication_logs WHERE user_id = ?1 AND medication_id = ?2 AND taken_day = ?3"
        ))
        .bind(user.0.to_string())
        .bind(medication.0.to_string())
        .bind(day.to_string())
        .fetch_optional(&*self.pool)
        .await?;
        row.map(row_to_log).transpose()
    }

    async fn insert_log(&self, log: &MedicationLog) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO medication_logs (id, medication_id, user_id, taken_at, taken_day, scheduled_time, marked_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (medication_id, taken_day) DO NOTHING",
        )
        .bind(log.id.0.to_string())
        .bind(log.medication_id.0.to_string())
        .bind(log.user_id.0.to_string())
        .bind(timestamp(&log.taken_at))
        .bind(log.taken_day.to_string())
        .bind(&log.scheduled_time)
        .bind(&log.marked_by)
        .bind(timestamp(&Utc::now()))
        .execute(&*self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_log(&self, user: UserId, medication: MedicationId, day: NaiveDate) -> Result<bool> {
        let result = sqlx::query("DELETE FROM medication_logs WHERE user_id = ?1 AND medication_id = ?2 AND taken_day = ?3")
            .bind(user.0.to_string())
            .bind(medication.0.to_string())
            .bind(day.to_string())
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Makes sure a file-backed database URL points at an openable file.
/// In-memory URLs are left alone.
pub fn prepare_sqlite_file(database_url: &str) -> Result<()> {
    let Some(rest) = database_url.strip_prefix("sqlite://") else { return Ok(()) };
    let raw = rest.split('?').next().unwrap_or(rest);
    // `sqlite:///C:/data/med.db` names a drive path on Windows.
    let raw = match raw.as_bytes() {
        [b'/', _, b':', ..] if cfg!(windows) => &raw[1..],
        _ => raw,
    };
    if raw.is_empty() { return Ok(()); }

    let path = Path::new(raw);
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    Ok(())
}

// Fixed-width UTC text keeps lexicographic order equal to time order.
fn timestamp(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("bad timestamp {raw:?}"))?
        .with_timezone(&Utc))
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("bad id {raw:?}"))
}

fn row_to_user(row: SqliteRow) -> Result<User> {
    let id: String = row.try_get("id")?;
    Ok(User {
        id: UserId(parse_uuid(&id)?),
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        token: row.try_get("token")?,
    })
}

fn row_to_medication(row: SqliteRow) -> Result<Medication> {
    let id: String = row.try_get("id")?;
    let user_id: String = row.try_get("user_id")?;
    let duration_days: Option<i64> = row.try_get("duration_days")?;
    let start_date: Option<String> = row.try_get("start_date")?;
    let end_date: Option<String> = row.try_get("end_date")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    let course = match (start_date, end_date) {
        (Some(start), Some(end)) => {
            let start_date = parse_timestamp(&start)?;
            let end_date = parse_timestamp(&end)?;
            match duration_days.and_then(|d| u32::try_from(d).ok()).filter(|d| *d > 0) {
                Some(days_needed) => Some(TreatmentCourse { days_needed, start_date, end_date }),
                // Rows written without a day count get one derived from the range.
                None => Some(course_from_dates(start_date, end_date, &Local)),
            }
        }
        (None, None) => None,
        _ => {
            tracing::warn!(medication_id = %id, "ignoring half-specified treatment course");
            None
        }
    };

    Ok(Medication {
        id: MedicationId(parse_uuid(&id)?),
        user_id: UserId(parse_uuid(&user_id)?),
        name: row.try_get("name")?,
        person_name: row.try_get("person_name")?,
        time: row.try_get("time")?,
        dosage: row.try_get("dosage")?,
        notes: row.try_get("notes")?,
        course,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn row_to_log(row: SqliteRow) -> Result<MedicationLog> {
    let id: String = row.try_get("id")?;
    let medication_id: String = row.try_get("medication_id")?;
    let user_id: String = row.try_get("user_id")?;
    let taken_at: String = row.try_get("taken_at")?;
    let taken_day: String = row.try_get("taken_day")?;

    Ok(MedicationLog {
        id: LogId(parse_uuid(&id)?),
        medication_id: MedicationId(parse_uuid(&medication_id)?),
        user_id: UserId(parse_uuid(&user_id)?),
        taken_at: parse_timestamp(&taken_at)?,
        taken_day: NaiveDate::parse_from_str(&taken_day, "%Y-%m-%d").with_context(|| format!("bad day {taken_day:?}"))?,
        scheduled_time: row.try_get("scheduled_time")?,
        marked_by: row.try_get("marked_by")?,
    })
}
