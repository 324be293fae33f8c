use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    Attendance, AttendanceUpdate, CheckInNote, CheckInNoteUpdate, Mentee, MenteeAttendance,
    MenteeFilter, MenteeStatus, MenteeUpdate, NewAttendance, NewCheckInNote, NewMentee, Priority,
    WeeklyAttendanceReport, WeeklyTally,
};
use crate::store::{AttendanceStore, CheckInNoteStore, MenteeStore, ReportStore};

const MENTEE_COLUMNS: &str = "id, external_id, name, email, phone, poc, cohort_batch, status, \
     priority, last_attendance, created_at";
const ATTENDANCE_COLUMNS: &str = "id, mentee_id, session_date, session_type, is_present, created_at";
const NOTE_COLUMNS: &str = "id, mentee_id, note, author, created_at";
const REPORT_COLUMNS: &str = "id, iso_year, week_number, cohort_batch, total_mentees, \
     total_present, total_absent, updated_at";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool, cohort_batch: &str) -> anyhow::Result<()> {
    let mentees = vec![
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "10231",
            "Avery Lee",
            "avery.lee@example.com",
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "10232",
            "Jules Moreno",
            "jules.moreno@example.com",
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            "10233",
            "Kiara Patel",
            "kiara.patel@example.com",
        ),
    ];

    for (id, external_id, name, email) in mentees {
        sqlx::query(
            r#"
            INSERT INTO mentee_tracker.mentees (id, external_id, name, email, cohort_batch, status)
            VALUES ($1, $2, $3, $4, $5, 'active')
            ON CONFLICT (external_id) DO UPDATE
            SET name = EXCLUDED.name, email = EXCLUDED.email, cohort_batch = EXCLUDED.cohort_batch
            "#,
        )
        .bind(id)
        .bind(external_id)
        .bind(name)
        .bind(email)
        .bind(cohort_batch)
        .execute(pool)
        .await?;
    }

    let sessions = vec![
        ("10231", NaiveDate::from_ymd_opt(2025, 11, 7).context("invalid date")?, true),
        ("10231", NaiveDate::from_ymd_opt(2025, 11, 8).context("invalid date")?, false),
        ("10232", NaiveDate::from_ymd_opt(2025, 11, 7).context("invalid date")?, false),
        ("10233", NaiveDate::from_ymd_opt(2025, 11, 8).context("invalid date")?, true),
    ];

    for (external_id, session_date, is_present) in sessions {
        let mentee_id: Uuid =
            sqlx::query("SELECT id FROM mentee_tracker.mentees WHERE external_id = $1")
                .bind(external_id)
                .fetch_one(pool)
                .await?
                .get("id");

        sqlx::query(
            r#"
            INSERT INTO mentee_tracker.attendance (id, mentee_id, session_date, session_type, is_present)
            VALUES ($1, $2, $3, 'Weekend Live Class', $4)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(mentee_id)
        .bind(session_date)
        .bind(is_present)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// PostgreSQL-backed implementation of every store trait.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn mentee_from_row(row: &PgRow) -> Result<Mentee> {
    let status: String = row.try_get("status")?;
    let priority: Option<String> = row.try_get("priority")?;

    Ok(Mentee {
        id: row.try_get("id")?,
        external_id: row.try_get("external_id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        poc: row.try_get("poc")?,
        cohort_batch: row.try_get("cohort_batch")?,
        status: status.parse()?,
        priority: priority.as_deref().map(str::parse::<Priority>).transpose()?,
        last_attendance: row.try_get("last_attendance")?,
        created_at: row.try_get("created_at")?,
    })
}

fn attendance_from_row(row: &PgRow) -> Result<Attendance> {
    Ok(Attendance {
        id: row.try_get("id")?,
        mentee_id: row.try_get("mentee_id")?,
        session_date: row.try_get("session_date")?,
        session_type: row.try_get("session_type")?,
        is_present: row.try_get("is_present")?,
        created_at: row.try_get("created_at")?,
    })
}

fn note_from_row(row: &PgRow) -> Result<CheckInNote> {
    Ok(CheckInNote {
        id: row.try_get("id")?,
        mentee_id: row.try_get("mentee_id")?,
        note: row.try_get("note")?,
        author: row.try_get("author")?,
        created_at: row.try_get("created_at")?,
    })
}

fn report_from_row(row: &PgRow) -> Result<WeeklyAttendanceReport> {
    Ok(WeeklyAttendanceReport {
        id: row.try_get("id")?,
        iso_year: row.try_get("iso_year")?,
        week_number: row.try_get("week_number")?,
        cohort_batch: row.try_get("cohort_batch")?,
        total_mentees: row.try_get("total_mentees")?,
        total_present: row.try_get("total_present")?,
        total_absent: row.try_get("total_absent")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Constraint violations are the caller's fault, not the database's.
fn constraint_error(err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation()
            || db_err.is_foreign_key_violation()
            || db_err.is_check_violation()
        {
            return Error::InvalidInput(db_err.message().to_string());
        }
    }
    Error::Database(err)
}

#[async_trait]
impl MenteeStore for PgStore {
    async fn create_mentee(&self, mentee: &NewMentee) -> Result<Mentee> {
        let query = format!(
            "INSERT INTO mentee_tracker.mentees \
             (id, external_id, name, email, phone, poc, cohort_batch, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {MENTEE_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(&mentee.external_id)
            .bind(&mentee.name)
            .bind(&mentee.email)
            .bind(&mentee.phone)
            .bind(&mentee.poc)
            .bind(&mentee.cohort_batch)
            .bind(mentee.status.unwrap_or(MenteeStatus::Active).as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(constraint_error)?;

        mentee_from_row(&row)
    }

    async fn create_mentees_skip_duplicates(&self, mentees: &[NewMentee]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut created = 0u64;

        for mentee in mentees {
            let result = sqlx::query(
                r#"
                INSERT INTO mentee_tracker.mentees
                (id, external_id, name, email, phone, poc, cohort_batch, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (external_id) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&mentee.external_id)
            .bind(&mentee.name)
            .bind(&mentee.email)
            .bind(&mentee.phone)
            .bind(&mentee.poc)
            .bind(&mentee.cohort_batch)
            .bind(mentee.status.unwrap_or(MenteeStatus::Active).as_str())
            .execute(&mut *tx)
            .await?;

            created += result.rows_affected();
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn get_mentee(&self, id: Uuid) -> Result<Option<Mentee>> {
        let query = format!("SELECT {MENTEE_COLUMNS} FROM mentee_tracker.mentees WHERE id = $1");
        let row = sqlx::query(&query).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(mentee_from_row).transpose()
    }

    async fn find_mentee_by_external_id(&self, external_id: &str) -> Result<Option<Mentee>> {
        let query =
            format!("SELECT {MENTEE_COLUMNS} FROM mentee_tracker.mentees WHERE external_id = $1");
        let row = sqlx::query(&query)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(mentee_from_row).transpose()
    }

    async fn find_mentees_by_external_ids(&self, external_ids: &[String]) -> Result<Vec<Mentee>> {
        let query = format!(
            "SELECT {MENTEE_COLUMNS} FROM mentee_tracker.mentees WHERE external_id = ANY($1)"
        );
        let rows = sqlx::query(&query)
            .bind(external_ids)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(mentee_from_row).collect()
    }

    async fn list_mentees(&self, filter: &MenteeFilter) -> Result<Vec<Mentee>> {
        let query = format!(
            "SELECT {MENTEE_COLUMNS} FROM mentee_tracker.mentees \
             WHERE ($1::text IS NULL OR cohort_batch = $1) \
             ORDER BY created_at, external_id LIMIT $2"
        );
        let rows = sqlx::query(&query)
            .bind(&filter.cohort_batch)
            .bind(filter.limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(mentee_from_row).collect()
    }

    async fn list_cohort_with_attendance(&self, cohort_batch: &str) -> Result<Vec<MenteeAttendance>> {
        let query =
            format!("SELECT {MENTEE_COLUMNS} FROM mentee_tracker.mentees WHERE cohort_batch = $1");
        let mentees = sqlx::query(&query)
            .bind(cohort_batch)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(mentee_from_row)
            .collect::<Result<Vec<_>>>()?;

        let ids: Vec<Uuid> = mentees.iter().map(|mentee| mentee.id).collect();
        let query = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM mentee_tracker.attendance WHERE mentee_id = ANY($1)"
        );
        let mut by_mentee: HashMap<Uuid, Vec<Attendance>> = HashMap::new();
        for row in sqlx::query(&query).bind(&ids).fetch_all(&self.pool).await? {
            let record = attendance_from_row(&row)?;
            by_mentee.entry(record.mentee_id).or_default().push(record);
        }

        Ok(mentees
            .into_iter()
            .map(|mentee| MenteeAttendance {
                attendance: by_mentee.remove(&mentee.id).unwrap_or_default(),
                mentee,
            })
            .collect())
    }

    async fn count_mentees(&self, cohort_batch: &str, excluded: &[MenteeStatus]) -> Result<i64> {
        let excluded: Vec<&str> = excluded.iter().map(|status| status.as_str()).collect();
        let count: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM mentee_tracker.mentees \
             WHERE cohort_batch = $1 AND NOT (status = ANY($2))",
        )
        .bind(cohort_batch)
        .bind(&excluded)
        .fetch_one(&self.pool)
        .await?
        .try_get("total")?;
        Ok(count)
    }

    async fn update_mentee(&self, id: Uuid, update: &MenteeUpdate) -> Result<Option<Mentee>> {
        let query = format!(
            "UPDATE mentee_tracker.mentees \
             SET status = COALESCE($2, status), poc = COALESCE($3, poc) \
             WHERE id = $1 RETURNING {MENTEE_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(update.status.map(MenteeStatus::as_str))
            .bind(&update.poc)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(mentee_from_row).transpose()
    }

    async fn record_classification(
        &self,
        id: Uuid,
        priority: Priority,
        last_attendance: Option<NaiveDate>,
        status: MenteeStatus,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE mentee_tracker.mentees \
             SET priority = $2, last_attendance = $3, status = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(priority.as_str())
        .bind(last_attendance)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_mentee(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM mentee_tracker.mentees WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AttendanceStore for PgStore {
    async fn create_attendance(&self, record: &NewAttendance) -> Result<Attendance> {
        let query = format!(
            "INSERT INTO mentee_tracker.attendance \
             (id, mentee_id, session_date, session_type, is_present) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {ATTENDANCE_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(record.mentee_id)
            .bind(record.session_date)
            .bind(&record.session_type)
            .bind(record.is_present)
            .fetch_one(&self.pool)
            .await
            .map_err(constraint_error)?;
        attendance_from_row(&row)
    }

    async fn create_attendance_skip_duplicates(&self, records: &[NewAttendance]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for record in records {
            let result = sqlx::query(
                r#"
                INSERT INTO mentee_tracker.attendance
                (id, mentee_id, session_date, session_type, is_present)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(record.mentee_id)
            .bind(record.session_date)
            .bind(&record.session_type)
            .bind(record.is_present)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn get_attendance(&self, id: Uuid) -> Result<Option<Attendance>> {
        let query =
            format!("SELECT {ATTENDANCE_COLUMNS} FROM mentee_tracker.attendance WHERE id = $1");
        let row = sqlx::query(&query).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(attendance_from_row).transpose()
    }

    async fn list_attendance(&self) -> Result<Vec<Attendance>> {
        let query = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM mentee_tracker.attendance \
             ORDER BY session_date DESC NULLS LAST"
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(attendance_from_row).collect()
    }

    async fn list_attendance_for_mentee(&self, mentee_id: Uuid) -> Result<Vec<Attendance>> {
        let query = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM mentee_tracker.attendance WHERE mentee_id = $1"
        );
        let rows = sqlx::query(&query)
            .bind(mentee_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(attendance_from_row).collect()
    }

    async fn update_attendance(&self, id: Uuid, update: &AttendanceUpdate) -> Result<Option<Attendance>> {
        let query = format!(
            "UPDATE mentee_tracker.attendance \
             SET session_date = COALESCE($2, session_date), \
                 session_type = COALESCE($3, session_type), \
                 is_present = COALESCE($4, is_present) \
             WHERE id = $1 RETURNING {ATTENDANCE_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(update.session_date)
            .bind(&update.session_type)
            .bind(update.is_present)
            .fetch_optional(&self.pool)
            .await
            .map_err(constraint_error)?;
        row.as_ref().map(attendance_from_row).transpose()
    }

    async fn delete_attendance(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM mentee_tracker.attendance WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CheckInNoteStore for PgStore {
    async fn create_note(&self, note: &NewCheckInNote) -> Result<CheckInNote> {
        let query = format!(
            "INSERT INTO mentee_tracker.checkin_notes (id, mentee_id, note, author) \
             VALUES ($1, $2, $3, $4) RETURNING {NOTE_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(note.mentee_id)
            .bind(&note.note)
            .bind(&note.author)
            .fetch_one(&self.pool)
            .await
            .map_err(constraint_error)?;
        note_from_row(&row)
    }

    async fn get_note(&self, id: Uuid) -> Result<Option<CheckInNote>> {
        let query = format!("SELECT {NOTE_COLUMNS} FROM mentee_tracker.checkin_notes WHERE id = $1");
        let row = sqlx::query(&query).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(note_from_row).transpose()
    }

    async fn list_notes(&self, mentee_id: Option<Uuid>) -> Result<Vec<CheckInNote>> {
        let query = format!(
            "SELECT {NOTE_COLUMNS} FROM mentee_tracker.checkin_notes \
             WHERE ($1::uuid IS NULL OR mentee_id = $1) ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(mentee_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(note_from_row).collect()
    }

    async fn update_note(&self, id: Uuid, update: &CheckInNoteUpdate) -> Result<Option<CheckInNote>> {
        let query = format!(
            "UPDATE mentee_tracker.checkin_notes \
             SET note = COALESCE($2, note), author = COALESCE($3, author) \
             WHERE id = $1 RETURNING {NOTE_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(&update.note)
            .bind(&update.author)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(note_from_row).transpose()
    }

    async fn delete_note(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM mentee_tracker.checkin_notes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ReportStore for PgStore {
    async fn upsert_weekly_report(&self, tally: &WeeklyTally) -> Result<WeeklyAttendanceReport> {
        let query = format!(
            "INSERT INTO mentee_tracker.weekly_attendance_reports \
             (id, iso_year, week_number, cohort_batch, total_mentees, total_present, total_absent) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (iso_year, week_number, cohort_batch) DO UPDATE \
             SET total_mentees = EXCLUDED.total_mentees, \
                 total_present = EXCLUDED.total_present, \
                 total_absent = EXCLUDED.total_absent, \
                 updated_at = now() \
             RETURNING {REPORT_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(tally.iso_year)
            .bind(tally.week_number)
            .bind(&tally.cohort_batch)
            .bind(tally.total_mentees)
            .bind(tally.total_present)
            .bind(tally.total_absent)
            .fetch_one(&self.pool)
            .await
            .map_err(constraint_error)?;
        report_from_row(&row)
    }

    async fn list_weekly_reports(&self, cohort_batch: Option<&str>) -> Result<Vec<WeeklyAttendanceReport>> {
        let query = format!(
            "SELECT {REPORT_COLUMNS} FROM mentee_tracker.weekly_attendance_reports \
             WHERE ($1::text IS NULL OR cohort_batch = $1) \
             ORDER BY cohort_batch, iso_year, week_number"
        );
        let rows = sqlx::query(&query)
            .bind(cohort_batch)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(report_from_row).collect()
    }
}
