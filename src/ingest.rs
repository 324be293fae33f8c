use std::collections::HashMap;

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::config::ProgramSettings;
use crate::error::{Error, Result};
use crate::models::{MenteeStatus, NewMentee, RawAttendanceRow, WeeklyAttendanceReport};
use crate::reconcile::{external_ids, reconcile};
use crate::report::generate_weekly_reports;
use crate::risk::classify;
use crate::source::AttendanceSource;
use crate::store::{AttendanceStore, MenteeStore, SharedStore};
use crate::window::weekend_dates;

const STUDENT_PAGE_SIZE: u32 = 2000;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub dates: Vec<NaiveDate>,
    pub rows_fetched: usize,
    pub records_matched: usize,
    pub records_inserted: u64,
    pub mentees_classified: usize,
    pub weeks_reported: usize,
}

pub struct IngestService {
    store: SharedStore,
    source: Option<AttendanceSource>,
    program: ProgramSettings,
    run_lock: Mutex<()>,
}

impl IngestService {
    pub fn new(store: SharedStore, source: Option<AttendanceSource>, program: ProgramSettings) -> Self {
        Self {
            store,
            source,
            program,
            run_lock: Mutex::new(()),
        }
    }

    fn source(&self) -> Result<&AttendanceSource> {
        self.source
            .as_ref()
            .ok_or_else(|| Error::Source("attendance source credentials are not configured".into()))
    }

    /// Fetch, reconcile, classify and re-aggregate. Rejects overlapping runs.
    pub async fn run(&self) -> Result<IngestSummary> {
        self.run_at(&Local::now()).await
    }

    pub async fn run_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<IngestSummary> {
        let _guard = self.run_lock.try_lock().map_err(|_| Error::RunInProgress)?;
        let source = self.source()?;

        let dates = weekend_dates(now, self.program.attendance_start);
        info!(dates = ?dates, "starting attendance ingest");

        let rows = source.fetch_attendance(&dates, &now.timezone()).await;
        let mut summary = self.ingest_locked(&rows, now.date_naive()).await?;
        summary.dates = dates;
        Ok(summary)
    }

    pub async fn ingest_rows(&self, rows: &[RawAttendanceRow], today: NaiveDate) -> Result<IngestSummary> {
        let _guard = self.run_lock.try_lock().map_err(|_| Error::RunInProgress)?;
        self.ingest_locked(rows, today).await
    }

    async fn ingest_locked(&self, rows: &[RawAttendanceRow], today: NaiveDate) -> Result<IngestSummary> {
        let ids = external_ids(rows);
        let roster: HashMap<String, Uuid> = self
            .store
            .find_mentees_by_external_ids(&ids)
            .await?
            .into_iter()
            .map(|mentee| (mentee.external_id, mentee.id))
            .collect();

        let records = reconcile(rows, &roster);
        let inserted = self.store.create_attendance_skip_duplicates(&records).await?;

        let mut classified = 0;
        for external_id in &ids {
            let Some(mentee) = self.store.find_mentee_by_external_id(external_id).await? else {
                continue;
            };
            let history = self.store.list_attendance_for_mentee(mentee.id).await?;
            let result = classify(&history, today);
            self.store
                .record_classification(
                    mentee.id,
                    result.priority,
                    result.last_attendance,
                    MenteeStatus::InProgress,
                )
                .await?;
            classified += 1;
        }

        let reports = self.regenerate_locked(today).await?;

        let summary = IngestSummary {
            dates: Vec::new(),
            rows_fetched: rows.len(),
            records_matched: records.len(),
            records_inserted: inserted,
            mentees_classified: classified,
            weeks_reported: reports.len(),
        };
        info!(
            rows = summary.rows_fetched,
            matched = summary.records_matched,
            inserted = summary.records_inserted,
            classified = summary.mentees_classified,
            weeks = summary.weeks_reported,
            "attendance ingest completed"
        );
        Ok(summary)
    }

    pub async fn regenerate_reports(&self, today: NaiveDate) -> Result<Vec<WeeklyAttendanceReport>> {
        let _guard = self.run_lock.try_lock().map_err(|_| Error::RunInProgress)?;
        self.regenerate_locked(today).await
    }

    async fn regenerate_locked(&self, today: NaiveDate) -> Result<Vec<WeeklyAttendanceReport>> {
        generate_weekly_reports(
            self.store.as_ref(),
            &self.program.cohort_batch,
            self.program.program_start,
            today,
        )
        .await
    }

    pub async fn sync_mentees(&self) -> Result<u64> {
        let students = self.source()?.list_students(STUDENT_PAGE_SIZE).await?;
        let ids: Vec<String> = students.iter().map(|s| s.user_id.clone()).collect();
        let known: Vec<String> = self
            .store
            .find_mentees_by_external_ids(&ids)
            .await?
            .into_iter()
            .map(|mentee| mentee.external_id)
            .collect();

        let new_mentees: Vec<NewMentee> = students
            .into_iter()
            .filter(|student| !known.contains(&student.user_id))
            .map(|student| NewMentee {
                name: student
                    .name
                    .unwrap_or_else(|| format!("Mentee {}", student.user_id)),
                email: student
                    .email
                    .unwrap_or_else(|| format!("mentee{}@example.com", student.user_id)),
                phone: student.contact_number,
                poc: None,
                cohort_batch: Some(self.program.cohort_batch.clone()),
                status: Some(MenteeStatus::Active),
                external_id: student.user_id,
            })
            .collect();

        if new_mentees.is_empty() {
            info!("roster already up to date");
            return Ok(0);
        }

        let created = self.store.create_mentees_skip_duplicates(&new_mentees).await?;
        info!(created, "mentee roster synchronized");
        Ok(created)
    }
}
