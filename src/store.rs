use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Attendance, AttendanceUpdate, CheckInNote, CheckInNoteUpdate, Mentee, MenteeAttendance,
    MenteeFilter, MenteeStatus, MenteeUpdate, NewAttendance, NewCheckInNote, NewMentee, Priority,
    WeeklyAttendanceReport, WeeklyTally,
};

#[async_trait]
pub trait MenteeStore: Send + Sync {
    async fn create_mentee(&self, mentee: &NewMentee) -> Result<Mentee>;
    async fn create_mentees_skip_duplicates(&self, mentees: &[NewMentee]) -> Result<u64>;
    async fn get_mentee(&self, id: Uuid) -> Result<Option<Mentee>>;
    async fn find_mentee_by_external_id(&self, external_id: &str) -> Result<Option<Mentee>>;
    async fn find_mentees_by_external_ids(&self, external_ids: &[String]) -> Result<Vec<Mentee>>;
    async fn list_mentees(&self, filter: &MenteeFilter) -> Result<Vec<Mentee>>;
    async fn list_cohort_with_attendance(&self, cohort_batch: &str) -> Result<Vec<MenteeAttendance>>;
    async fn count_mentees(&self, cohort_batch: &str, excluded: &[MenteeStatus]) -> Result<i64>;
    async fn update_mentee(&self, id: Uuid, update: &MenteeUpdate) -> Result<Option<Mentee>>;
    async fn record_classification(
        &self,
        id: Uuid,
        priority: Priority,
        last_attendance: Option<NaiveDate>,
        status: MenteeStatus,
    ) -> Result<()>;
    async fn delete_mentee(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn create_attendance(&self, record: &NewAttendance) -> Result<Attendance>;
    /// Inserts records, skipping any (mentee, date, session) already stored.
    async fn create_attendance_skip_duplicates(&self, records: &[NewAttendance]) -> Result<u64>;
    async fn get_attendance(&self, id: Uuid) -> Result<Option<Attendance>>;
    async fn list_attendance(&self) -> Result<Vec<Attendance>>;
    async fn list_attendance_for_mentee(&self, mentee_id: Uuid) -> Result<Vec<Attendance>>;
    async fn update_attendance(&self, id: Uuid, update: &AttendanceUpdate) -> Result<Option<Attendance>>;
    async fn delete_attendance(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait CheckInNoteStore: Send + Sync {
    async fn create_note(&self, note: &NewCheckInNote) -> Result<CheckInNote>;
    async fn get_note(&self, id: Uuid) -> Result<Option<CheckInNote>>;
    async fn list_notes(&self, mentee_id: Option<Uuid>) -> Result<Vec<CheckInNote>>;
    async fn update_note(&self, id: Uuid, update: &CheckInNoteUpdate) -> Result<Option<CheckInNote>>;
    async fn delete_note(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn upsert_weekly_report(&self, tally: &WeeklyTally) -> Result<WeeklyAttendanceReport>;
    /// Reports ordered by year then week; all cohorts when `cohort_batch` is `None`.
    async fn list_weekly_reports(&self, cohort_batch: Option<&str>) -> Result<Vec<WeeklyAttendanceReport>>;
}

pub trait Store: MenteeStore + AttendanceStore + CheckInNoteStore + ReportStore {}

impl<T> Store for T where T: MenteeStore + AttendanceStore + CheckInNoteStore + ReportStore {}

pub type SharedStore = Arc<dyn Store>;
