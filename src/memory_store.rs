//! In-memory store used by unit tests in place of PostgreSQL.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    Attendance, AttendanceUpdate, CheckInNote, CheckInNoteUpdate, Mentee, MenteeAttendance,
    MenteeFilter, MenteeStatus, MenteeUpdate, NewAttendance, NewCheckInNote, NewMentee, Priority,
    WeeklyAttendanceReport, WeeklyTally,
};
use crate::store::{AttendanceStore, CheckInNoteStore, MenteeStore, ReportStore};

#[derive(Default)]
struct State {
    mentees: Vec<Mentee>,
    attendance: Vec<Attendance>,
    notes: Vec<CheckInNote>,
    reports: Vec<WeeklyAttendanceReport>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn attendance_count(&self) -> usize {
        self.with_state(|state| state.attendance.len())
    }
}

fn build_mentee(mentee: &NewMentee) -> Mentee {
    Mentee {
        id: Uuid::new_v4(),
        external_id: mentee.external_id.clone(),
        name: mentee.name.clone(),
        email: mentee.email.clone(),
        phone: mentee.phone.clone(),
        poc: mentee.poc.clone(),
        cohort_batch: mentee.cohort_batch.clone(),
        status: mentee.status.unwrap_or(MenteeStatus::Active),
        priority: None,
        last_attendance: None,
        created_at: Utc::now(),
    }
}

fn build_attendance(record: &NewAttendance) -> Attendance {
    Attendance {
        id: Uuid::new_v4(),
        mentee_id: record.mentee_id,
        session_date: record.session_date,
        session_type: record.session_type.clone(),
        is_present: record.is_present,
        created_at: Utc::now(),
    }
}

fn same_session(a: &Attendance, b: &NewAttendance) -> bool {
    a.mentee_id == b.mentee_id && a.session_date == b.session_date && a.session_type == b.session_type
}

#[async_trait]
impl MenteeStore for MemoryStore {
    async fn create_mentee(&self, mentee: &NewMentee) -> Result<Mentee> {
        self.with_state(|state| {
            if state.mentees.iter().any(|m| m.external_id == mentee.external_id) {
                return Err(Error::InvalidInput("duplicate external id".into()));
            }
            let created = build_mentee(mentee);
            state.mentees.push(created.clone());
            Ok(created)
        })
    }

    async fn create_mentees_skip_duplicates(&self, mentees: &[NewMentee]) -> Result<u64> {
        self.with_state(|state| {
            let mut created = 0;
            for mentee in mentees {
                if !state.mentees.iter().any(|m| m.external_id == mentee.external_id) {
                    state.mentees.push(build_mentee(mentee));
                    created += 1;
                }
            }
            Ok(created)
        })
    }

    async fn get_mentee(&self, id: Uuid) -> Result<Option<Mentee>> {
        self.with_state(|state| Ok(state.mentees.iter().find(|m| m.id == id).cloned()))
    }

    async fn find_mentee_by_external_id(&self, external_id: &str) -> Result<Option<Mentee>> {
        self.with_state(|state| {
            Ok(state
                .mentees
                .iter()
                .find(|m| m.external_id == external_id)
                .cloned())
        })
    }

    async fn find_mentees_by_external_ids(&self, external_ids: &[String]) -> Result<Vec<Mentee>> {
        self.with_state(|state| {
            Ok(state
                .mentees
                .iter()
                .filter(|m| external_ids.contains(&m.external_id))
                .cloned()
                .collect())
        })
    }

    async fn list_mentees(&self, filter: &MenteeFilter) -> Result<Vec<Mentee>> {
        self.with_state(|state| {
            let limit = filter.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
            Ok(state
                .mentees
                .iter()
                .filter(|m| {
                    filter.cohort_batch.is_none() || m.cohort_batch == filter.cohort_batch
                })
                .take(limit)
                .cloned()
                .collect())
        })
    }

    async fn list_cohort_with_attendance(&self, cohort_batch: &str) -> Result<Vec<MenteeAttendance>> {
        self.with_state(|state| {
            Ok(state
                .mentees
                .iter()
                .filter(|m| m.cohort_batch.as_deref() == Some(cohort_batch))
                .map(|m| MenteeAttendance {
                    mentee: m.clone(),
                    attendance: state
                        .attendance
                        .iter()
                        .filter(|a| a.mentee_id == m.id)
                        .cloned()
                        .collect(),
                })
                .collect())
        })
    }

    async fn count_mentees(&self, cohort_batch: &str, excluded: &[MenteeStatus]) -> Result<i64> {
        self.with_state(|state| {
            Ok(state
                .mentees
                .iter()
                .filter(|m| m.cohort_batch.as_deref() == Some(cohort_batch))
                .filter(|m| !excluded.contains(&m.status))
                .count() as i64)
        })
    }

    async fn update_mentee(&self, id: Uuid, update: &MenteeUpdate) -> Result<Option<Mentee>> {
        self.with_state(|state| {
            Ok(state.mentees.iter_mut().find(|m| m.id == id).map(|m| {
                if let Some(status) = update.status {
                    m.status = status;
                }
                if let Some(poc) = &update.poc {
                    m.poc = Some(poc.clone());
                }
                m.clone()
            }))
        })
    }

    async fn record_classification(
        &self,
        id: Uuid,
        priority: Priority,
        last_attendance: Option<NaiveDate>,
        status: MenteeStatus,
    ) -> Result<()> {
        self.with_state(|state| {
            if let Some(m) = state.mentees.iter_mut().find(|m| m.id == id) {
                m.priority = Some(priority);
                m.last_attendance = last_attendance;
                m.status = status;
            }
            Ok(())
        })
    }

    async fn delete_mentee(&self, id: Uuid) -> Result<bool> {
        self.with_state(|state| {
            let before = state.mentees.len();
            state.mentees.retain(|m| m.id != id);
            state.attendance.retain(|a| a.mentee_id != id);
            state.notes.retain(|n| n.mentee_id != id);
            Ok(state.mentees.len() != before)
        })
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn create_attendance(&self, record: &NewAttendance) -> Result<Attendance> {
        self.with_state(|state| {
            if !state.mentees.iter().any(|m| m.id == record.mentee_id) {
                return Err(Error::InvalidInput("unknown mentee".into()));
            }
            if state.attendance.iter().any(|a| same_session(a, record)) {
                return Err(Error::InvalidInput("duplicate attendance".into()));
            }
            let created = build_attendance(record);
            state.attendance.push(created.clone());
            Ok(created)
        })
    }

    async fn create_attendance_skip_duplicates(&self, records: &[NewAttendance]) -> Result<u64> {
        self.with_state(|state| {
            let mut inserted = 0;
            for record in records {
                if !state.attendance.iter().any(|a| same_session(a, record)) {
                    state.attendance.push(build_attendance(record));
                    inserted += 1;
                }
            }
            Ok(inserted)
        })
    }

    async fn get_attendance(&self, id: Uuid) -> Result<Option<Attendance>> {
        self.with_state(|state| Ok(state.attendance.iter().find(|a| a.id == id).cloned()))
    }

    async fn list_attendance(&self) -> Result<Vec<Attendance>> {
        self.with_state(|state| Ok(state.attendance.clone()))
    }

    async fn list_attendance_for_mentee(&self, mentee_id: Uuid) -> Result<Vec<Attendance>> {
        self.with_state(|state| {
            Ok(state
                .attendance
                .iter()
                .filter(|a| a.mentee_id == mentee_id)
                .cloned()
                .collect())
        })
    }

    async fn update_attendance(&self, id: Uuid, update: &AttendanceUpdate) -> Result<Option<Attendance>> {
        self.with_state(|state| {
            Ok(state.attendance.iter_mut().find(|a| a.id == id).map(|a| {
                if update.session_date.is_some() {
                    a.session_date = update.session_date;
                }
                if let Some(session_type) = &update.session_type {
                    a.session_type = session_type.clone();
                }
                if let Some(is_present) = update.is_present {
                    a.is_present = is_present;
                }
                a.clone()
            }))
        })
    }

    async fn delete_attendance(&self, id: Uuid) -> Result<bool> {
        self.with_state(|state| {
            let before = state.attendance.len();
            state.attendance.retain(|a| a.id != id);
            Ok(state.attendance.len() != before)
        })
    }
}

#[async_trait]
impl CheckInNoteStore for MemoryStore {
    async fn create_note(&self, note: &NewCheckInNote) -> Result<CheckInNote> {
        self.with_state(|state| {
            if !state.mentees.iter().any(|m| m.id == note.mentee_id) {
                return Err(Error::InvalidInput("unknown mentee".into()));
            }
            let created = CheckInNote {
                id: Uuid::new_v4(),
                mentee_id: note.mentee_id,
                note: note.note.clone(),
                author: note.author.clone(),
                created_at: Utc::now(),
            };
            state.notes.push(created.clone());
            Ok(created)
        })
    }

    async fn get_note(&self, id: Uuid) -> Result<Option<CheckInNote>> {
        self.with_state(|state| Ok(state.notes.iter().find(|n| n.id == id).cloned()))
    }

    async fn list_notes(&self, mentee_id: Option<Uuid>) -> Result<Vec<CheckInNote>> {
        self.with_state(|state| {
            Ok(state
                .notes
                .iter()
                .filter(|n| mentee_id.map_or(true, |id| n.mentee_id == id))
                .cloned()
                .collect())
        })
    }

    async fn update_note(&self, id: Uuid, update: &CheckInNoteUpdate) -> Result<Option<CheckInNote>> {
        self.with_state(|state| {
            Ok(state.notes.iter_mut().find(|n| n.id == id).map(|n| {
                if let Some(note) = &update.note {
                    n.note = note.clone();
                }
                if let Some(author) = &update.author {
                    n.author = Some(author.clone());
                }
                n.clone()
            }))
        })
    }

    async fn delete_note(&self, id: Uuid) -> Result<bool> {
        self.with_state(|state| {
            let before = state.notes.len();
            state.notes.retain(|n| n.id != id);
            Ok(state.notes.len() != before)
        })
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn upsert_weekly_report(&self, tally: &WeeklyTally) -> Result<WeeklyAttendanceReport> {
        self.with_state(|state| {
            let existing = state.reports.iter_mut().find(|r| {
                r.iso_year == tally.iso_year
                    && r.week_number == tally.week_number
                    && r.cohort_batch == tally.cohort_batch
            });

            let report = match existing {
                Some(report) => {
                    report.total_mentees = tally.total_mentees;
                    report.total_present = tally.total_present;
                    report.total_absent = tally.total_absent;
                    report.updated_at = Utc::now();
                    report.clone()
                }
                None => {
                    let report = WeeklyAttendanceReport {
                        id: Uuid::new_v4(),
                        iso_year: tally.iso_year,
                        week_number: tally.week_number,
                        cohort_batch: tally.cohort_batch.clone(),
                        total_mentees: tally.total_mentees,
                        total_present: tally.total_present,
                        total_absent: tally.total_absent,
                        updated_at: Utc::now(),
                    };
                    state.reports.push(report.clone());
                    report
                }
            };
            Ok(report)
        })
    }

    async fn list_weekly_reports(&self, cohort_batch: Option<&str>) -> Result<Vec<WeeklyAttendanceReport>> {
        self.with_state(|state| {
            let mut reports: Vec<WeeklyAttendanceReport> = state
                .reports
                .iter()
                .filter(|r| cohort_batch.map_or(true, |c| r.cohort_batch == c))
                .cloned()
                .collect();
            reports.sort_by(|a, b| {
                (&a.cohort_batch, a.iso_year, a.week_number)
                    .cmp(&(&b.cohort_batch, b.iso_year, b.week_number))
            });
            Ok(reports)
        })
    }
}
