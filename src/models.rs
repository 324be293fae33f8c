use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
    P4,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::P0 => "P0",
            Priority::P1 => "P1",
            Priority::P2 => "P2",
            Priority::P3 => "P3",
            Priority::P4 => "P4",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "P0" => Ok(Priority::P0),
            "P1" => Ok(Priority::P1),
            "P2" => Ok(Priority::P2),
            "P3" => Ok(Priority::P3),
            "P4" => Ok(Priority::P4),
            other => Err(Error::InvalidInput(format!("unknown priority {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MenteeStatus {
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Completed")]
    Completed,
    #[serde(rename = "Archived")]
    Archived,
}

impl MenteeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MenteeStatus::Active => "active",
            MenteeStatus::InProgress => "In Progress",
            MenteeStatus::Completed => "Completed",
            MenteeStatus::Archived => "Archived",
        }
    }

    /// Completed and archived mentees no longer need check-ins.
    pub fn needs_check_in(self) -> bool {
        !matches!(self, MenteeStatus::Completed | MenteeStatus::Archived)
    }
}

impl fmt::Display for MenteeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MenteeStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(MenteeStatus::Active),
            "in progress" | "in-progress" => Ok(MenteeStatus::InProgress),
            "completed" => Ok(MenteeStatus::Completed),
            "archived" => Ok(MenteeStatus::Archived),
            _ => Err(Error::InvalidInput(format!("unknown mentee status {value:?}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mentee {
    pub id: Uuid,
    pub external_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub poc: Option<String>,
    pub cohort_batch: Option<String>,
    pub status: MenteeStatus,
    pub priority: Option<Priority>,
    pub last_attendance: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMentee {
    pub external_id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub poc: Option<String>,
    #[serde(default)]
    pub cohort_batch: Option<String>,
    #[serde(default)]
    pub status: Option<MenteeStatus>,
}

/// Fields a client may change on an existing mentee.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MenteeUpdate {
    #[serde(default)]
    pub status: Option<MenteeStatus>,
    #[serde(default)]
    pub poc: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MenteeFilter {
    pub cohort_batch: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct MenteeAttendance {
    pub mentee: Mentee,
    pub attendance: Vec<Attendance>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub id: Uuid,
    pub mentee_id: Uuid,
    pub session_date: Option<NaiveDate>,
    pub session_type: String,
    pub is_present: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAttendance {
    pub mentee_id: Uuid,
    #[serde(default)]
    pub session_date: Option<NaiveDate>,
    pub session_type: String,
    pub is_present: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceUpdate {
    #[serde(default)]
    pub session_date: Option<NaiveDate>,
    #[serde(default)]
    pub session_type: Option<String>,
    #[serde(default)]
    pub is_present: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInNote {
    pub id: Uuid,
    pub mentee_id: Uuid,
    pub note: String,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCheckInNote {
    pub mentee_id: Uuid,
    pub note: String,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckInNoteUpdate {
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

/// Present/absent counts for one cohort in one ISO week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyTally {
    pub iso_year: i32,
    pub week_number: i32,
    pub cohort_batch: String,
    pub total_mentees: i32,
    pub total_present: i32,
    pub total_absent: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyAttendanceReport {
    pub id: Uuid,
    pub iso_year: i32,
    pub week_number: i32,
    pub cohort_batch: String,
    pub total_mentees: i32,
    pub total_present: i32,
    pub total_absent: i32,
    pub updated_at: DateTime<Utc>,
}

/// One attendance row as delivered by the learning-management report endpoint
/// (or an exported CSV of the same report).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAttendanceRow {
    #[serde(rename = "student_Id", default, deserialize_with = "opt_string_or_number")]
    pub student_id: Option<String>,
    #[serde(rename = "classDate", default)]
    pub class_date: Option<String>,
    #[serde(rename = "sessionName", default)]
    pub session_name: Option<String>,
    #[serde(rename = "studentAttendanceStatus", default)]
    pub status: Option<String>,
    #[serde(rename = "batchName", default)]
    pub batch_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalStudent {
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub contact_number: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Int(i64),
    Float(f64),
    Text(String),
}

impl IdRepr {
    fn into_string(self) -> String {
        match self {
            IdRepr::Int(value) => value.to_string(),
            IdRepr::Float(value) if value.fract() == 0.0 => format!("{}", value as i64),
            IdRepr::Float(value) => value.to_string(),
            IdRepr::Text(value) => value,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    IdRepr::deserialize(deserializer).map(IdRepr::into_string)
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<IdRepr>::deserialize(deserializer)?
        .map(IdRepr::into_string)
        .filter(|value| !value.is_empty()))
}
