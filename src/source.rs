use std::time::Duration;

use chrono::{NaiveDate, TimeZone};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{ExternalStudent, RawAttendanceRow};
use crate::window::day_bounds;

const SUCCESS_CODE: i64 = 200;
const ATTENDANCE_REPORT_TYPE: &str = "55";

#[derive(Debug, Deserialize)]
struct AttendanceResponse {
    code: i64,
    #[serde(default)]
    data: Vec<RawAttendanceRow>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StudentsResponse {
    code: i64,
    #[serde(default)]
    students: Vec<ExternalStudent>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SourceCredentials {
    pub base_url: String,
    pub api_key: String,
    pub org_id: String,
}

#[derive(Debug, Clone)]
pub struct AttendanceSource {
    http: reqwest::Client,
    credentials: SourceCredentials,
    batch_filter: Option<String>,
}

impl AttendanceSource {
    pub fn new(credentials: SourceCredentials, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            credentials,
            batch_filter: None,
        })
    }

    pub fn with_batch_filter(mut self, filter: Option<String>) -> Self {
        self.batch_filter = filter.filter(|value| !value.is_empty());
        self
    }

    fn report_url(&self) -> String {
        format!("{}/report/csv", self.credentials.base_url.trim_end_matches('/'))
    }

    fn students_url(&self) -> String {
        format!(
            "{}/organization/students",
            self.credentials.base_url.trim_end_matches('/')
        )
    }

    /// Attendance rows for one inclusive Unix-second range.
    pub async fn fetch_range(&self, start: i64, end: i64) -> Result<Vec<RawAttendanceRow>> {
        let creds = &self.credentials;
        let resp = self
            .http
            .get(self.report_url())
            .header("apikey", &creds.api_key)
            .header("ORGID", &creds.org_id)
            .query(&[
                ("apikey", creds.api_key.as_str()),
                ("response_type", "1"),
                ("ORGID", creds.org_id.as_str()),
                ("report_type", ATTENDANCE_REPORT_TYPE),
                ("organization_id", creds.org_id.as_str()),
            ])
            .query(&[("start_time", start), ("end_time", end)])
            .send()
            .await?;

        let body = resp.json::<AttendanceResponse>().await?;
        if body.code != SUCCESS_CODE {
            return Err(Error::Source(format!(
                "code {}: {}",
                body.code,
                body.message.unwrap_or_default()
            )));
        }

        Ok(match &self.batch_filter {
            Some(filter) => body
                .data
                .into_iter()
                .filter(|row| {
                    row.batch_name
                        .as_deref()
                        .is_some_and(|name| name.contains(filter.as_str()))
                })
                .collect(),
            None => body.data,
        })
    }

    // A failed day is logged and contributes no rows.
    pub async fn fetch_attendance<Tz: TimeZone>(
        &self,
        dates: &[NaiveDate],
        tz: &Tz,
    ) -> Vec<RawAttendanceRow> {
        let mut rows = Vec::new();

        for date in dates {
            let (start, end) = day_bounds(*date, tz);
            match self.fetch_range(start, end).await {
                Ok(batch) => {
                    debug!(%date, rows = batch.len(), "fetched attendance");
                    rows.extend(batch);
                }
                Err(e) => warn!(%date, error = %e, "failed to fetch attendance"),
            }
        }

        rows
    }

    pub async fn list_students(&self, per_page: u32) -> Result<Vec<ExternalStudent>> {
        let creds = &self.credentials;
        let resp = self
            .http
            .get(self.students_url())
            .header("apikey", &creds.api_key)
            .header("ORGID", &creds.org_id)
            .query(&[("per_page", per_page)])
            .send()
            .await?;

        let body = resp.json::<StudentsResponse>().await?;
        if body.code != SUCCESS_CODE {
            return Err(Error::Source(
                body.message
                    .unwrap_or_else(|| "failed to fetch external mentees".to_string()),
            ));
        }

        Ok(body.students)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup() -> (MockServer, AttendanceSource) {
        let server = MockServer::start().await;
        let source = AttendanceSource::new(
            SourceCredentials {
                base_url: server.uri(),
                api_key: "test-key".to_string(),
                org_id: "42".to_string(),
            },
            Duration::from_secs(5),
        )
        .unwrap();
        (server, source)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn fetch_range_sends_credentials_and_filters_batch() {
        let (server, source) = setup().await;
        let source = source.with_batch_filter(Some("Cohort 6".to_string()));

        Mock::given(method("GET"))
            .and(path("/report/csv"))
            .and(header("apikey", "test-key"))
            .and(header("ORGID", "42"))
            .and(query_param("report_type", "55"))
            .and(query_param("start_time", "100"))
            .and(query_param("end_time", "200"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 200,
                "data": [
                    { "student_Id": 1, "classDate": "7 Nov 2025", "sessionName": "Live", "studentAttendanceStatus": "P", "batchName": "Cohort 6 - Weekend" },
                    { "student_Id": 2, "classDate": "7 Nov 2025", "sessionName": "Live", "studentAttendanceStatus": "P", "batchName": "Cohort 5" },
                    { "student_Id": 3, "classDate": "7 Nov 2025", "sessionName": "Live", "studentAttendanceStatus": "A" }
                ]
            })))
            .mount(&server)
            .await;

        let rows = source.fetch_range(100, 200).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].student_id.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn non_success_code_is_a_source_error() {
        let (server, source) = setup().await;

        Mock::given(method("GET"))
            .and(path("/report/csv"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 401,
                "message": "invalid api key"
            })))
            .mount(&server)
            .await;

        let err = source.fetch_range(0, 1).await.unwrap_err();
        assert!(matches!(err, Error::Source(ref msg) if msg.contains("invalid api key")));
    }

    #[tokio::test]
    async fn failed_dates_are_skipped() {
        let (server, source) = setup().await;
        let (good_start, _) = day_bounds(date(2025, 11, 7), &Utc);

        Mock::given(method("GET"))
            .and(path("/report/csv"))
            .and(query_param("start_time", good_start.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 200,
                "data": [{ "student_Id": "9", "classDate": "7 Nov 2025", "sessionName": "Live", "studentAttendanceStatus": "P" }]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/report/csv"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let rows = source
            .fetch_attendance(&[date(2025, 11, 7), date(2025, 11, 8)], &Utc)
            .await;
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn list_students_reads_directory() {
        let (server, source) = setup().await;

        Mock::given(method("GET"))
            .and(path("/organization/students"))
            .and(query_param("per_page", "2000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 200,
                "students": [
                    { "user_id": 5001, "name": "Avery Lee", "email": "avery@example.com", "contact_number": 5550100 },
                    { "user_id": "5002" }
                ]
            })))
            .mount(&server)
            .await;

        let students = source.list_students(2000).await.unwrap();
        assert_eq!(students.len(), 2);
        assert_eq!(students[0].user_id, "5001");
        assert_eq!(students[0].contact_number.as_deref(), Some("5550100"));
        assert_eq!(students[1].name, None);
    }
}
