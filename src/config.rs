use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};

use crate::source::SourceCredentials;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_COHORT: &str = "6";
const DEFAULT_BATCH_FILTER: &str = "Cohort 6";
const DEFAULT_PROGRAM_START: &str = "2025-11-06";
const DEFAULT_ATTENDANCE_START: &str = "2025-11-06T00:00:00Z";
const DEFAULT_INGEST_CRON: &str = "0 0 3 * * Mon";
const DEFAULT_CORS_ORIGINS: &str = "https://mentee-tracker-frontend.vercel.app,http://localhost:8080";
const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 30;

/// Which cohort is tracked and from when.
#[derive(Debug, Clone)]
pub struct ProgramSettings {
    pub cohort_batch: String,
    /// Substring the source's `batchName` must contain; `None` keeps every row.
    pub batch_name_filter: Option<String>,
    pub program_start: NaiveDate,
    pub attendance_start: DateTime<Utc>,
}

impl Default for ProgramSettings {
    fn default() -> Self {
        Self {
            cohort_batch: DEFAULT_COHORT.to_string(),
            batch_name_filter: Some(DEFAULT_BATCH_FILTER.to_string()),
            program_start: NaiveDate::from_ymd_opt(2025, 11, 6).unwrap_or_default(),
            attendance_start: DateTime::<Utc>::from_timestamp(1_762_387_200, 0).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub program: ProgramSettings,
    pub source: Option<SourceCredentials>,
    pub source_timeout: Duration,
    pub ingest_cron: String,
    pub scheduler_enabled: bool,
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;

        let source = match (lookup("API_BASE_URL"), lookup("API_KEY"), lookup("ORG_ID")) {
            (Some(base_url), Some(api_key), Some(org_id)) => Some(SourceCredentials {
                base_url,
                api_key,
                org_id,
            }),
            _ => None,
        };

        let batch_name_filter = lookup("BATCH_NAME_FILTER")
            .unwrap_or_else(|| DEFAULT_BATCH_FILTER.to_string());

        Ok(Self {
            database_url,
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            program: ProgramSettings {
                cohort_batch: lookup("COHORT_BATCH").unwrap_or_else(|| DEFAULT_COHORT.to_string()),
                batch_name_filter: Some(batch_name_filter).filter(|value| !value.is_empty()),
                program_start: parse_or(
                    &lookup,
                    "PROGRAM_START_DATE",
                    DEFAULT_PROGRAM_START.parse::<NaiveDate>()?,
                )?,
                attendance_start: parse_or(
                    &lookup,
                    "ATTENDANCE_START",
                    DEFAULT_ATTENDANCE_START.parse::<DateTime<Utc>>()?,
                )?,
            },
            source,
            source_timeout: Duration::from_secs(parse_or(
                &lookup,
                "SOURCE_TIMEOUT_SECS",
                DEFAULT_SOURCE_TIMEOUT_SECS,
            )?),
            ingest_cron: lookup("INGEST_CRON").unwrap_or_else(|| DEFAULT_INGEST_CRON.to_string()),
            scheduler_enabled: lookup("INGEST_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(true),
            cors_origins: lookup("CORS_ORIGINS")
                .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string())
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }

    /// Upstream credentials, required by every command that talks to the source.
    pub fn source_credentials(&self) -> anyhow::Result<SourceCredentials> {
        self.source
            .clone()
            .context("API_BASE_URL, API_KEY and ORG_ID must be set to reach the attendance source")
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {key} value {raw:?}: {e}")),
        None => Ok(default),
    }
}
