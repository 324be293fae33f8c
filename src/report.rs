use std::fmt::Write;

use chrono::{Datelike, Duration, NaiveDate};
use tracing::debug;

use crate::error::Result;
use crate::models::{MenteeAttendance, WeeklyAttendanceReport, WeeklyTally};
use crate::store::{MenteeStore, ReportStore, Store};

/// Monday of every ISO week from the one containing `program_start` through `today`.
pub fn week_starts(program_start: NaiveDate, today: NaiveDate) -> Vec<NaiveDate> {
    let mut current =
        program_start - Duration::days(program_start.weekday().num_days_from_monday() as i64);
    let mut weeks = Vec::new();

    while current <= today {
        weeks.push(current);
        current += Duration::weeks(1);
    }

    weeks
}

/// Counts a mentee present for the week if any session that week (on or after the program
/// start) was attended; no sessions at all counts as absent.
pub fn tally_week(
    week_start: NaiveDate,
    program_start: NaiveDate,
    cohort_batch: &str,
    cohort: &[MenteeAttendance],
) -> WeeklyTally {
    let week = week_start.iso_week();
    let mut total_present = 0;

    for entry in cohort {
        let attended = entry
            .attendance
            .iter()
            .filter_map(|record| record.session_date.map(|date| (date, record.is_present)))
            .filter(|(date, _)| date.iso_week() == week && *date >= program_start)
            .any(|(_, present)| present);

        if attended {
            total_present += 1;
        }
    }

    let total_mentees = cohort.len() as i32;
    WeeklyTally {
        iso_year: week.year(),
        week_number: week.week() as i32,
        cohort_batch: cohort_batch.to_string(),
        total_mentees,
        total_present,
        total_absent: total_mentees - total_present,
    }
}

/// Recomputes and upserts one report per week for `cohort_batch`.
pub async fn generate_weekly_reports(
    store: &dyn Store,
    cohort_batch: &str,
    program_start: NaiveDate,
    today: NaiveDate,
) -> Result<Vec<WeeklyAttendanceReport>> {
    let mut reports = Vec::new();

    for week_start in week_starts(program_start, today) {
        let cohort = store.list_cohort_with_attendance(cohort_batch).await?;
        let tally = tally_week(week_start, program_start, cohort_batch, &cohort);
        debug!(
            cohort_batch,
            iso_year = tally.iso_year,
            week = tally.week_number,
            present = tally.total_present,
            absent = tally.total_absent,
            "weekly attendance tallied"
        );
        reports.push(store.upsert_weekly_report(&tally).await?);
    }

    Ok(reports)
}

pub fn build_report(cohort_batch: &str, reports: &[WeeklyAttendanceReport]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Weekly Attendance Report");
    let _ = writeln!(output, "Generated for cohort {}", cohort_batch);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Weeks");

    if reports.is_empty() {
        let _ = writeln!(output, "No weekly reports recorded for this cohort.");
        return output;
    }

    for report in reports {
        let rate = if report.total_mentees == 0 {
            0.0
        } else {
            report.total_present as f64 * 100.0 / report.total_mentees as f64
        };
        let _ = writeln!(
            output,
            "- {}-W{:02}: {} present, {} absent of {} mentees ({:.1}% attendance)",
            report.iso_year,
            report.week_number,
            report.total_present,
            report.total_absent,
            report.total_mentees,
            rate
        );
    }

    output
}
