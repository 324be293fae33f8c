use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use uuid::Uuid;

use crate::models::{NewAttendance, RawAttendanceRow};

static CLASS_DATE_RE: OnceLock<Regex> = OnceLock::new();

const PRESENT: &str = "P";

/// Parses the first `6 Nov 2025`-style date found in `raw`.
pub fn parse_class_date(raw: &str) -> Option<NaiveDate> {
    let re = CLASS_DATE_RE.get_or_init(|| {
        Regex::new(r"([0-9]{1,2})\s([A-Za-z]{3})\s([0-9]{4})").expect("class date pattern is valid")
    });

    let caps = re.captures(raw)?;
    let day: u32 = caps[1].parse().ok()?;
    let month = month_number(&caps[2])?;
    let year: i32 = caps[3].parse().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)
}

fn month_number(abbrev: &str) -> Option<u32> {
    let month = match abbrev {
        "Jan" => 1,
        "Feb" => 2,
        "Mar" => 3,
        "Apr" => 4,
        "May" => 5,
        "Jun" => 6,
        "Jul" => 7,
        "Aug" => 8,
        "Sep" => 9,
        "Oct" => 10,
        "Nov" => 11,
        "Dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Distinct external ids in the batch, in first-seen order.
pub fn external_ids(rows: &[RawAttendanceRow]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for id in rows.iter().filter_map(|row| row.student_id.as_deref()) {
        if !ids.iter().any(|seen| seen == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

/// Maps raw rows onto roster mentees; rows for unknown students are dropped.
pub fn reconcile(rows: &[RawAttendanceRow], roster: &HashMap<String, Uuid>) -> Vec<NewAttendance> {
    rows.iter()
        .filter_map(|row| {
            let mentee_id = *roster.get(row.student_id.as_deref()?)?;
            Some(NewAttendance {
                mentee_id,
                session_date: row.class_date.as_deref().and_then(parse_class_date),
                session_type: row.session_name.clone().unwrap_or_default(),
                is_present: row.status.as_deref() == Some(PRESENT),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, date: &str, status: &str) -> RawAttendanceRow {
        RawAttendanceRow {
            student_id: Some(id.to_string()),
            class_date: Some(date.to_string()),
            session_name: Some("Weekend Live Class".to_string()),
            status: Some(status.to_string()),
            batch_name: Some("Cohort 6".to_string()),
        }
    }

    #[test]
    fn parses_day_month_year() {
        assert_eq!(parse_class_date("6 Nov 2025"), NaiveDate::from_ymd_opt(2025, 11, 6));
        assert_eq!(
            parse_class_date("Fri, 14 Nov 2025 10:00 AM"),
            NaiveDate::from_ymd_opt(2025, 11, 14)
        );
    }

    #[test]
    fn only_ascii_digits_form_a_date() {
        assert_eq!(parse_class_date("٠٦ Nov ٢٠٢٥"), None);
        assert_eq!(
            parse_class_date("٠٦ Nov 2025, moved to 14 Nov 2025"),
            NaiveDate::from_ymd_opt(2025, 11, 14)
        );
    }

    #[test]
    fn rejects_unparseable_dates() {
        assert_eq!(parse_class_date("2025-11-06"), None);
        assert_eq!(parse_class_date("6 nov 2025"), None);
        assert_eq!(parse_class_date("6 Nvm 2025"), None);
        assert_eq!(parse_class_date("31 Feb 2025"), None);
        assert_eq!(parse_class_date(""), None);
    }

    #[test]
    fn drops_unknown_mentees_and_keeps_null_dates() {
        let known = Uuid::new_v4();
        let roster = HashMap::from([("101".to_string(), known)]);
        let rows = vec![
            row("101", "7 Nov 2025", "P"),
            row("999", "7 Nov 2025", "P"),
            row("101", "sometime", "A"),
        ];

        let records = reconcile(&rows, &roster);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].mentee_id, known);
        assert!(records[0].is_present);
        assert_eq!(records[1].session_date, None);
        assert!(!records[1].is_present);
    }

    #[test]
    fn only_literal_p_counts_as_present() {
        let id = Uuid::new_v4();
        let roster = HashMap::from([("1".to_string(), id)]);
        let rows = vec![row("1", "7 Nov 2025", "p"), row("1", "8 Nov 2025", "Present")];

        assert!(reconcile(&rows, &roster).iter().all(|record| !record.is_present));
    }

    #[test]
    fn external_ids_are_distinct() {
        let rows = vec![row("1", "", "P"), row("2", "", "P"), row("1", "", "A")];
        assert_eq!(external_ids(&rows), vec!["1".to_string(), "2".to_string()]);
    }
}
