use chrono::{Duration, NaiveDate};

use crate::models::{Attendance, Priority};

const WINDOW_DAYS: i64 = 14;
const MAX_SESSIONS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub priority: Priority,
    pub last_attendance: Option<NaiveDate>,
}

/// Rates a mentee's recent engagement from their attendance history.
pub fn classify(history: &[Attendance], today: NaiveDate) -> Classification {
    let cutoff = cutoff_date(today);
    let mut recent: Vec<(NaiveDate, bool)> = history
        .iter()
        .filter_map(|record| record.session_date.map(|date| (date, record.is_present)))
        .filter(|(date, _)| *date > cutoff)
        .collect();

    recent.sort_by(|a, b| b.0.cmp(&a.0));
    let last_attendance = recent.first().map(|(date, _)| *date);

    let window = &recent[..recent.len().min(MAX_SESSIONS)];
    let absences = window.iter().filter(|(_, present)| !present).count();

    Classification {
        priority: priority_for(window.len(), absences),
        last_attendance,
    }
}

/// Tier for `absences` out of `sessions` considered.
pub fn priority_for(sessions: usize, absences: usize) -> Priority {
    if sessions >= MAX_SESSIONS {
        match absences {
            0 => Priority::P4,
            1 => Priority::P3,
            2 => Priority::P2,
            3 => Priority::P1,
            _ => Priority::P0,
        }
    } else if sessions == 2 {
        match absences {
            0 => Priority::P2,
            1 => Priority::P1,
            _ => Priority::P0,
        }
    } else if absences == 0 {
        Priority::P4
    } else if absences == sessions {
        Priority::P0
    } else {
        Priority::P3
    }
}

pub fn cutoff_date(today: NaiveDate) -> NaiveDate {
    today - Duration::days(WINDOW_DAYS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 20).unwrap()
    }

    fn session(days_ago: i64, is_present: bool) -> Attendance {
        Attendance {
            id: Uuid::new_v4(),
            mentee_id: Uuid::nil(),
            session_date: Some(today() - Duration::days(days_ago)),
            session_type: "Weekend Live Class".to_string(),
            is_present,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn four_sessions_with_two_absences_is_p2() {
        let history = vec![
            session(1, true),
            session(3, false),
            session(6, false),
            session(10, true),
        ];

        let result = classify(&history, today());
        assert_eq!(result.priority, Priority::P2);
        assert_eq!(result.last_attendance, Some(today() - Duration::days(1)));
    }

    #[test]
    fn two_sessions_follow_their_own_scale() {
        let absent = classify(&[session(2, false), session(3, false)], today());
        assert_eq!(absent.priority, Priority::P0);

        let present = classify(&[session(2, true), session(3, true)], today());
        assert_eq!(present.priority, Priority::P2);

        let mixed = classify(&[session(2, true), session(3, false)], today());
        assert_eq!(mixed.priority, Priority::P1);
    }

    #[test]
    fn no_recent_sessions_is_p4_without_last_attendance() {
        let result = classify(&[session(20, false), session(30, false)], today());
        assert_eq!(result.priority, Priority::P4);
        assert_eq!(result.last_attendance, None);
    }

    #[test]
    fn only_four_most_recent_sessions_count() {
        let history = vec![
            session(1, true),
            session(2, true),
            session(4, true),
            session(5, true),
            session(8, false),
            session(9, false),
        ];

        assert_eq!(classify(&history, today()).priority, Priority::P4);
    }

    #[test]
    fn odd_session_counts_fall_back_to_all_or_mixed() {
        assert_eq!(priority_for(1, 0), Priority::P4);
        assert_eq!(priority_for(1, 1), Priority::P0);
        assert_eq!(priority_for(3, 3), Priority::P0);
        assert_eq!(priority_for(3, 1), Priority::P3);
        assert_eq!(priority_for(0, 0), Priority::P4);
    }

    #[test]
    fn window_excludes_day_fourteen_and_undated_records() {
        let mut undated = session(1, false);
        undated.session_date = None;

        let result = classify(&[session(14, false), undated], today());
        assert_eq!(result.priority, Priority::P4);
        assert_eq!(result.last_attendance, None);
    }

    #[test]
    fn cutoff_date_is_two_weeks_back() {
        assert_eq!(cutoff_date(today()), NaiveDate::from_ymd_opt(2025, 11, 6).unwrap());
    }
}
