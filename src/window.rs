use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};

const SCAN_DAYS: i64 = 21;
const MAX_DATES: usize = 4;

/// Friday/Saturday dates of the latest elapsed weekends, ascending. Two weekends before
/// `attendance_start`, one after.
pub fn weekend_dates<Tz: TimeZone>(now: &DateTime<Tz>, attendance_start: DateTime<Utc>) -> Vec<NaiveDate> {
    let today = now.date_naive();
    let anchor = match today.weekday() {
        Weekday::Fri | Weekday::Sat => {
            today - Duration::days(today.weekday().num_days_from_sunday() as i64)
        }
        _ => today,
    };

    let mut dates: Vec<NaiveDate> = Vec::with_capacity(MAX_DATES);
    for offset in 0..SCAN_DAYS {
        if dates.len() == MAX_DATES {
            break;
        }
        let day = anchor - Duration::days(offset);
        if matches!(day.weekday(), Weekday::Fri | Weekday::Sat) && !dates.contains(&day) {
            dates.push(day);
        }
    }

    dates.sort();

    let keep = if now.with_timezone(&Utc) > attendance_start {
        2
    } else {
        MAX_DATES
    };
    let skip = dates.len().saturating_sub(keep);
    dates.split_off(skip)
}

pub fn day_bounds<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> (i64, i64) {
    let start = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    let end = date.and_hms_milli_opt(23, 59, 59, 999).unwrap_or_default();

    // A DST gap can swallow local midnight; fall back to the UTC reading of the wall clock.
    let start = tz
        .from_local_datetime(&start)
        .earliest()
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| start.and_utc().timestamp());
    let end = tz
        .from_local_datetime(&end)
        .latest()
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| end.and_utc().timestamp());

    (start, end)
}
