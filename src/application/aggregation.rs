use crate::domain::models::{AggregateSummary, StudySession, SubjectDuration, TimeWindow};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;

fn in_window<'a>(
    sessions: &'a [StudySession],
    window: &'a TimeWindow,
) -> impl Iterator<Item = &'a StudySession> + 'a {
    sessions
        .iter()
        .filter(move |session| window.contains(session.studied_at))
}

pub fn total_duration(sessions: &[StudySession], window: &TimeWindow) -> u64 {
    in_window(sessions, window)
        .map(|session| u64::from(session.duration_minutes))
        .sum()
}

pub fn average_focus(sessions: &[StudySession], window: &TimeWindow) -> f64 {
    let (count, focus_sum) = in_window(sessions, window).fold((0u64, 0u64), |(count, sum), session| {
        (count + 1, sum + u64::from(session.focus_level))
    });
    if count == 0 {
        return 0.0;
    }
    focus_sum as f64 / count as f64
}

pub fn per_subject_durations(sessions: &[StudySession], window: &TimeWindow) -> Vec<SubjectDuration> {
    let mut totals: BTreeMap<&str, u64> = BTreeMap::new();
    for session in in_window(sessions, window) {
        *totals.entry(session.subject_name.as_str()).or_default() +=
            u64::from(session.duration_minutes);
    }

    let mut breakdown: Vec<SubjectDuration> = totals
        .into_iter()
        .map(|(subject_name, total_minutes)| SubjectDuration {
            subject_name: subject_name.to_string(),
            total_minutes,
        })
        .collect();
    breakdown.sort_by(|left, right| {
        right
            .total_minutes
            .cmp(&left.total_minutes)
            .then_with(|| left.subject_name.cmp(&right.subject_name))
    });
    breakdown
}

/// Ties on total minutes go to the lexicographically smallest subject name.
pub fn most_studied_subject(sessions: &[StudySession], window: &TimeWindow) -> Option<String> {
    per_subject_durations(sessions, window)
        .into_iter()
        .next()
        .map(|entry| entry.subject_name)
}

pub fn summarize(sessions: &[StudySession], window: &TimeWindow) -> AggregateSummary {
    AggregateSummary {
        window_start: window.start,
        window_end: window.end,
        total_duration_minutes: total_duration(sessions, window),
        most_studied_subject: most_studied_subject(sessions, window),
        average_focus: average_focus(sessions, window),
    }
}

fn local_instant(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|value| value.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

pub fn start_of_local_day(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    local_instant(tz, date.and_time(NaiveTime::MIN))
}

pub fn end_of_local_day(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    start_of_local_day(tz, date + Duration::days(1)) - Duration::milliseconds(1)
}

pub fn current_week_window(now: DateTime<Utc>, tz: Tz) -> TimeWindow {
    let today = now.with_timezone(&tz).date_naive();
    let sunday = today - Duration::days(i64::from(today.weekday().num_days_from_sunday()));
    TimeWindow {
        start: start_of_local_day(tz, sunday),
        end: end_of_local_day(tz, today),
    }
}

pub fn last_seven_days_window(now: DateTime<Utc>, tz: Tz) -> TimeWindow {
    let today = now.with_timezone(&tz).date_naive();
    TimeWindow {
        start: start_of_local_day(tz, today - Duration::days(7)),
        end: end_of_local_day(tz, today),
    }
}
