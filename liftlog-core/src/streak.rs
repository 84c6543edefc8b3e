//! Consecutive-day streaks over committed sessions.
//!
//! Works on distinct calendar days only, so a session flushed twice (see
//! [`crate::session_buffer`]) does not inflate anything here.

use chrono::{DateTime, NaiveDate, TimeZone};
use std::collections::BTreeSet;

use crate::types::PersistedWorkoutSession;

/// Calendar days in `tz` on which any entry was logged.
///
/// Entries with an unparseable date fall back to their session's date.
pub fn workout_days<Tz: TimeZone>(
    sessions: &[PersistedWorkoutSession],
    tz: &Tz,
) -> BTreeSet<NaiveDate> {
    let mut days = BTreeSet::new();
    for session in sessions {
        let fallback = session.timestamp();
        for entry in session.logs.values().flatten() {
            if let Some(at) = entry.timestamp().or(fallback) {
                days.insert(at.with_timezone(tz).date_naive());
            }
        }
    }
    days
}

/// Length of the run of consecutive days ending today or yesterday.
///
/// Zero when the most recent workout is older than yesterday. Days after
/// `today` are ignored.
pub fn current_streak(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let Some(&latest) = days.range(..=today).next_back() else {
        return 0;
    };
    if today.pred_opt().is_some_and(|yesterday| latest < yesterday) {
        return 0;
    }

    let mut streak = 1;
    let mut prev = latest;
    for &day in days.range(..latest).rev() {
        if prev.pred_opt() != Some(day) {
            break;
        }
        streak += 1;
        prev = day;
    }
    streak
}

/// Longest run of consecutive days anywhere in `days`.
pub fn longest_streak(days: &BTreeSet<NaiveDate>) -> u32 {
    let mut best = 0;
    let mut run = 0;
    let mut prev: Option<NaiveDate> = None;
    for &day in days {
        run = match prev {
            Some(p) if p.succ_opt() == Some(day) => run + 1,
            _ => 1,
        };
        best = best.max(run);
        prev = Some(day);
    }
    best
}

/// Current streak as seen at `now`, in `now`'s time zone.
pub fn streak_at<Tz: TimeZone>(sessions: &[PersistedWorkoutSession], now: &DateTime<Tz>) -> u32 {
    let days = workout_days(sessions, &now.timezone());
    current_streak(&days, now.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LogEntry, SessionLogs};
    use chrono::{Duration, FixedOffset, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn days(list: &[u32]) -> BTreeSet<NaiveDate> {
        list.iter().map(|&d| day(d)).collect()
    }

    #[test]
    fn test_today_and_yesterday() {
        assert_eq!(current_streak(&days(&[9, 10]), day(10)), 2);
    }

    #[test]
    fn test_gap_breaks_chain() {
        assert_eq!(current_streak(&days(&[7, 10]), day(10)), 1);
    }

    #[test]
    fn test_no_logs() {
        assert_eq!(current_streak(&BTreeSet::new(), day(10)), 0);
    }

    #[test]
    fn test_streak_alive_until_yesterday() {
        assert_eq!(current_streak(&days(&[7, 8, 9]), day(10)), 3);
        assert_eq!(current_streak(&days(&[7, 8]), day(10)), 0);
    }

    #[test]
    fn test_future_days_ignored() {
        assert_eq!(current_streak(&days(&[9, 10, 12]), day(10)), 2);
    }

    #[test]
    fn test_longest_streak() {
        assert_eq!(longest_streak(&days(&[1, 2, 3, 5, 6, 9])), 3);
        assert_eq!(longest_streak(&BTreeSet::new()), 0);
    }

    fn session(at: DateTime<Utc>) -> PersistedWorkoutSession {
        let mut logs = SessionLogs::new();
        logs.insert("Squat".to_string(), vec![LogEntry::new(at, 100.0, 5, 5)]);
        PersistedWorkoutSession {
            id: at.timestamp().to_string(),
            date: crate::types::iso_timestamp(at),
            duration: None,
            routine_title: None,
            logs,
        }
    }

    #[test]
    fn test_duplicate_sessions_count_once() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 20, 0, 0).unwrap();
        let sessions = vec![
            session(now),
            session(now),
            session(now - Duration::days(1)),
        ];
        assert_eq!(workout_days(&sessions, &Utc).len(), 2);
        assert_eq!(streak_at(&sessions, &now), 2);
    }

    #[test]
    fn test_days_follow_time_zone() {
        // 23:30 UTC on the 9th is already the 10th at UTC+2.
        let at = Utc.with_ymd_and_hms(2024, 6, 9, 23, 30, 0).unwrap();
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let days = workout_days(&[session(at)], &plus_two);
        assert_eq!(days.into_iter().collect::<Vec<_>>(), vec![day(10)]);
    }
}
