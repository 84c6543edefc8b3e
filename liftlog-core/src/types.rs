//! Data model shared by the session buffer, rate limiter and migrator.
//!
//! Field names serialize in camelCase so documents written here stay
//! readable by (and compatible with) the existing data set.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Exercise name -> entries logged for it.
///
/// Shared by the in-progress buffer and the persisted session document.
pub type SessionLogs = BTreeMap<String, Vec<LogEntry>>;

/// A single logged set group for one exercise.
///
/// `date` is the entry's identity within its exercise list and is kept as
/// the original ISO-8601 string so deletes and legacy grouping compare the
/// exact stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub date: String,
    pub weight: f64,
    pub reps: u32,
    pub sets: u32,
    #[serde(default)]
    pub rpe: Option<f64>,
}

impl LogEntry {
    pub fn new(at: DateTime<Utc>, weight: f64, reps: u32, sets: u32) -> Self {
        Self {
            date: iso_timestamp(at),
            weight,
            reps,
            sets,
            rpe: None,
        }
    }

    pub fn with_rpe(mut self, rpe: f64) -> Self {
        self.rpe = Some(rpe);
        self
    }

    /// Parse `date`; `None` when it is not RFC 3339.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.date)
    }
}

/// The local-only, not-yet-durable session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSession {
    #[serde(default)]
    pub logs: SessionLogs,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl PendingSession {
    pub fn is_empty(&self) -> bool {
        self.logs.values().all(Vec::is_empty)
    }

    pub fn entry_count(&self) -> usize {
        self.logs.values().map(Vec::len).sum()
    }

    /// Append `entry` under `exercise`. `started_at` is set once and never
    /// moved afterwards.
    pub fn add(&mut self, exercise: &str, entry: LogEntry, now: DateTime<Utc>) {
        self.started_at.get_or_insert(now);
        self.logs.entry(exercise.to_string()).or_default().push(entry);
    }

    /// Drop every entry of `exercise` whose `date` equals `date`. Empty lists
    /// are removed so the map never carries empty keys. Returns whether
    /// anything was removed.
    pub fn remove(&mut self, exercise: &str, date: &str) -> bool {
        let Some(entries) = self.logs.get_mut(exercise) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.date != date);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.logs.remove(exercise);
        }
        removed
    }
}

/// Caller-supplied details attached to a session when it is flushed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionMetadata {
    pub duration: Option<String>,
    pub routine_title: Option<String>,
}

/// A committed workout session. Written once, never edited by this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedWorkoutSession {
    #[serde(default)]
    pub id: String,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routine_title: Option<String>,
    #[serde(default)]
    pub logs: SessionLogs,
}

impl PersistedWorkoutSession {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.date)
    }
}

/// Daily quota counter, one document per (user, action).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitCounter {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
    #[serde(default)]
    pub last_action: Option<DateTime<Utc>>,
}

impl RateLimitCounter {
    /// A counter past its reset boundary counts as zero regardless of the
    /// stored `count`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.reset_at
    }

    pub fn effective_count(&self, now: DateTime<Utc>) -> u32 {
        if self.is_expired(now) {
            0
        } else {
            self.count
        }
    }
}

/// Render a timestamp the way stored documents spell it:
/// `2024-05-01T17:30:00.000Z`.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_iso_timestamp_uses_millis_and_z() {
        assert_eq!(iso_timestamp(at(17, 30)), "2024-05-01T17:30:00.000Z");
    }

    #[test]
    fn test_entry_timestamp_parses_js_style_dates() {
        let entry = LogEntry {
            date: "2024-05-01T17:30:00.000Z".to_string(),
            weight: 60.0,
            reps: 8,
            sets: 3,
            rpe: None,
        };
        assert_eq!(entry.timestamp(), Some(at(17, 30)));
    }

    #[test]
    fn test_pending_add_keeps_first_started_at() {
        let mut pending = PendingSession::default();
        pending.add("Squat", LogEntry::new(at(10, 0), 100.0, 5, 5), at(10, 0));
        pending.add("Squat", LogEntry::new(at(10, 5), 100.0, 5, 5), at(10, 5));
        assert_eq!(pending.started_at, Some(at(10, 0)));
        assert_eq!(pending.entry_count(), 2);
    }

    #[test]
    fn test_pending_remove_drops_empty_key() {
        let mut pending = PendingSession::default();
        let entry = LogEntry::new(at(10, 0), 100.0, 5, 5);
        pending.add("Squat", entry.clone(), at(10, 0));
        assert!(pending.remove("Squat", &entry.date));
        assert!(!pending.logs.contains_key("Squat"));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_pending_remove_unknown_is_noop() {
        let mut pending = PendingSession::default();
        pending.add("Bench", LogEntry::new(at(10, 0), 60.0, 8, 3), at(10, 0));
        assert!(!pending.remove("Squat", "2024-05-01T10:00:00.000Z"));
        assert!(!pending.remove("Bench", "2024-05-01T11:00:00.000Z"));
        assert_eq!(pending.entry_count(), 1);
    }

    #[test]
    fn test_pending_session_serializes_camel_case() {
        let mut pending = PendingSession::default();
        pending.add("Row", LogEntry::new(at(9, 0), 50.0, 10, 3), at(9, 0));
        let json = serde_json::to_value(&pending).unwrap();
        assert!(json.get("startedAt").is_some());
        assert!(json["logs"]["Row"].is_array());
    }

    #[test]
    fn test_counter_expiry_zeroes_effective_count() {
        let counter = RateLimitCounter {
            count: 4,
            reset_at: at(12, 0),
            last_action: None,
        };
        assert_eq!(counter.effective_count(at(11, 59)), 4);
        assert_eq!(counter.effective_count(at(12, 0)), 0);
    }
}
