//! Queries over committed sessions.

use tracing::warn;

use crate::store::{DocumentStore, PersistenceError, UserPaths};
use crate::types::{LogEntry, PersistedWorkoutSession};

/// All of a user's committed sessions, most recent first.
///
/// Documents that do not decode as sessions are skipped.
pub async fn load_sessions<S: DocumentStore>(
    store: &S,
    paths: &UserPaths,
) -> Result<Vec<PersistedWorkoutSession>, PersistenceError> {
    let docs = store.list(&paths.sessions()).await?;
    let mut sessions: Vec<PersistedWorkoutSession> = docs
        .into_iter()
        .filter_map(|(id, data)| {
            match serde_json::from_value::<PersistedWorkoutSession>(data) {
                Ok(mut session) => {
                    session.id = id;
                    Some(session)
                }
                Err(e) => {
                    warn!(session_id = %id, error = %e, "Skipping undecodable session document");
                    None
                }
            }
        })
        .collect();

    sessions.sort_by(|a, b| {
        b.timestamp()
            .cmp(&a.timestamp())
            .then_with(|| b.date.cmp(&a.date))
    });
    Ok(sessions)
}

/// Every entry logged for `exercise`, oldest first.
pub fn exercise_history(sessions: &[PersistedWorkoutSession], exercise: &str) -> Vec<LogEntry> {
    let mut entries: Vec<LogEntry> = sessions
        .iter()
        .filter_map(|s| s.logs.get(exercise))
        .flatten()
        .cloned()
        .collect();
    entries.sort_by(|a, b| {
        a.timestamp()
            .cmp(&b.timestamp())
            .then_with(|| a.date.cmp(&b.date))
    });
    entries
}

/// Heaviest weight ever logged for `exercise`.
pub fn personal_best(sessions: &[PersistedWorkoutSession], exercise: &str) -> Option<LogEntry> {
    sessions
        .iter()
        .filter_map(|s| s.logs.get(exercise))
        .flatten()
        .max_by(|a, b| a.weight.total_cmp(&b.weight))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDocumentStore;
    use serde_json::json;

    fn entry(date: &str, weight: f64) -> serde_json::Value {
        json!({"date": date, "weight": weight, "reps": 5, "sets": 3})
    }

    #[tokio::test]
    async fn test_load_sessions_sorted_and_tolerant() {
        let store = MemoryDocumentStore::new();
        let paths = UserPaths::new("app", "u1");
        store.insert(
            paths.session("a"),
            json!({"date": "2024-01-01T10:00:00.000Z", "logs": {"Squat": [entry("2024-01-01T10:00:00.000Z", 100.0)]}}),
        );
        store.insert(
            paths.session("b"),
            json!({"date": "2024-01-05T10:00:00.000Z", "logs": {"Squat": [entry("2024-01-05T10:00:00.000Z", 110.0)]}}),
        );
        store.insert(paths.session("broken"), json!({"logs": 3}));

        let sessions = load_sessions(&store, &paths).await.unwrap();
        let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_exercise_history_and_personal_best() {
        let store = MemoryDocumentStore::new();
        let paths = UserPaths::new("app", "u1");
        store.insert(
            paths.session("a"),
            json!({"date": "2024-01-05T10:00:00.000Z", "logs": {
                "Squat": [entry("2024-01-05T10:00:00.000Z", 110.0)],
                "Bench": [entry("2024-01-05T10:00:00.000Z", 70.0)]
            }}),
        );
        store.insert(
            paths.session("b"),
            json!({"date": "2024-01-01T10:00:00.000Z", "logs": {"Squat": [entry("2024-01-01T10:00:00.000Z", 120.0)]}}),
        );

        let sessions = load_sessions(&store, &paths).await.unwrap();
        let squats = exercise_history(&sessions, "Squat");
        assert_eq!(squats.len(), 2);
        assert_eq!(squats[0].date, "2024-01-01T10:00:00.000Z");
        assert_eq!(personal_best(&sessions, "Squat").unwrap().weight, 120.0);
        assert!(personal_best(&sessions, "Deadlift").is_none());
    }
}
