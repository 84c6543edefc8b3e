//! One-time rewrite of the legacy single-document log into one document per
//! workout session.
//!
//! The legacy schema had no session concept, so sessions are rebuilt from
//! the timestamps entries were logged under: every entry (across every
//! exercise) sharing a timestamp becomes one session document whose id is
//! that timestamp. Session writes are plain `set`s by id, so replaying the
//! migration overwrites rather than duplicates.
//!
//! Writes go out in sequential batches of at most [`MIGRATION_CHUNK_SIZE`]
//! sessions. The `migratedToSessions` flag rides in the same batch as the
//! final chunk, so it is only ever written once every session is durable.
//! Chunks must stay sequential for that to hold.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::store::{DocumentStore, PersistenceError, SetOptions, UserPaths, WriteBatch};
use crate::types::{iso_timestamp, parse_timestamp, LogEntry, PersistedWorkoutSession, SessionLogs};

/// Session writes per batch; leaves headroom under the 500-operation ceiling
/// for the completion flag.
pub const MIGRATION_CHUNK_SIZE: usize = 490;

const MIGRATED_FLAG: &str = "migratedToSessions";
const NESTED_LOGS_KEY: &str = "logs";

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("Failed to encode session: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Malformed legacy log document: {0}")]
    MalformedLegacyDocument(String),
}

impl MigrationError {
    /// What the user is shown; the run is retried on the next load.
    pub fn user_message(&self) -> &'static str {
        "Error processing historical workouts. Reload to try again."
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Nothing to do: no legacy document, or already migrated.
    pub skipped: bool,
    pub sessions_written: usize,
    pub entries_migrated: usize,
    pub batches_committed: usize,
}

/// The `done`/`error` pair surfaced to the application shell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationStatus {
    pub done: bool,
    pub error: Option<String>,
}

/// Which of the two legacy layouts a document used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyShape {
    /// `{ logs: { exercise: [...] }, coachAdvice? }`
    Nested,
    /// `{ exercise: [...], ..., coachAdvice? }`
    Flat,
}

/// A legacy document resolved into the canonical log map plus whatever
/// metadata sat next to it.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyLogDocument {
    pub shape: LegacyShape,
    pub logs: SessionLogs,
    pub metadata: Map<String, Value>,
    pub migrated: bool,
}

impl LegacyLogDocument {
    pub fn from_value(value: Value) -> Result<Self, MigrationError> {
        let Value::Object(mut fields) = value else {
            return Err(MigrationError::MalformedLegacyDocument(
                "expected an object".to_string(),
            ));
        };

        let migrated = matches!(fields.remove(MIGRATED_FLAG), Some(Value::Bool(true)));

        let (shape, raw_logs) = match fields.remove(NESTED_LOGS_KEY) {
            Some(Value::Object(nested)) => (LegacyShape::Nested, nested),
            other => {
                // An array under "logs" in a flat document is an exercise.
                if let Some(value) = other {
                    fields.insert(NESTED_LOGS_KEY.to_string(), value);
                }
                let (lists, metadata): (Map<String, Value>, Map<String, Value>) =
                    fields.into_iter().partition(|(_, v)| v.is_array());
                fields = metadata;
                (LegacyShape::Flat, lists)
            }
        };

        let mut logs = SessionLogs::new();
        for (exercise, value) in raw_logs {
            let Value::Array(items) = value else {
                warn!(exercise = %exercise, "Skipping non-list value in legacy logs");
                continue;
            };
            let entries = items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    serde_json::from_value::<LogEntry>(item).map_err(|e| {
                        MigrationError::MalformedLegacyDocument(format!(
                            "entry {i} of '{exercise}': {e}"
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            if !entries.is_empty() {
                logs.insert(exercise, entries);
            }
        }

        Ok(Self {
            shape,
            logs,
            metadata: fields,
            migrated,
        })
    }

    pub fn entry_count(&self) -> usize {
        self.logs.values().map(Vec::len).sum()
    }

    /// The document that replaces the legacy one once migration finishes.
    fn completed(&self) -> Value {
        let mut done = self.metadata.clone();
        done.insert(MIGRATED_FLAG.to_string(), Value::Bool(true));
        Value::Object(done)
    }
}

/// Document id for the session reconstructed from `date`.
///
/// Parseable timestamps are normalized so equivalent spellings of the same
/// instant land in one session. Anything else (empty, free text, `1/2/2024`)
/// gets a name-based UUID of the raw string: stable across replays and
/// always a valid path segment.
pub fn session_id_for(date: &str) -> String {
    match parse_timestamp(date) {
        Some(at) => iso_timestamp(at),
        None => format!(
            "legacy-{}",
            Uuid::new_v5(&Uuid::NAMESPACE_OID, date.as_bytes()).simple()
        ),
    }
}

/// Regroup every entry by the session its timestamp identifies.
pub fn group_into_sessions(logs: &SessionLogs) -> Vec<PersistedWorkoutSession> {
    let mut sessions: BTreeMap<String, PersistedWorkoutSession> = BTreeMap::new();
    for (exercise, entries) in logs {
        for entry in entries {
            let id = session_id_for(&entry.date);
            let session = sessions
                .entry(id.clone())
                .or_insert_with(|| PersistedWorkoutSession {
                    id,
                    date: entry.date.clone(),
                    duration: None,
                    routine_title: None,
                    logs: SessionLogs::new(),
                });
            session
                .logs
                .entry(exercise.clone())
                .or_default()
                .push(entry.clone());
        }
    }
    sessions.into_values().collect()
}

pub struct LegacyMigrator<S> {
    store: S,
    paths: UserPaths,
}

impl<S: DocumentStore> LegacyMigrator<S> {
    pub fn new(store: S, paths: UserPaths) -> Self {
        Self { store, paths }
    }

    /// Run the migration and reduce the outcome to the status the shell
    /// shows. Failures leave the legacy document unflagged for a retry.
    pub async fn bootstrap(&self) -> MigrationStatus {
        match self.run().await {
            Ok(_) => MigrationStatus {
                done: true,
                error: None,
            },
            Err(e) => {
                error!(uid = self.paths.uid(), error = %e, "Legacy log migration failed");
                MigrationStatus {
                    done: false,
                    error: Some(e.user_message().to_string()),
                }
            }
        }
    }

    pub async fn run(&self) -> Result<MigrationReport, MigrationError> {
        let legacy_path = self.paths.legacy_logs();
        let Some(raw) = self.store.get(&legacy_path).await? else {
            return Ok(MigrationReport {
                skipped: true,
                ..Default::default()
            });
        };

        let legacy = LegacyLogDocument::from_value(raw)?;
        if legacy.migrated {
            return Ok(MigrationReport {
                skipped: true,
                ..Default::default()
            });
        }

        info!(
            uid = self.paths.uid(),
            shape = ?legacy.shape,
            exercises = legacy.logs.len(),
            entries = legacy.entry_count(),
            "Starting legacy log migration"
        );

        if legacy.logs.is_empty() {
            self.store
                .set(&legacy_path, legacy.completed(), SetOptions::default())
                .await?;
            info!(
                uid = self.paths.uid(),
                "Legacy log document had no entries; flagged as migrated"
            );
            return Ok(MigrationReport::default());
        }

        let sessions = group_into_sessions(&legacy.logs);
        let chunk_count = sessions.len().div_ceil(MIGRATION_CHUNK_SIZE);
        let mut report = MigrationReport {
            entries_migrated: legacy.entry_count(),
            ..Default::default()
        };

        for (index, chunk) in sessions.chunks(MIGRATION_CHUNK_SIZE).enumerate() {
            let mut batch = WriteBatch::new();
            for session in chunk {
                batch.set(self.paths.session(&session.id), serde_json::to_value(session)?);
            }
            let is_last = index + 1 == chunk_count;
            if is_last {
                batch.set(legacy_path.clone(), legacy.completed());
            }

            self.store.commit(batch).await?;
            report.batches_committed += 1;
            report.sessions_written += chunk.len();
            info!(
                chunk = index + 1,
                of = chunk_count,
                sessions = chunk.len(),
                "Committed migration chunk"
            );
        }

        info!(
            uid = self.paths.uid(),
            sessions = report.sessions_written,
            entries = report.entries_migrated,
            batches = report.batches_committed,
            "Legacy log migration completed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDocumentStore;
    use serde_json::json;
    use std::sync::Arc;

    fn entry(date: &str, weight: f64) -> Value {
        json!({"date": date, "weight": weight, "reps": 5, "sets": 3, "rpe": null})
    }

    fn migrator() -> (LegacyMigrator<Arc<MemoryDocumentStore>>, Arc<MemoryDocumentStore>, UserPaths) {
        let store = Arc::new(MemoryDocumentStore::new());
        let paths = UserPaths::new("app", "u1");
        (LegacyMigrator::new(store.clone(), paths.clone()), store, paths)
    }

    #[test]
    fn test_parse_nested_shape() {
        let doc = LegacyLogDocument::from_value(json!({
            "logs": {"Squat": [entry("2024-01-01T10:00:00.000Z", 100.0)]},
            "coachAdvice": "Sleep more"
        }))
        .unwrap();
        assert_eq!(doc.shape, LegacyShape::Nested);
        assert_eq!(doc.logs["Squat"].len(), 1);
        assert_eq!(doc.metadata["coachAdvice"], "Sleep more");
        assert!(!doc.migrated);
    }

    #[test]
    fn test_parse_flat_shape_separates_metadata_by_value_shape() {
        let doc = LegacyLogDocument::from_value(json!({
            "Squat": [entry("2024-01-01T10:00:00.000Z", 100.0)],
            "Bench": [],
            "coachAdvice": "Eat more",
            "units": "kg",
            "migratedToSessions": false
        }))
        .unwrap();
        assert_eq!(doc.shape, LegacyShape::Flat);
        assert_eq!(doc.logs.keys().collect::<Vec<_>>(), vec!["Squat"]);
        assert_eq!(doc.metadata.len(), 2);
        assert!(!doc.metadata.contains_key("Bench"));
    }

    #[test]
    fn test_parse_flat_exercise_named_logs() {
        let doc = LegacyLogDocument::from_value(json!({
            "logs": [entry("2024-01-01T10:00:00.000Z", 1.0)]
        }))
        .unwrap();
        assert_eq!(doc.shape, LegacyShape::Flat);
        assert_eq!(doc.logs["logs"].len(), 1);
    }

    #[test]
    fn test_parse_rejects_malformed_entry() {
        let err = LegacyLogDocument::from_value(json!({
            "Squat": [{"weight": 100}]
        }))
        .unwrap_err();
        assert!(matches!(err, MigrationError::MalformedLegacyDocument(_)));
    }

    #[test]
    fn test_group_by_shared_timestamp() {
        let doc = LegacyLogDocument::from_value(json!({
            "Squat": [entry("2024-01-01T10:00:00.000Z", 100.0), entry("2024-01-03T10:00:00.000Z", 105.0)],
            "Bench": [entry("2024-01-01T10:00:00.000Z", 60.0)],
            "Row": [entry("2024-01-01T10:00:00Z", 50.0)]
        }))
        .unwrap();
        let sessions = group_into_sessions(&doc.logs);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, "2024-01-01T10:00:00.000Z");
        assert_eq!(sessions[0].logs.len(), 3);
        assert_eq!(sessions[1].logs["Squat"][0].weight, 105.0);
    }

    #[test]
    fn test_unparseable_dates_get_stable_path_safe_ids() {
        for raw in ["1/2/2024", "", "..", "yesterday"] {
            let id = session_id_for(raw);
            assert!(id.starts_with("legacy-"), "{raw:?} -> {id}");
            assert!(!id.contains('/'));
            assert_eq!(id, session_id_for(raw));
        }
        assert_ne!(session_id_for(""), session_id_for("1/2/2024"));
    }

    #[tokio::test]
    async fn test_entry_with_empty_date_migrates_and_converges() {
        let (migrator, store, paths) = migrator();
        store.insert(
            paths.legacy_logs(),
            json!({"Squat": [entry("2024-01-01T10:00:00.000Z", 100.0), entry("", 90.0)]}),
        );

        let report = migrator.run().await.unwrap();
        assert_eq!(report.sessions_written, 2);
        let undated = store.document(&paths.session(&session_id_for(""))).unwrap();
        assert_eq!(undated["logs"]["Squat"][0]["weight"], 90.0);
        assert_eq!(undated["date"], "");
        assert!(migrator.run().await.unwrap().skipped);
        assert_eq!(store.collection_len(&paths.sessions()), 2);
    }

    #[test]
    fn test_encode_errors_convert() {
        let err: MigrationError = serde_json::from_str::<Value>("{").unwrap_err().into();
        assert!(matches!(err, MigrationError::Encode(_)));
        assert!(err.user_message().contains("Reload"));
    }

    #[tokio::test]
    async fn test_missing_document_is_done() {
        let (migrator, store, _) = migrator();
        let report = migrator.run().await.unwrap();
        assert!(report.skipped);
        assert_eq!(store.commit_count(), 0);
        assert!(migrator.bootstrap().await.done);
    }

    #[tokio::test]
    async fn test_flagged_document_is_not_reprocessed() {
        let (migrator, store, paths) = migrator();
        store.insert(
            paths.legacy_logs(),
            json!({"Squat": [entry("2024-01-01T10:00:00.000Z", 100.0)], "migratedToSessions": true}),
        );
        let report = migrator.run().await.unwrap();
        assert!(report.skipped);
        assert_eq!(store.collection_len(&paths.sessions()), 0);
    }

    #[tokio::test]
    async fn test_empty_logs_only_sets_flag() {
        let (migrator, store, paths) = migrator();
        store.insert(paths.legacy_logs(), json!({"logs": {}, "coachAdvice": "Hydrate"}));
        migrator.run().await.unwrap();
        assert_eq!(
            store.document(&paths.legacy_logs()),
            Some(json!({"coachAdvice": "Hydrate", "migratedToSessions": true}))
        );
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_migration_writes_sessions_and_flag_together() {
        let (migrator, store, paths) = migrator();
        store.insert(
            paths.legacy_logs(),
            json!({
                "Squat": [entry("2024-01-01T10:00:00.000Z", 100.0)],
                "Bench": [entry("2024-01-01T10:00:00.000Z", 60.0), entry("2024-01-02T10:00:00.000Z", 62.5)],
                "coachAdvice": "Keep going"
            }),
        );

        let report = migrator.run().await.unwrap();
        assert_eq!(report.sessions_written, 2);
        assert_eq!(report.entries_migrated, 3);
        assert_eq!(report.batches_committed, 1);

        let first = store.document(&paths.session("2024-01-01T10:00:00.000Z")).unwrap();
        assert_eq!(first["logs"]["Squat"][0]["weight"], 100.0);
        assert_eq!(first["logs"]["Bench"][0]["weight"], 60.0);
        assert_eq!(
            store.document(&paths.legacy_logs()),
            Some(json!({"coachAdvice": "Keep going", "migratedToSessions": true}))
        );
    }

    #[tokio::test]
    async fn test_read_failure_surfaces_user_message() {
        let (migrator, store, paths) = migrator();
        store.insert(paths.legacy_logs(), json!({"Squat": [entry("2024-01-01T10:00:00.000Z", 1.0)]}));
        store.fail_next_reads(1);
        let status = migrator.bootstrap().await;
        assert!(!status.done);
        assert!(status.error.unwrap().contains("historical workouts"));
    }
}
