//! Local-first buffer for the workout session in progress.
//!
//! Entries are appended and removed without any network I/O; after every
//! mutation the whole [`PendingSession`] is mirrored to [`LocalStorage`] so a
//! reload or crash mid-workout loses nothing. [`SessionBuffer::flush_session`]
//! is the only path to the durable store: one `add` for the whole session.
//!
//! Local state is cleared only after the durable write succeeds. A crash
//! between that write and the local clear can resubmit the session on the
//! next flush; because the write is an `add`, that yields a duplicate
//! session document rather than a corrupted one.

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::store::{Clock, DocumentStore, LocalStorage, PersistenceError, SetOptions, UserPaths};
use crate::types::{
    iso_timestamp, LogEntry, PendingSession, PersistedWorkoutSession, SessionLogs,
    SessionMetadata,
};

/// Local storage key holding one user's pending session on this device.
pub fn pending_session_key(uid: &str) -> String {
    format!("liftlog.pendingSession.{uid}")
}

/// Body of a session document; the id comes from the store.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionDocument<'a> {
    date: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    routine_title: Option<&'a str>,
    logs: &'a SessionLogs,
}

pub struct SessionBuffer<S, L, C> {
    store: S,
    local: L,
    clock: C,
    paths: UserPaths,
    key: String,
    pending: PendingSession,
}

impl<S, L, C> SessionBuffer<S, L, C>
where
    S: DocumentStore,
    L: LocalStorage,
    C: Clock,
{
    /// Build the buffer, adopting any non-empty pending session left in
    /// local storage by an earlier run. Corrupt local data is discarded.
    pub fn restore(store: S, local: L, clock: C, paths: UserPaths) -> Self {
        let key = pending_session_key(paths.uid());
        let pending = load_pending(&local, &key);
        if !pending.is_empty() {
            info!(
                uid = paths.uid(),
                entries = pending.entry_count(),
                "Recovered pending workout session"
            );
        }
        Self {
            store,
            local,
            clock,
            paths,
            key,
            pending,
        }
    }

    pub fn logs(&self) -> &SessionLogs {
        &self.pending.logs
    }

    pub fn pending(&self) -> &PendingSession {
        &self.pending
    }

    pub fn started_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.pending.started_at
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn entry_count(&self) -> usize {
        self.pending.entry_count()
    }

    /// Append an entry. Never touches the network.
    pub fn add_log(&mut self, exercise: &str, entry: LogEntry) {
        let duplicate = self
            .pending
            .logs
            .get(exercise)
            .is_some_and(|entries| entries.iter().any(|e| e.date == entry.date));
        if duplicate {
            // Removal by date would take both entries with it.
            warn!(exercise, date = %entry.date, "Entry shares its date with an existing entry");
        }
        self.pending.add(exercise, entry, self.clock.now());
        debug!(exercise, entries = self.pending.entry_count(), "Buffered log entry");
        self.mirror();
    }

    /// Remove every entry of `exercise` whose date matches `entry.date`.
    pub fn remove_log(&mut self, exercise: &str, entry: &LogEntry) {
        self.remove_log_by_date(exercise, &entry.date);
    }

    pub fn remove_log_by_date(&mut self, exercise: &str, date: &str) {
        if self.pending.remove(exercise, date) {
            debug!(exercise, date, "Removed buffered log entry");
            self.mirror();
        }
    }

    /// Commit the buffered session with a single durable `add`.
    ///
    /// Returns `Ok(None)` without writing when the buffer is empty. On error
    /// the buffer and its local mirror are left exactly as they were.
    pub async fn flush_session(
        &mut self,
        metadata: SessionMetadata,
    ) -> Result<Option<PersistedWorkoutSession>, PersistenceError> {
        if self.pending.is_empty() {
            return Ok(None);
        }

        let date = iso_timestamp(self.clock.now());
        let document = SessionDocument {
            date: &date,
            duration: metadata.duration.as_deref(),
            routine_title: metadata.routine_title.as_deref(),
            logs: &self.pending.logs,
        };
        let body = serde_json::to_value(&document)?;

        let id = match self.store.add(&self.paths.sessions(), body).await {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    error = %e,
                    entries = self.pending.entry_count(),
                    "Session flush failed; kept locally"
                );
                return Err(e);
            }
        };

        let marker = json!({ "lastWorkoutAt": date, "lastSessionId": id });
        if let Err(e) = self
            .store
            .set(&self.paths.activity(), marker, SetOptions::merge())
            .await
        {
            warn!(error = %e, "Failed to update last-activity marker");
        }

        let pending = std::mem::take(&mut self.pending);
        self.forget_local();

        info!(
            session_id = %id,
            exercises = pending.logs.len(),
            entries = pending.entry_count(),
            "Flushed workout session"
        );

        Ok(Some(PersistedWorkoutSession {
            id,
            date,
            duration: metadata.duration,
            routine_title: metadata.routine_title,
            logs: pending.logs,
        }))
    }

    /// Drop the buffered session without writing it anywhere.
    pub fn clear_session(&mut self) {
        let discarded = self.pending.entry_count();
        self.pending = PendingSession::default();
        self.forget_local();
        info!(discarded, "Discarded pending workout session");
    }

    fn mirror(&self) {
        let result = serde_json::to_string(&self.pending)
            .map_err(PersistenceError::from)
            .and_then(|json| self.local.set_item(&self.key, &json));
        if let Err(e) = result {
            warn!(error = %e, key = %self.key, "Failed to mirror pending session locally");
        }
    }

    fn forget_local(&self) {
        if let Err(e) = self.local.remove_item(&self.key) {
            warn!(error = %e, key = %self.key, "Failed to clear local pending session");
        }
    }
}

fn load_pending<L: LocalStorage>(local: &L, key: &str) -> PendingSession {
    let raw = match local.get_item(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return PendingSession::default(),
        Err(e) => {
            warn!(error = %e, key, "Failed to read local pending session");
            return PendingSession::default();
        }
    };

    match serde_json::from_str::<PendingSession>(&raw) {
        Ok(pending) if !pending.is_empty() => pending,
        Ok(_) => PendingSession::default(),
        Err(e) => {
            warn!(error = %e, key, "Discarding corrupt local pending session");
            if let Err(e) = local.remove_item(key) {
                warn!(error = %e, key, "Failed to remove corrupt pending session");
            }
            PendingSession::default()
        }
    }
}
