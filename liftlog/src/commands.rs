//! Subcommand handlers.
//!
//! [`App`] owns the collaborators for one invocation: the SQLite document
//! store, the file-backed local storage and the system clock. Each handler
//! builds the component it needs on top of them.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Local, Utc};

use liftlog_core::history::{exercise_history, load_sessions, personal_best};
use liftlog_core::store::sqlite::{Database, SqliteDocumentStore};
use liftlog_core::store::FileLocalStorage;
use liftlog_core::streak::{current_streak, longest_streak, workout_days};
use liftlog_core::{
    iso_timestamp, AiAction, LegacyMigrator, LogEntry, RateLimiter, SessionBuffer,
    SessionMetadata, SystemClock, UserPaths,
};

use crate::config;

type Buffer = SessionBuffer<Arc<SqliteDocumentStore>, Arc<FileLocalStorage>, SystemClock>;

pub struct App {
    store: Arc<SqliteDocumentStore>,
    local: Arc<FileLocalStorage>,
    paths: UserPaths,
    ai_limit: u32,
}

impl App {
    pub async fn open(
        data_dir: &Path,
        app_id: String,
        user: String,
        ai_limit: u32,
    ) -> anyhow::Result<Self> {
        let db_path = config::database_path(data_dir);
        let db = Database::open(&db_path)
            .await
            .with_context(|| format!("opening database at {}", db_path.display()))?;

        Ok(Self {
            store: Arc::new(SqliteDocumentStore::new(&db)),
            local: Arc::new(FileLocalStorage::new(config::local_storage_dir(data_dir))),
            paths: UserPaths::new(app_id, user),
            ai_limit,
        })
    }

    /// One-time legacy migration, run before anything else touches the
    /// user's data. A failure blocks the command.
    pub async fn bootstrap(&self) -> anyhow::Result<()> {
        let status = LegacyMigrator::new(self.store.clone(), self.paths.clone())
            .bootstrap()
            .await;
        match status.error {
            Some(message) if !status.done => anyhow::bail!(message),
            _ => Ok(()),
        }
    }

    fn buffer(&self) -> Buffer {
        SessionBuffer::restore(
            self.store.clone(),
            self.local.clone(),
            SystemClock,
            self.paths.clone(),
        )
    }

    fn limiter(&self, action: AiAction) -> RateLimiter<Arc<SqliteDocumentStore>, SystemClock> {
        RateLimiter::for_action(
            self.store.clone(),
            SystemClock,
            &self.paths,
            action,
            self.ai_limit,
        )
    }

    pub fn log_add(
        &self,
        exercise: &str,
        weight: f64,
        reps: u32,
        sets: u32,
        rpe: Option<f64>,
    ) {
        let mut entry = LogEntry::new(Utc::now(), weight, reps, sets);
        entry.rpe = rpe;
        let date = entry.date.clone();
        let mut buffer = self.buffer();
        buffer.add_log(exercise, entry);
        println!(
            "Logged {exercise}: {weight} x {reps} x {sets} ({date}); {} entries pending",
            buffer.entry_count()
        );
    }

    pub fn log_remove(&self, exercise: &str, date: &str) {
        let mut buffer = self.buffer();
        let before = buffer.entry_count();
        buffer.remove_log_by_date(exercise, date);
        if buffer.entry_count() == before {
            println!("No {exercise} entry logged at {date}");
        } else {
            println!("Removed {exercise} entry at {date}");
        }
    }

    pub fn log_show(&self) {
        let buffer = self.buffer();
        let Some(started) = buffer.started_at().filter(|_| !buffer.is_empty()) else {
            println!("No workout in progress");
            return;
        };
        println!("Workout started {}", iso_timestamp(started));
        for (exercise, entries) in buffer.logs() {
            println!("  {exercise}");
            for e in entries {
                let rpe = e.rpe.map(|r| format!(" @{r}")).unwrap_or_default();
                println!("    {}  {} x {} x {}{rpe}", e.date, e.weight, e.reps, e.sets);
            }
        }
    }

    pub async fn session_finish(
        &self,
        routine_title: Option<String>,
        duration: Option<String>,
    ) -> anyhow::Result<()> {
        let mut buffer = self.buffer();
        let metadata = SessionMetadata {
            duration,
            routine_title,
        };
        match buffer.flush_session(metadata).await {
            Ok(Some(session)) => {
                println!(
                    "Saved session {} ({} exercises)",
                    session.id,
                    session.logs.len()
                );
                Ok(())
            }
            Ok(None) => {
                println!("Nothing to save");
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e).context(
                "Workout saved locally but not synced; run `session finish` again to retry",
            )),
        }
    }

    pub fn session_discard(&self) {
        let mut buffer = self.buffer();
        let discarded = buffer.entry_count();
        buffer.clear_session();
        println!("Discarded {discarded} pending entries");
    }

    pub async fn quota_status(&self, action: Option<AiAction>) {
        let actions = match action {
            Some(a) => vec![a],
            None => AiAction::ALL.to_vec(),
        };
        for action in actions {
            let status = self.limiter(action).check_rate_limit().await;
            println!(
                "{action}: {}/{} used, {} remaining, resets {}",
                status.count,
                status.limit,
                status.remaining,
                iso_timestamp(status.reset_at)
            );
        }
    }

    /// Consume one unit of quota the way an AI-gated feature does before
    /// calling out.
    pub async fn quota_use(&self, action: AiAction) {
        let decision = self.limiter(action).check_and_increment().await;
        if decision.allowed {
            println!(
                "{action}: allowed, {} remaining until {}",
                decision.remaining,
                iso_timestamp(decision.reset_at)
            );
        } else {
            println!(
                "{}",
                decision
                    .message
                    .unwrap_or_else(|| format!("{action}: daily limit reached"))
            );
            println!("Upgrade for a higher limit, or wait until the reset.");
        }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        let report = LegacyMigrator::new(self.store.clone(), self.paths.clone())
            .run()
            .await?;
        if report.skipped {
            println!("Nothing to migrate");
        } else {
            println!(
                "Migrated {} entries into {} sessions ({} batches)",
                report.entries_migrated, report.sessions_written, report.batches_committed
            );
        }
        Ok(())
    }

    pub async fn streak(&self) -> anyhow::Result<()> {
        let sessions = load_sessions(self.store.as_ref(), &self.paths).await?;
        let now = Local::now();
        let days = workout_days(&sessions, &Local);
        println!("Current streak: {} days", current_streak(&days, now.date_naive()));
        println!("Longest streak: {} days", longest_streak(&days));
        Ok(())
    }

    pub async fn history(&self, exercise: &str) -> anyhow::Result<()> {
        let sessions = load_sessions(self.store.as_ref(), &self.paths).await?;
        let entries = exercise_history(&sessions, exercise);
        if entries.is_empty() {
            println!("No history for {exercise}");
            return Ok(());
        }
        for e in &entries {
            println!("{}  {} x {} x {}", e.date, e.weight, e.reps, e.sets);
        }
        if let Some(best) = personal_best(&sessions, exercise) {
            println!("Best: {} on {}", best.weight, best.date);
        }
        Ok(())
    }
}
