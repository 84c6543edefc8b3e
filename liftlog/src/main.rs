//! liftlog - workout logging from the terminal.
//!
//! Sets are buffered on this device (`log add`) and committed to the
//! document database as one session when the workout ends
//! (`session finish`). AI-gated features share a daily quota that can be
//! inspected and consumed through `quota`.
//!
//! Every invocation first runs the one-time legacy log migration for the
//! selected user.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use liftlog_core::AiAction;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::App;

#[derive(Parser)]
#[command(name = "liftlog", about = "Local-first workout log with daily AI quotas")]
struct Cli {
    /// User id to act as (defaults to LIFTLOG_USER or `local-user`).
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Edit the workout in progress.
    Log {
        #[command(subcommand)]
        action: LogAction,
    },
    /// Finish or abandon the workout in progress.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Inspect or consume the daily AI quota.
    Quota {
        #[command(subcommand)]
        action: QuotaAction,
    },
    /// Run the legacy log migration explicitly and report what it did.
    Migrate,
    /// Show current and longest workout streaks.
    Streak,
    /// List every committed entry for one exercise.
    History { exercise: String },
}

#[derive(Subcommand)]
enum LogAction {
    /// Buffer one entry locally.
    Add {
        exercise: String,
        #[arg(long)]
        weight: f64,
        #[arg(long)]
        reps: u32,
        #[arg(long, default_value_t = 1)]
        sets: u32,
        #[arg(long)]
        rpe: Option<f64>,
    },
    /// Remove the entry logged at `date` (as printed by `log show`).
    Remove { exercise: String, date: String },
    /// Print the workout in progress.
    Show,
}

#[derive(Subcommand)]
enum SessionAction {
    /// Commit the buffered workout as one session.
    Finish {
        #[arg(long)]
        routine: Option<String>,
        #[arg(long)]
        duration: Option<String>,
    },
    /// Throw the buffered workout away. Cannot be undone.
    Discard,
}

#[derive(Subcommand)]
enum QuotaAction {
    /// Show usage without consuming anything.
    Status { action: Option<AiAction> },
    /// Consume one unit, as an AI-gated feature would.
    Use { action: AiAction },
}

fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match config::get_log_dir() {
        Some(log_dir) => {
            std::fs::create_dir_all(&log_dir).ok();
            let file_appender = tracing_appender::rolling::daily(log_dir, "liftlog");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true)
                        .with_line_number(true),
                )
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing();

    let data_dir = config::get_data_dir();
    let user = cli.user.unwrap_or_else(config::get_user);
    tracing::debug!(data_dir = %data_dir.display(), user = %user, "Starting liftlog");

    let app = App::open(
        &data_dir,
        config::get_app_id(),
        user,
        config::get_daily_ai_limit(),
    )
    .await?;

    if !matches!(cli.command, Commands::Migrate) {
        app.bootstrap().await?;
    }

    match cli.command {
        Commands::Log { action } => match action {
            LogAction::Add {
                exercise,
                weight,
                reps,
                sets,
                rpe,
            } => app.log_add(&exercise, weight, reps, sets, rpe),
            LogAction::Remove { exercise, date } => app.log_remove(&exercise, &date),
            LogAction::Show => app.log_show(),
        },
        Commands::Session { action } => match action {
            SessionAction::Finish { routine, duration } => {
                app.session_finish(routine, duration).await?
            }
            SessionAction::Discard => app.session_discard(),
        },
        Commands::Quota { action } => match action {
            QuotaAction::Status { action } => app.quota_status(action).await,
            QuotaAction::Use { action } => app.quota_use(action).await,
        },
        Commands::Migrate => app.migrate().await?,
        Commands::Streak => app.streak().await?,
        Commands::History { exercise } => app.history(&exercise).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_log_add() {
        let cli = Cli::try_parse_from([
            "liftlog", "log", "add", "Squat", "--weight", "100", "--reps", "5", "--sets", "3",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Log {
                action: LogAction::Add { reps: 5, sets: 3, .. }
            }
        ));
    }

    #[test]
    fn test_cli_parses_quota_action() {
        let cli = Cli::try_parse_from(["liftlog", "--user", "u9", "quota", "use", "coach"]).unwrap();
        assert_eq!(cli.user.as_deref(), Some("u9"));
        assert!(matches!(
            cli.command,
            Commands::Quota {
                action: QuotaAction::Use {
                    action: AiAction::CoachAdvice
                }
            }
        ));
    }

    #[test]
    fn test_cli_rejects_unknown_quota_action() {
        assert!(Cli::try_parse_from(["liftlog", "quota", "use", "billing"]).is_err());
    }
}
