//! Configuration for the liftlog CLI.
//!
//! Every value has a compiled default and can be overridden through an
//! environment variable:
//!
//! | Variable | Default |
//! |----------|---------|
//! | `LIFTLOG_DATA_DIR` | `$HOME/.config/liftlog/data`, else `./data` |
//! | `LIFTLOG_APP_ID` | `default-app-id` |
//! | `LIFTLOG_USER` | `local-user` |
//! | `LIFTLOG_DAILY_AI_LIMIT` | `5` |
//! | `LIFTLOG_LOG_DIR` | unset (log to stderr) |

use std::path::PathBuf;

const DEFAULT_CONFIG_DIR: &str = ".config/liftlog/data";
const DEV_DATA_DIR: &str = "./data";
const DEFAULT_APP_ID: &str = "default-app-id";
const DEFAULT_USER: &str = "local-user";
const DEFAULT_DAILY_AI_LIMIT: u32 = 5;

/// Get the data directory holding the database and local storage.
///
/// Priority:
/// 1. `LIFTLOG_DATA_DIR` env variable if set
/// 2. `$HOME/.config/liftlog/data` if HOME is set
/// 3. `./data` as fallback
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LIFTLOG_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(DEFAULT_CONFIG_DIR);
    }

    PathBuf::from(DEV_DATA_DIR)
}

/// Application-instance id that prefixes every document path.
pub fn get_app_id() -> String {
    std::env::var("LIFTLOG_APP_ID").unwrap_or_else(|_| DEFAULT_APP_ID.to_string())
}

/// User the CLI acts as when `--user` is not given.
pub fn get_user() -> String {
    std::env::var("LIFTLOG_USER").unwrap_or_else(|_| DEFAULT_USER.to_string())
}

/// Daily quota for each AI-gated action.
///
/// Falls back to the default when the variable cannot be parsed as a `u32`.
pub fn get_daily_ai_limit() -> u32 {
    parse_limit(std::env::var("LIFTLOG_DAILY_AI_LIMIT").ok().as_deref())
}

fn parse_limit(raw: Option<&str>) -> u32 {
    raw.and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_DAILY_AI_LIMIT)
}

/// Directory for rolling log files. `None` logs to stderr.
pub fn get_log_dir() -> Option<PathBuf> {
    std::env::var("LIFTLOG_LOG_DIR").ok().map(PathBuf::from)
}

pub fn database_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("liftlog.db")
}

pub fn local_storage_dir(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("local")
}
