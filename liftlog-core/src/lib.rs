//! Client-side workout session and quota layer.
//!
//! Three pieces share the same shape: a durable counter or log that has to
//! survive partial failure and network loss.
//!
//! - [`SessionBuffer`] accumulates workout sets locally and commits a whole
//!   session to the durable store in a single write.
//! - [`RateLimiter`] gates expensive AI calls against a per-user, per-action
//!   daily quota that resets at UTC midnight.
//! - [`LegacyMigrator`] rewrites the old single-document log schema into one
//!   document per workout session, in chunks that respect the batch ceiling.
//!
//! [`streak`] and [`history`] are pure derived views over committed sessions.
//!
//! All collaborators (durable store, local storage, clock) are passed in
//! explicitly; see [`store`].

pub mod history;
pub mod migration;
pub mod rate_limit;
pub mod session_buffer;
pub mod store;
pub mod streak;
pub mod types;

pub use migration::{LegacyMigrator, MigrationError, MigrationReport, MigrationStatus};
pub use rate_limit::{next_utc_midnight, AiAction, RateLimitDecision, RateLimitStatus, RateLimiter};
pub use session_buffer::SessionBuffer;
pub use store::{
    Clock, DocumentStore, FixedClock, LocalStorage, PersistenceError, SetOptions, SystemClock,
    UserPaths, WriteBatch,
};
pub use types::{
    iso_timestamp, LogEntry, PendingSession, PersistedWorkoutSession, RateLimitCounter,
    SessionLogs, SessionMetadata,
};
