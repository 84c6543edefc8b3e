//! Per-user, per-action daily quota for expensive AI calls.
//!
//! One [`RateLimitCounter`] document per (user, action). Windows end at the
//! next UTC midnight, not 24 hours after first use.
//!
//! The check is read-then-write, not a transaction: two devices calling at
//! the same moment can both read `limit - 1` and both proceed, so the limit
//! is soft by one per racing writer. Hard enforcement belongs on the server
//! with an atomic increment.
//!
//! Store failures never block the caller. Only a genuinely exhausted quota
//! produces a denial, and that is a normal return value.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::store::{Clock, DocumentStore, PersistenceError, SetOptions, UserPaths};
use crate::types::{iso_timestamp, RateLimitCounter};

/// AI-backed features gated by a daily quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AiAction {
    RoutineGeneration,
    CoachAdvice,
    MealAnalysis,
}

impl AiAction {
    pub const ALL: [AiAction; 3] = [
        AiAction::RoutineGeneration,
        AiAction::CoachAdvice,
        AiAction::MealAnalysis,
    ];

    /// Document id of this action's counter.
    pub fn key(self) -> &'static str {
        match self {
            AiAction::RoutineGeneration => "routine",
            AiAction::CoachAdvice => "coach",
            AiAction::MealAnalysis => "meal",
        }
    }
}

impl fmt::Display for AiAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for AiAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AiAction::ALL
            .into_iter()
            .find(|a| a.key() == s)
            .ok_or_else(|| format!("unknown action '{s}' (expected routine, coach or meal)"))
    }
}

/// Outcome of [`RateLimiter::check_and_increment`].
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    /// Set on denial; suitable for showing to the user.
    pub message: Option<String>,
}

/// Side-effect-free view of a counter.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitStatus {
    pub count: u32,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Start of the next UTC calendar day after `now`.
///
/// Both the read path and the write path go through this, so they always
/// agree on where the current window ends.
pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .succ_opt()
        .unwrap_or(NaiveDate::MAX)
        .and_time(NaiveTime::MIN)
        .and_utc()
}

pub struct RateLimiter<S, C> {
    store: S,
    clock: C,
    path: String,
    action: String,
    limit: u32,
}

impl<S: DocumentStore, C: Clock> RateLimiter<S, C> {
    pub fn new(
        store: S,
        clock: C,
        paths: &UserPaths,
        action: &str,
        limit: u32,
    ) -> Self {
        Self {
            store,
            clock,
            path: paths.rate_limit(action),
            action: action.to_string(),
            limit,
        }
    }

    pub fn for_action(
        store: S,
        clock: C,
        paths: &UserPaths,
        action: AiAction,
        limit: u32,
    ) -> Self {
        Self::new(store, clock, paths, action.key(), limit)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Consume one unit of quota if any is left.
    ///
    /// Returns `allowed == false` only when the quota for the current window
    /// is used up; in that case nothing is written.
    pub async fn check_and_increment(&self) -> RateLimitDecision {
        let now = self.clock.now();

        if self.limit == 0 {
            return self.denied(next_utc_midnight(now));
        }

        let counter = match self.read().await {
            Ok(counter) => counter,
            Err(e) => {
                warn!(error = %e, action = %self.action, "Rate limit read failed; allowing");
                return self.fail_open(now);
            }
        };

        let next = match counter.filter(|c| !c.is_expired(now)) {
            None => RateLimitCounter {
                count: 1,
                reset_at: next_utc_midnight(now),
                last_action: Some(now),
            },
            Some(active) if active.count < self.limit => RateLimitCounter {
                count: active.count + 1,
                reset_at: active.reset_at,
                last_action: Some(now),
            },
            Some(active) => {
                info!(
                    action = %self.action,
                    count = active.count,
                    limit = self.limit,
                    "Daily limit reached"
                );
                return self.denied(active.reset_at);
            }
        };

        if let Err(e) = self.write(&next).await {
            warn!(error = %e, action = %self.action, "Rate limit write failed; allowing");
        } else {
            debug!(action = %self.action, count = next.count, "Rate limit incremented");
        }

        RateLimitDecision {
            allowed: true,
            remaining: self.limit.saturating_sub(next.count),
            reset_at: next.reset_at,
            message: None,
        }
    }

    /// Current usage without consuming anything.
    pub async fn check_rate_limit(&self) -> RateLimitStatus {
        let now = self.clock.now();
        let active = match self.read().await {
            Ok(counter) => counter.filter(|c| !c.is_expired(now)),
            Err(e) => {
                warn!(error = %e, action = %self.action, "Rate limit status read failed");
                None
            }
        };

        let (count, reset_at) = match active {
            Some(c) => (c.count, c.reset_at),
            None => (0, next_utc_midnight(now)),
        };
        RateLimitStatus {
            count,
            limit: self.limit,
            remaining: self.limit.saturating_sub(count),
            reset_at,
        }
    }

    /// Give back one unit after the gated call itself failed.
    ///
    /// Never goes below zero and never touches an expired window. Errors are
    /// logged and otherwise ignored.
    pub async fn refund(&self) {
        let now = self.clock.now();
        let active = match self.read().await {
            Ok(counter) => counter.filter(|c| !c.is_expired(now) && c.count > 0),
            Err(e) => {
                warn!(error = %e, action = %self.action, "Rate limit refund read failed");
                return;
            }
        };
        let Some(mut counter) = active else {
            return;
        };
        counter.count -= 1;
        if let Err(e) = self.write(&counter).await {
            warn!(error = %e, action = %self.action, "Rate limit refund write failed");
        }
    }

    async fn read(&self) -> Result<Option<RateLimitCounter>, PersistenceError> {
        let Some(doc) = self.store.get(&self.path).await? else {
            return Ok(None);
        };
        match serde_json::from_value::<RateLimitCounter>(doc) {
            Ok(counter) => Ok(Some(counter)),
            Err(e) => {
                // Unreadable counters start a fresh window.
                warn!(error = %e, path = %self.path, "Ignoring malformed rate limit counter");
                Ok(None)
            }
        }
    }

    async fn write(&self, counter: &RateLimitCounter) -> Result<(), PersistenceError> {
        let data: Value = serde_json::to_value(counter)?;
        self.store.set(&self.path, data, SetOptions::default()).await
    }

    fn denied(&self, reset_at: DateTime<Utc>) -> RateLimitDecision {
        RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset_at,
            message: Some(format!(
                "You have reached the limit of {} per day for {}. Resets at {}.",
                self.limit,
                self.action,
                iso_timestamp(reset_at)
            )),
        }
    }

    fn fail_open(&self, now: DateTime<Utc>) -> RateLimitDecision {
        RateLimitDecision {
            allowed: true,
            remaining: self.limit.saturating_sub(1),
            reset_at: next_utc_midnight(now),
            message: None,
        }
    }
}
