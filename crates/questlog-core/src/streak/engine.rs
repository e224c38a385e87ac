//! Streak evaluation engine.
//!
//! A pure state machine over one streak ledger. It never reads the system
//! clock and never touches storage: callers pass the current ledger and
//! "today" (a UTC calendar day from the injected clock) and get back the
//! transition to apply.
//!
//! ## State transitions
//!
//! ```text
//! NoLedger     -> start    {count: 1, last_updated: today}
//! UpdatedToday -> no-op    (idempotent within one day)
//! Continuing   -> advance  {count + 1, last_updated: today}
//! Broken       -> reset    {count: 1, prev_count: old count}, broken verdict
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Streak;

/// Where a ledger stands relative to today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayState {
    /// No ledger exists for this user yet.
    NoLedger,
    /// The ledger was already credited today.
    UpdatedToday,
    /// The ledger was credited yesterday; the run continues.
    Continuing,
    /// The last credit is two or more days old.
    Broken,
}

/// The mutation an evaluation decided on, plus the verdict for the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub state: DayState,
    pub broken: bool,
    pub count: i64,
    pub prev_count: Option<i64>,
    pub last_updated: NaiveDate,
}

impl Evaluation {
    /// True when the ledger needs no write.
    pub fn is_noop(&self) -> bool {
        self.state == DayState::UpdatedToday
    }
}

// ── Classification ──────────────────────────────────────────────────

/// Classify a ledger's last-updated day against today.
///
/// A `last_updated` in the future of `today` (clock rollback) classifies as
/// `UpdatedToday`, so skew can never break a streak.
pub fn classify(last_updated: Option<NaiveDate>, today: NaiveDate) -> DayState {
    let Some(last) = last_updated else {
        return DayState::NoLedger;
    };
    match (today - last).num_days() {
        d if d <= 0 => DayState::UpdatedToday,
        1 => DayState::Continuing,
        _ => DayState::Broken,
    }
}

// ── Evaluation ──────────────────────────────────────────────────────

/// Decide the transition for one trigger (app load or task completion).
pub fn evaluate(current: Option<&Streak>, today: NaiveDate) -> Evaluation {
    let state = classify(current.map(|s| s.last_updated), today);
    match (state, current) {
        (DayState::NoLedger, _) | (_, None) => Evaluation {
            state: DayState::NoLedger,
            broken: false,
            count: 1,
            prev_count: None,
            last_updated: today,
        },
        (DayState::UpdatedToday, Some(streak)) => Evaluation {
            state: DayState::UpdatedToday,
            broken: false,
            count: streak.count,
            prev_count: streak.prev_count,
            last_updated: streak.last_updated,
        },
        (DayState::Continuing, Some(streak)) => Evaluation {
            state: DayState::Continuing,
            broken: false,
            count: streak.count + 1,
            prev_count: streak.prev_count,
            last_updated: today,
        },
        (DayState::Broken, Some(streak)) => Evaluation {
            state: DayState::Broken,
            broken: true,
            count: 1,
            prev_count: Some(streak.count),
            last_updated: today,
        },
    }
}
