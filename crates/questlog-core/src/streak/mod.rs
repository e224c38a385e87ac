//! Streak ledger and its repair operations.

pub mod engine;
pub mod forgiveness;

pub use engine::{classify, evaluate, DayState, Evaluation};
pub use forgiveness::{
    plan_recovery, plan_restore, ForgivenessOutcome, RecoveryOutcome, RecoveryPlan, RestorePlan,
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Per-user singleton streak ledger.
///
/// `count` is the consecutive-day run ending at `last_updated`, plus any
/// recovered days. `prev_count` snapshots the run lost at the most recent
/// break and is cleared once that break is forgiven.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streak {
    pub id: i64,
    pub user_id: i64,
    pub count: i64,
    pub prev_count: Option<i64>,
    pub last_updated: NaiveDate,
}
