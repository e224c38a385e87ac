//! Forgiveness economy: token-funded streak repair.
//!
//! Two repair modes compose with the ledger. Restore-after-break puts the run
//! lost at the most recent break back (plus today's credit); day recovery
//! back-fills one specific missed day with a journal entry. Planning here is
//! pure; storage executes a plan and the token decrement inside a single
//! transaction, so a token is never spent without its paired mutation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::Streak;
use crate::error::{CoreError, Result, ValidationError};
use crate::journal::{self, JournalEntry};

/// Tokens a freshly provisioned account starts with.
pub const DEFAULT_TOKENS: i64 = 2;

/// Ledger values to write when a break is forgiven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestorePlan {
    /// New count: the lost run plus today's credit.
    pub count: i64,
}

/// Decide the restore-after-break mutation.
///
/// The snapshot is consumed on success (stored as NULL), so one break can be
/// forgiven at most once.
///
/// # Errors
/// `NoStreakToForgive` when no ledger exists or no unforgiven break is on
/// record.
pub fn plan_restore(current: Option<&Streak>) -> Result<RestorePlan> {
    let streak = current.ok_or(CoreError::NoStreakToForgive)?;
    let prev = streak.prev_count.ok_or(CoreError::NoStreakToForgive)?;
    Ok(RestorePlan { count: prev + 1 })
}

/// Ledger values and journal timestamp for a day recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPlan {
    pub count: i64,
    /// Unchanged for an existing ledger; the recovered day itself when the
    /// recovery creates the ledger.
    pub last_updated: NaiveDate,
    /// Back-dated timestamp for the journal entry, midnight UTC of the day.
    pub created_at: DateTime<Utc>,
}

/// Decide the back-fill mutation for one missed day.
///
/// Recovery credits the day free-standing: no adjacency to the current run is
/// required, and `last_updated` never moves backwards. The day must lie
/// strictly in the past; whether it is already active is checked by storage
/// against the journal inside the recovery transaction.
///
/// # Errors
/// `ValidationError` when `date` is today or later.
pub fn plan_recovery(
    current: Option<&Streak>,
    date: NaiveDate,
    today: NaiveDate,
) -> Result<RecoveryPlan> {
    if date >= today {
        return Err(ValidationError::InvalidValue {
            field: "date".to_string(),
            message: "must be a past day".to_string(),
        }
        .into());
    }
    let plan = match current {
        Some(streak) => RecoveryPlan {
            count: streak.count + 1,
            last_updated: streak.last_updated,
            created_at: journal::backdate(date),
        },
        None => RecoveryPlan {
            count: 1,
            last_updated: date,
            created_at: journal::backdate(date),
        },
    };
    Ok(plan)
}

/// Balance and ledger after a successful restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgivenessOutcome {
    pub forgiveness_tokens: i64,
    pub streak: Streak,
}

/// Balance, ledger, and the back-dated entry after a day recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    pub forgiveness_tokens: i64,
    pub streak: Streak,
    pub entry: JournalEntry,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ledger(count: i64, prev_count: Option<i64>, last_updated: NaiveDate) -> Streak {
        Streak {
            id: 1,
            user_id: 1,
            count,
            prev_count,
            last_updated,
        }
    }

    #[test]
    fn restore_needs_a_ledger() {
        assert!(matches!(
            plan_restore(None),
            Err(CoreError::NoStreakToForgive)
        ));
    }

    #[test]
    fn restore_needs_an_unforgiven_break() {
        let streak = ledger(3, None, date(2024, 1, 15));
        assert!(matches!(
            plan_restore(Some(&streak)),
            Err(CoreError::NoStreakToForgive)
        ));
    }

    #[test]
    fn restore_returns_lost_run_plus_today() {
        let streak = ledger(1, Some(5), date(2024, 1, 15));
        let plan = plan_restore(Some(&streak)).unwrap();
        assert_eq!(plan.count, 6);
    }

    #[test]
    fn recovery_rejects_today_and_future() {
        let today = date(2024, 1, 15);
        assert!(plan_recovery(None, today, today).is_err());
        assert!(plan_recovery(None, date(2024, 1, 20), today).is_err());
    }

    #[test]
    fn recovery_increments_without_moving_last_updated() {
        let streak = ledger(1, Some(5), date(2024, 1, 15));
        let plan = plan_recovery(Some(&streak), date(2024, 1, 12), date(2024, 1, 15)).unwrap();
        assert_eq!(plan.count, 2);
        assert_eq!(plan.last_updated, date(2024, 1, 15));
        assert_eq!(plan.created_at.to_rfc3339(), "2024-01-12T00:00:00+00:00");
    }

    #[test]
    fn recovery_without_ledger_starts_at_the_day() {
        let plan = plan_recovery(None, date(2024, 1, 12), date(2024, 1, 15)).unwrap();
        assert_eq!(plan.count, 1);
        assert_eq!(plan.last_updated, date(2024, 1, 12));
    }
}
