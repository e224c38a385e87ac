//! Activity journal model.
//!
//! The journal is the append-only record of dated user activity: automatic
//! login markers, user-written reflections, and back-dated recovery credits.
//! It is the source of truth for "was the user active on day D". Entries are
//! never updated; they are deleted only by cascade when their task or user
//! goes away.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Reason text of the automatic once-per-day login marker.
pub const LOGIN_REASON: &str = "User login";
/// Placeholder mitigation for automatic entries.
pub const LOGIN_MITIGATION: &str = "N/A";

/// One dated activity record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: i64,
    pub user_id: i64,
    /// Defaults to insertion time; back-dated for recovered days.
    pub created_at: DateTime<Utc>,
    pub reason: String,
    pub mitigation: String,
    pub task_id: Option<i64>,
}

impl JournalEntry {
    /// UTC calendar day this entry credits.
    pub fn day(&self) -> NaiveDate {
        self.created_at.date_naive()
    }

    pub fn is_login_marker(&self) -> bool {
        self.reason == LOGIN_REASON
    }
}

/// Entry count for one calendar day, as rendered in the activity grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayActivity {
    pub day: NaiveDate,
    pub entries: i64,
}

/// Reject empty reflection fields before anything is written.
pub fn validate_reflection(reason: &str, mitigation: &str) -> Result<(), ValidationError> {
    if reason.trim().is_empty() {
        return Err(ValidationError::MissingField {
            field: "reason".to_string(),
        });
    }
    if mitigation.trim().is_empty() {
        return Err(ValidationError::MissingField {
            field: "mitigation".to_string(),
        });
    }
    Ok(())
}

/// RFC 3339 bounds of `[day, day+1)` for range queries over stored
/// timestamps. Stored values always carry a `+00:00` offset, so plain string
/// comparison is ordering-correct.
pub fn day_bounds(day: NaiveDate) -> (String, String) {
    let start = day.and_time(NaiveTime::MIN).and_utc();
    let end = start + Duration::days(1);
    (start.to_rfc3339(), end.to_rfc3339())
}

/// Midnight UTC instant used when back-dating recovery entries.
pub fn backdate(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}
