//! User model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An account, as the external identity collaborator sees it.
///
/// The core trusts the authenticated id unconditionally. `forgiveness_tokens`
/// is mutated only by the forgiveness economy; `dp` is a profile-image path
/// owned by the external upload flow and carried here untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub dp: Option<String>,
    pub forgiveness_tokens: i64,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Display name for a freshly provisioned account: the username up to
    /// the first `'@'`.
    pub fn default_name(username: &str) -> String {
        username.split('@').next().unwrap_or(username).to_string()
    }
}
