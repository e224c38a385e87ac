//! Task ("quest") model and partial updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A quest: deadline-bound work with incremental progress.
///
/// `completed` is derived client-side from progress/total; the core stores
/// whatever the client patched in, and a false→true transition is what
/// triggers streak evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub user_id: i64,
    pub text: String,
    pub completed: bool,
    pub deadline: DateTime<Utc>,
    pub progress: i64,
    pub total: i64,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field-wise task update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    pub text: Option<String>,
    pub completed: Option<bool>,
    pub deadline: Option<DateTime<Utc>>,
    pub progress: Option<i64>,
    pub total: Option<i64>,
    pub archived: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.completed.is_none()
            && self.deadline.is_none()
            && self.progress.is_none()
            && self.total.is_none()
            && self.archived.is_none()
    }
}

impl Task {
    /// Merge a patch into the task, stamping `updated_at`.
    pub fn apply(&mut self, patch: &TaskPatch, now: DateTime<Utc>) {
        if let Some(text) = &patch.text {
            self.text = text.clone();
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(deadline) = patch.deadline {
            self.deadline = deadline;
        }
        if let Some(progress) = patch.progress {
            self.progress = progress;
        }
        if let Some(total) = patch.total {
            self.total = total;
        }
        if let Some(archived) = patch.archived {
            self.archived = archived;
        }
        self.updated_at = now;
    }
}

/// Reject unusable creation input before anything is written.
pub fn validate_new(text: &str, total: i64) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::MissingField {
            field: "text".to_string(),
        });
    }
    if total < 1 {
        return Err(ValidationError::InvalidValue {
            field: "total".to_string(),
            message: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_task() -> Task {
        let now = Utc::now();
        Task {
            id: 1,
            user_id: 1,
            text: "Write ballad".to_string(),
            completed: false,
            deadline: now,
            progress: 0,
            total: 3,
            archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn apply_merges_only_present_fields() {
        let mut task = make_task();
        let before = task.text.clone();
        task.apply(
            &TaskPatch {
                progress: Some(2),
                completed: Some(true),
                ..Default::default()
            },
            Utc::now(),
        );
        assert_eq!(task.progress, 2);
        assert!(task.completed);
        assert_eq!(task.text, before);
        assert_eq!(task.total, 3);
    }

    #[test]
    fn empty_patch_is_detected() {
        assert!(TaskPatch::default().is_empty());
        let patch = TaskPatch {
            archived: Some(true),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn validate_new_rejects_blank_text_and_zero_total() {
        assert!(validate_new("  ", 3).is_err());
        assert!(validate_new("Write ballad", 0).is_err());
        assert!(validate_new("Write ballad", 1).is_ok());
    }
}
