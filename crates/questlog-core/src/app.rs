//! Application service: the operations the external surface calls, keyed by
//! an authenticated user id the service trusts unconditionally.
//!
//! The service is generic over the clock so integration tests can walk time
//! forward day by day. Every "today" decision flows through it.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, Result, ValidationError};
use crate::journal::{self, DayActivity, JournalEntry};
use crate::storage::{Config, Database};
use crate::streak::{ForgivenessOutcome, RecoveryOutcome, Streak};
use crate::task::{self, Task, TaskPatch};
use crate::user::User;

/// Provision-or-fetch result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginOutcome {
    pub user: User,
    pub created: bool,
}

/// App-load result: the user plus the post-evaluation ledger and verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppLoadOutcome {
    pub user: User,
    pub streak_broken: bool,
    pub streak: Streak,
}

/// Updated task, merged with a streak verdict when the update completed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskUpdateOutcome {
    #[serde(flatten)]
    pub task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streak_broken: Option<bool>,
}

/// The application service.
pub struct App<C: Clock = SystemClock> {
    db: Database,
    config: Config,
    clock: C,
}

impl App<SystemClock> {
    /// Open the service against the on-disk database and config.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub fn open() -> Result<Self> {
        Ok(Self::new(
            Database::open()?,
            Config::load_or_default(),
            SystemClock,
        ))
    }
}

impl<C: Clock> App<C> {
    pub fn new(db: Database, config: Config, clock: C) -> Self {
        Self { db, config, clock }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    fn ensure_user(&self, user_id: i64) -> Result<User> {
        self.db
            .get_user(user_id)?
            .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))
    }

    // ── Session ──

    /// Provision-or-fetch a user by username, then mark today's login.
    ///
    /// A new account gets the username up to the first `'@'` as its display
    /// name and the configured starting token balance.
    ///
    /// # Errors
    /// `ValidationError` for a blank username; storage errors propagate.
    pub fn login(&self, username: &str) -> Result<LoginOutcome> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ValidationError::MissingField {
                field: "username".to_string(),
            }
            .into());
        }
        let (user, created) = match self.db.get_user_by_username(username)? {
            Some(user) => (user, false),
            None => {
                let user = self.db.create_user(
                    username,
                    &User::default_name(username),
                    self.config.streak.initial_forgiveness_tokens,
                    self.clock.now(),
                )?;
                debug!(user_id = user.id, username, "provisioned user");
                (user, true)
            }
        };
        self.record_login(user.id);
        Ok(LoginOutcome { user, created })
    }

    /// Mark today's login in the journal, at most once per day.
    ///
    /// Best-effort: failures are logged and swallowed so the login path never
    /// fails on journal health.
    pub fn record_login(&self, user_id: i64) {
        if let Err(err) = self.db.record_login_entry(user_id, self.clock.now()) {
            warn!(user_id, error = %err, "login journal entry failed, continuing");
        }
    }

    /// Session start: mark the login, then evaluate the streak for today.
    ///
    /// # Errors
    /// `UserNotFound` for an unknown id; storage errors propagate.
    pub fn app_load(&self, user_id: i64) -> Result<AppLoadOutcome> {
        let user = self.ensure_user(user_id)?;
        self.record_login(user_id);
        let (eval, streak) = self.db.evaluate_streak(user_id, self.clock.today())?;
        if !eval.is_noop() {
            debug!(user_id, state = ?eval.state, count = streak.count, "streak evaluated");
        }
        Ok(AppLoadOutcome {
            user,
            streak_broken: eval.broken,
            streak,
        })
    }

    /// Change a user's display name.
    ///
    /// # Errors
    /// `ValidationError` for a blank name, `UserNotFound` for an unknown id.
    pub fn rename_user(&self, user_id: i64, name: &str) -> Result<User> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingField {
                field: "name".to_string(),
            }
            .into());
        }
        self.ensure_user(user_id)?;
        self.db.update_user_name(user_id, name)?;
        self.ensure_user(user_id)
    }

    // ── Tasks ──

    /// Create a task with zero progress.
    ///
    /// # Errors
    /// `ValidationError` for blank text or `total < 1`; `UserNotFound` for an
    /// unknown id.
    pub fn create_task(
        &self,
        user_id: i64,
        text: &str,
        deadline: DateTime<Utc>,
        total: i64,
    ) -> Result<Task> {
        task::validate_new(text, total)?;
        self.ensure_user(user_id)?;
        Ok(self
            .db
            .create_task(user_id, text.trim(), deadline, total, self.clock.now())?)
    }

    /// The user's tasks ordered by deadline, soonest first.
    pub fn list_tasks(&self, user_id: i64, include_archived: bool) -> Result<Vec<Task>> {
        Ok(self.db.list_tasks(user_id, include_archived)?)
    }

    /// Fetch one task.
    ///
    /// # Errors
    /// `TaskNotFound` if the task does not exist or belongs to someone else.
    pub fn get_task(&self, user_id: i64, task_id: i64) -> Result<Task> {
        self.db
            .get_task(user_id, task_id)?
            .ok_or(CoreError::TaskNotFound { id: task_id })
    }

    /// Apply a partial update. A false→true `completed` transition counts as
    /// today's qualifying activity and runs a streak evaluation; the verdict
    /// is merged into the response.
    ///
    /// # Errors
    /// `ValidationError` for an empty patch or an invalid patched state,
    /// `TaskNotFound` if the task does not exist.
    pub fn update_task(
        &self,
        user_id: i64,
        task_id: i64,
        patch: &TaskPatch,
    ) -> Result<TaskUpdateOutcome> {
        if patch.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "patch".to_string(),
                message: "no fields to update".to_string(),
            }
            .into());
        }
        let mut task = self.get_task(user_id, task_id)?;
        let was_completed = task.completed;
        task.apply(patch, self.clock.now());
        task::validate_new(&task.text, task.total)?;
        if task.progress < 0 {
            return Err(ValidationError::InvalidValue {
                field: "progress".to_string(),
                message: "must not be negative".to_string(),
            }
            .into());
        }
        self.db.update_task(&task)?;

        let streak_broken = if !was_completed && task.completed {
            let (eval, streak) = self.db.evaluate_streak(user_id, self.clock.today())?;
            if !eval.is_noop() {
                debug!(user_id, task_id, count = streak.count, "task completion advanced streak");
            }
            Some(eval.broken)
        } else {
            None
        };
        Ok(TaskUpdateOutcome {
            task,
            streak_broken,
        })
    }

    /// Delete a task and its journal entries.
    ///
    /// # Errors
    /// `TaskNotFound` if the task does not exist.
    pub fn delete_task(&self, user_id: i64, task_id: i64) -> Result<()> {
        self.db.delete_task(user_id, task_id)
    }

    // ── Streak ──

    /// The user's ledger, or `None` before the first evaluation.
    pub fn get_streak(&self, user_id: i64) -> Result<Option<Streak>> {
        Ok(self.db.get_streak(user_id)?)
    }

    /// Restore-after-break: spend one token, rebuild the lost run.
    ///
    /// # Errors
    /// `NoStreakToForgive`, `InsufficientTokens`, or storage failures; the
    /// transaction rolls back on any of them.
    pub fn forgive(&self, user_id: i64) -> Result<ForgivenessOutcome> {
        self.db.forgive_streak(user_id)
    }

    /// Back-fill one missed day with a reflection, spending one token.
    ///
    /// # Errors
    /// `ValidationError` for blank reflection fields or a non-past date,
    /// `DayAlreadyActive` when the day has journal activity,
    /// `InsufficientTokens` at zero balance.
    pub fn recover_day(
        &self,
        user_id: i64,
        date: NaiveDate,
        reason: &str,
        mitigation: &str,
    ) -> Result<RecoveryOutcome> {
        journal::validate_reflection(reason, mitigation)?;
        self.db
            .recover_day(user_id, date, self.clock.today(), reason.trim(), mitigation.trim())
    }

    // ── Journal ──

    /// All journal entries for the user, newest first.
    pub fn list_journal(&self, user_id: i64) -> Result<Vec<JournalEntry>> {
        Ok(self.db.list_entries(user_id)?)
    }

    /// Record a reflection, optionally tied to a task or back-dated.
    ///
    /// # Errors
    /// `ValidationError` for blank fields, `TaskNotFound` for an unknown
    /// `task_id`.
    pub fn add_journal_entry(
        &self,
        user_id: i64,
        reason: &str,
        mitigation: &str,
        task_id: Option<i64>,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<JournalEntry> {
        journal::validate_reflection(reason, mitigation)?;
        if let Some(id) = task_id {
            self.get_task(user_id, id)?;
        }
        let at = created_at.unwrap_or_else(|| self.clock.now());
        Ok(self
            .db
            .insert_entry(user_id, reason.trim(), mitigation.trim(), task_id, at)?)
    }

    /// Per-day entry counts over the configured trailing window ending today.
    pub fn activity_by_day(&self, user_id: i64) -> Result<Vec<DayActivity>> {
        let window = i64::from(self.config.streak.activity_window_days);
        let since = self.clock.today() - Duration::days(window - 1);
        Ok(self.db.activity_by_day(user_id, since)?)
    }

    // ── Tokens ──

    /// Current forgiveness token balance.
    ///
    /// # Errors
    /// `UserNotFound` for an unknown id.
    pub fn tokens(&self, user_id: i64) -> Result<i64> {
        self.db
            .user_tokens(user_id)?
            .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))
    }

    /// Add tokens to the balance. Refuses unless `[debug] token_refill` is on.
    ///
    /// # Errors
    /// `ValidationError` when the gate is off or `amount < 1`; `UserNotFound`
    /// for an unknown id.
    pub fn refill_tokens(&self, user_id: i64, amount: i64) -> Result<i64> {
        if !self.config.debug.token_refill {
            return Err(ValidationError::InvalidValue {
                field: "debug.token_refill".to_string(),
                message: "token refill is disabled in config".to_string(),
            }
            .into());
        }
        if amount < 1 {
            return Err(ValidationError::InvalidValue {
                field: "amount".to_string(),
                message: "must be at least 1".to_string(),
            }
            .into());
        }
        self.db.refill_tokens(user_id, amount)
    }
}
