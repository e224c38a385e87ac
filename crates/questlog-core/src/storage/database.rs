//! SQLite-backed persistence for users, tasks, journal entries, and streaks.
//!
//! One `Database` owns one connection. Single-statement reads and writes are
//! plain methods; every multi-statement mutation (streak evaluation,
//! forgiveness, day recovery, cascading deletes) runs inside a
//! `BEGIN IMMEDIATE` transaction, so concurrent triggers serialize on the
//! write lock and a token is never spent without its paired mutation.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{CoreError, Result, StorageError};
use crate::journal::{self, DayActivity, JournalEntry};
use crate::streak::{engine, forgiveness, Evaluation, ForgivenessOutcome, RecoveryOutcome, Streak};
use crate::task::Task;
use crate::user::User;

use super::{data_dir, migrations};

fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_date_fallback(date_str: &str) -> NaiveDate {
    date_str.parse().unwrap_or_else(|_| Utc::now().date_naive())
}

/// Build a User from a row of `USER_COLUMNS`.
fn row_to_user(row: &rusqlite::Row) -> Result<User, rusqlite::Error> {
    let created_at_str: String = row.get(5)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        name: row.get(2)?,
        dp: row.get(3)?,
        forgiveness_tokens: row.get(4)?,
        created_at: parse_datetime_fallback(&created_at_str),
    })
}

/// Build a Task from a row of `TASK_COLUMNS`.
fn row_to_task(row: &rusqlite::Row) -> Result<Task, rusqlite::Error> {
    let deadline_str: String = row.get(4)?;
    let created_at_str: String = row.get(8)?;
    let updated_at_str: String = row.get(9)?;
    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        text: row.get(2)?,
        completed: row.get(3)?,
        deadline: parse_datetime_fallback(&deadline_str),
        progress: row.get(5)?,
        total: row.get(6)?,
        archived: row.get(7)?,
        created_at: parse_datetime_fallback(&created_at_str),
        updated_at: parse_datetime_fallback(&updated_at_str),
    })
}

/// Build a JournalEntry from a row of `ENTRY_COLUMNS`.
fn row_to_entry(row: &rusqlite::Row) -> Result<JournalEntry, rusqlite::Error> {
    let created_at_str: String = row.get(2)?;
    Ok(JournalEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        created_at: parse_datetime_fallback(&created_at_str),
        reason: row.get(3)?,
        mitigation: row.get(4)?,
        task_id: row.get(5)?,
    })
}

/// Build a Streak from a row of `STREAK_COLUMNS`.
fn row_to_streak(row: &rusqlite::Row) -> Result<Streak, rusqlite::Error> {
    let last_updated_str: String = row.get(4)?;
    Ok(Streak {
        id: row.get(0)?,
        user_id: row.get(1)?,
        count: row.get(2)?,
        prev_count: row.get(3)?,
        last_updated: parse_date_fallback(&last_updated_str),
    })
}

const USER_COLUMNS: &str = "id, username, name, dp, forgiveness_tokens, created_at";
const TASK_COLUMNS: &str =
    "id, user_id, text, completed, deadline, progress, total, archived, created_at, updated_at";
const ENTRY_COLUMNS: &str = "id, user_id, created_at, reason, mitigation, task_id";
const STREAK_COLUMNS: &str = "id, user_id, count, prev_count, last_updated";

/// SQLite database for questlog state.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data_dir>/questlog.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("questlog.db");
        Self::open_at(&path)
    }

    /// Open the database at an explicit path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
        Ok(db)
    }

    /// Open an in-memory database (used by tests).
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| StorageError::OpenFailed {
            path: ":memory:".into(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        // Create base tables (v1 schema) first
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                username           TEXT NOT NULL UNIQUE,
                name               TEXT NOT NULL,
                forgiveness_tokens INTEGER NOT NULL DEFAULT 2,
                created_at         TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id    INTEGER NOT NULL,
                text       TEXT NOT NULL,
                completed  INTEGER NOT NULL DEFAULT 0,
                deadline   TEXT NOT NULL,
                progress   INTEGER NOT NULL DEFAULT 0,
                total      INTEGER NOT NULL DEFAULT 1,
                archived   INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS journal_entries (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id    INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                reason     TEXT NOT NULL,
                mitigation TEXT NOT NULL,
                task_id    INTEGER
            );

            CREATE TABLE IF NOT EXISTS streaks (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id      INTEGER NOT NULL UNIQUE,
                count        INTEGER NOT NULL DEFAULT 0,
                last_updated TEXT NOT NULL
            );

            -- Indexes for the hot lookups
            CREATE INDEX IF NOT EXISTS idx_journal_user_created
                ON journal_entries(user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_journal_task ON journal_entries(task_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_user_deadline ON tasks(user_id, deadline);",
        )?;

        // Run incremental migrations (v1 -> v2 -> v3, etc.)
        migrations::migrate(&self.conn)?;

        Ok(())
    }

    // === User CRUD ===

    /// Create a user.
    ///
    /// # Errors
    /// Returns an error if the insert fails (including a duplicate username).
    pub fn create_user(
        &self,
        username: &str,
        name: &str,
        forgiveness_tokens: i64,
        now: DateTime<Utc>,
    ) -> Result<User, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO users (username, name, forgiveness_tokens, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![username, name, forgiveness_tokens, now.to_rfc3339()],
        )?;
        Ok(User {
            id: self.conn.last_insert_rowid(),
            username: username.to_string(),
            name: name.to_string(),
            dp: None,
            forgiveness_tokens,
            created_at: now,
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                row_to_user,
            )
            .optional()
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                row_to_user,
            )
            .optional()
    }

    pub fn update_user_name(&self, id: i64, name: &str) -> Result<(), rusqlite::Error> {
        self.conn
            .execute("UPDATE users SET name = ?1 WHERE id = ?2", params![name, id])?;
        Ok(())
    }

    pub fn update_user_dp(&self, id: i64, dp: &str) -> Result<(), rusqlite::Error> {
        self.conn
            .execute("UPDATE users SET dp = ?1 WHERE id = ?2", params![dp, id])?;
        Ok(())
    }

    /// Current token balance, or `None` for an unknown user.
    pub fn user_tokens(&self, id: i64) -> Result<Option<i64>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT forgiveness_tokens FROM users WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
    }

    /// Delete a user and everything it owns in a single transaction.
    ///
    /// # Errors
    /// `UserNotFound` if no such user; storage errors roll everything back.
    pub fn delete_user(&self, id: i64) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
        let result: Result<()> = (|| {
            self.conn.execute(
                "DELETE FROM journal_entries WHERE user_id = ?1",
                params![id],
            )?;
            self.conn
                .execute("DELETE FROM streaks WHERE user_id = ?1", params![id])?;
            self.conn
                .execute("DELETE FROM tasks WHERE user_id = ?1", params![id])?;
            let deleted = self
                .conn
                .execute("DELETE FROM users WHERE id = ?1", params![id])?;
            if deleted == 0 {
                return Err(CoreError::UserNotFound(id.to_string()));
            }
            Ok(())
        })();
        match result {
            Ok(()) => {
                self.conn.execute_batch("COMMIT;")?;
                Ok(())
            }
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(err)
            }
        }
    }

    /// Add `amount` tokens and return the new balance.
    ///
    /// # Errors
    /// `UserNotFound` if no such user.
    pub fn refill_tokens(&self, id: i64, amount: i64) -> Result<i64> {
        self.conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
        let result: Result<i64> = (|| {
            let balance = self
                .user_tokens(id)?
                .ok_or_else(|| CoreError::UserNotFound(id.to_string()))?;
            let balance = balance + amount;
            self.conn.execute(
                "UPDATE users SET forgiveness_tokens = ?1 WHERE id = ?2",
                params![balance, id],
            )?;
            Ok(balance)
        })();
        match result {
            Ok(balance) => {
                self.conn.execute_batch("COMMIT;")?;
                Ok(balance)
            }
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(err)
            }
        }
    }

    // === Task CRUD ===

    /// Create a task with zero progress.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn create_task(
        &self,
        user_id: i64,
        text: &str,
        deadline: DateTime<Utc>,
        total: i64,
        now: DateTime<Utc>,
    ) -> Result<Task, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO tasks (user_id, text, completed, deadline, progress, total, archived, created_at, updated_at)
             VALUES (?1, ?2, 0, ?3, 0, ?4, 0, ?5, ?5)",
            params![user_id, text, deadline.to_rfc3339(), total, now.to_rfc3339()],
        )?;
        Ok(Task {
            id: self.conn.last_insert_rowid(),
            user_id,
            text: text.to_string(),
            completed: false,
            deadline,
            progress: 0,
            total,
            archived: false,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_task(&self, user_id: i64, id: i64) -> Result<Option<Task>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND user_id = ?2"),
                params![id, user_id],
                row_to_task,
            )
            .optional()
    }

    /// List a user's tasks ordered by deadline, soonest first.
    pub fn list_tasks(&self, user_id: i64, include_archived: bool) -> Result<Vec<Task>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE user_id = ?1 AND (archived = 0 OR ?2)
             ORDER BY deadline ASC"
        ))?;
        let tasks = stmt.query_map(params![user_id, include_archived], row_to_task)?;
        tasks.collect()
    }

    /// Update an existing task (all mutable columns).
    pub fn update_task(&self, task: &Task) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE tasks
             SET text = ?1, completed = ?2, deadline = ?3, progress = ?4,
                 total = ?5, archived = ?6, updated_at = ?7
             WHERE id = ?8 AND user_id = ?9",
            params![
                task.text,
                task.completed,
                task.deadline.to_rfc3339(),
                task.progress,
                task.total,
                task.archived,
                task.updated_at.to_rfc3339(),
                task.id,
                task.user_id,
            ],
        )?;
        Ok(())
    }

    /// Delete a task and its journal entries in a single transaction.
    ///
    /// # Errors
    /// `TaskNotFound` if the task does not exist or belongs to someone else;
    /// the cascade rolls back with it.
    pub fn delete_task(&self, user_id: i64, id: i64) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
        let result: Result<()> = (|| {
            self.conn.execute(
                "DELETE FROM journal_entries WHERE task_id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            let deleted = self.conn.execute(
                "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            if deleted == 0 {
                return Err(CoreError::TaskNotFound { id });
            }
            Ok(())
        })();
        match result {
            Ok(()) => {
                self.conn.execute_batch("COMMIT;")?;
                Ok(())
            }
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(err)
            }
        }
    }

    // === Journal ===

    /// Insert a journal entry with an explicit timestamp.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn insert_entry(
        &self,
        user_id: i64,
        reason: &str,
        mitigation: &str,
        task_id: Option<i64>,
        created_at: DateTime<Utc>,
    ) -> Result<JournalEntry, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO journal_entries (user_id, created_at, reason, mitigation, task_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, created_at.to_rfc3339(), reason, mitigation, task_id],
        )?;
        Ok(JournalEntry {
            id: self.conn.last_insert_rowid(),
            user_id,
            created_at,
            reason: reason.to_string(),
            mitigation: mitigation.to_string(),
            task_id,
        })
    }

    /// All entries for a user, newest first.
    pub fn list_entries(&self, user_id: i64) -> Result<Vec<JournalEntry>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM journal_entries
             WHERE user_id = ?1
             ORDER BY created_at DESC"
        ))?;
        let entries = stmt.query_map(params![user_id], row_to_entry)?;
        entries.collect()
    }

    /// Most recent automatic login marker, if any.
    pub fn last_login_entry(&self, user_id: i64) -> Result<Option<JournalEntry>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM journal_entries
                     WHERE user_id = ?1 AND reason = ?2
                     ORDER BY created_at DESC
                     LIMIT 1"
                ),
                params![user_id, journal::LOGIN_REASON],
                row_to_entry,
            )
            .optional()
    }

    /// Whether any journal entry falls within `[day, day+1)`.
    pub fn has_activity_on(&self, user_id: i64, day: NaiveDate) -> Result<bool, rusqlite::Error> {
        let (start, end) = journal::day_bounds(day);
        self.conn.query_row(
            "SELECT EXISTS(
                 SELECT 1 FROM journal_entries
                 WHERE user_id = ?1 AND created_at >= ?2 AND created_at < ?3
             )",
            params![user_id, start, end],
            |row| row.get(0),
        )
    }

    /// Per-day entry counts from `since` onward, oldest day first.
    pub fn activity_by_day(
        &self,
        user_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<DayActivity>, rusqlite::Error> {
        let (start, _) = journal::day_bounds(since);
        let mut stmt = self.conn.prepare(
            "SELECT substr(created_at, 1, 10) AS day, COUNT(*)
             FROM journal_entries
             WHERE user_id = ?1 AND created_at >= ?2
             GROUP BY day
             ORDER BY day ASC",
        )?;
        let days = stmt.query_map(params![user_id, start], |row| {
            let day_str: String = row.get(0)?;
            Ok(DayActivity {
                day: parse_date_fallback(&day_str),
                entries: row.get(1)?,
            })
        })?;
        days.collect()
    }

    /// Insert the once-per-day login marker if today doesn't have one.
    ///
    /// Returns the new entry, or `None` when today is already marked. The
    /// read and the insert share one transaction so two simultaneous logins
    /// cannot both insert.
    ///
    /// # Errors
    /// Storage failures propagate; the caller decides whether to swallow
    /// them (the login path does).
    pub fn record_login_entry(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<JournalEntry>> {
        self.conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
        let result: Result<Option<JournalEntry>> = (|| {
            if let Some(last) = self.last_login_entry(user_id)? {
                if last.day() == now.date_naive() {
                    return Ok(None);
                }
            }
            let entry = self.insert_entry(
                user_id,
                journal::LOGIN_REASON,
                journal::LOGIN_MITIGATION,
                None,
                now,
            )?;
            Ok(Some(entry))
        })();
        match result {
            Ok(entry) => {
                self.conn.execute_batch("COMMIT;")?;
                Ok(entry)
            }
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(err)
            }
        }
    }

    // === Streak ledger ===

    pub fn get_streak(&self, user_id: i64) -> Result<Option<Streak>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!("SELECT {STREAK_COLUMNS} FROM streaks WHERE user_id = ?1"),
                params![user_id],
                row_to_streak,
            )
            .optional()
    }

    /// Write ledger values, inserting the row if the user has none yet.
    /// Callers hold the transaction.
    fn write_ledger(
        &self,
        user_id: i64,
        count: i64,
        prev_count: Option<i64>,
        last_updated: NaiveDate,
    ) -> Result<Streak, rusqlite::Error> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM streaks WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        let id = match existing {
            Some(id) => {
                self.conn.execute(
                    "UPDATE streaks SET count = ?1, prev_count = ?2, last_updated = ?3 WHERE id = ?4",
                    params![count, prev_count, last_updated.to_string(), id],
                )?;
                id
            }
            None => {
                self.conn.execute(
                    "INSERT INTO streaks (user_id, count, prev_count, last_updated)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![user_id, count, prev_count, last_updated.to_string()],
                )?;
                self.conn.last_insert_rowid()
            }
        };
        Ok(Streak {
            id,
            user_id,
            count,
            prev_count,
            last_updated,
        })
    }

    /// Run one streak evaluation for `today` and persist the transition.
    ///
    /// The read, the decision, and the write share one immediate transaction,
    /// so two triggers racing each other serialize and the second becomes the
    /// idempotent no-op.
    ///
    /// # Errors
    /// Storage failures roll the transaction back.
    pub fn evaluate_streak(&self, user_id: i64, today: NaiveDate) -> Result<(Evaluation, Streak)> {
        self.conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
        let result: Result<(Evaluation, Streak)> = (|| {
            let current = self.get_streak(user_id)?;
            let eval = engine::evaluate(current.as_ref(), today);
            let row = match (current, eval.is_noop()) {
                (Some(row), true) => row,
                _ => self.write_ledger(user_id, eval.count, eval.prev_count, eval.last_updated)?,
            };
            Ok((eval, row))
        })();
        match result {
            Ok(outcome) => {
                self.conn.execute_batch("COMMIT;")?;
                Ok(outcome)
            }
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(err)
            }
        }
    }

    /// Restore-after-break: spend one token, rebuild the lost run.
    ///
    /// # Errors
    /// `NoStreakToForgive` without an unforgiven break, `InsufficientTokens`
    /// at zero balance; either way nothing is written.
    pub fn forgive_streak(&self, user_id: i64) -> Result<ForgivenessOutcome> {
        self.conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
        let result: Result<ForgivenessOutcome> = (|| {
            let current = self.get_streak(user_id)?;
            let plan = forgiveness::plan_restore(current.as_ref())?;
            let balance = self
                .user_tokens(user_id)?
                .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))?;
            if balance <= 0 {
                return Err(CoreError::InsufficientTokens);
            }
            self.conn.execute(
                "UPDATE users SET forgiveness_tokens = forgiveness_tokens - 1 WHERE id = ?1",
                params![user_id],
            )?;
            self.conn.execute(
                "UPDATE streaks SET count = ?1, prev_count = NULL WHERE user_id = ?2",
                params![plan.count, user_id],
            )?;
            let streak = self.get_streak(user_id)?.ok_or_else(|| {
                CoreError::Storage(StorageError::QueryFailed(
                    "streak row vanished during forgiveness".to_string(),
                ))
            })?;
            Ok(ForgivenessOutcome {
                forgiveness_tokens: balance - 1,
                streak,
            })
        })();
        match result {
            Ok(outcome) => {
                self.conn.execute_batch("COMMIT;")?;
                Ok(outcome)
            }
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(err)
            }
        }
    }

    /// Back-fill one missed day: spend one token, credit the count, write the
    /// back-dated entry.
    ///
    /// # Errors
    /// `DayAlreadyActive` if the day has journal activity, `ValidationError`
    /// for a non-past day, `InsufficientTokens` at zero balance; any failure
    /// rolls the whole recovery back.
    pub fn recover_day(
        &self,
        user_id: i64,
        date: NaiveDate,
        today: NaiveDate,
        reason: &str,
        mitigation: &str,
    ) -> Result<RecoveryOutcome> {
        self.conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
        let result: Result<RecoveryOutcome> = (|| {
            if self.has_activity_on(user_id, date)? {
                return Err(CoreError::DayAlreadyActive { date });
            }
            let current = self.get_streak(user_id)?;
            let plan = forgiveness::plan_recovery(current.as_ref(), date, today)?;
            let balance = self
                .user_tokens(user_id)?
                .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))?;
            if balance <= 0 {
                return Err(CoreError::InsufficientTokens);
            }
            self.conn.execute(
                "UPDATE users SET forgiveness_tokens = forgiveness_tokens - 1 WHERE id = ?1",
                params![user_id],
            )?;
            let prev_count = current.as_ref().and_then(|s| s.prev_count);
            let streak = self.write_ledger(user_id, plan.count, prev_count, plan.last_updated)?;
            let entry = self.insert_entry(user_id, reason, mitigation, None, plan.created_at)?;
            Ok(RecoveryOutcome {
                forgiveness_tokens: balance - 1,
                streak,
                entry,
            })
        })();
        match result {
            Ok(outcome) => {
                self.conn.execute_batch("COMMIT;")?;
                Ok(outcome)
            }
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at_noon(day: NaiveDate) -> DateTime<Utc> {
        day.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap()).and_utc()
    }

    fn test_db() -> Database {
        Database::open_memory().unwrap()
    }

    fn make_user(db: &Database) -> User {
        db.create_user("ada@example.com", "ada", 2, at_noon(date(2024, 1, 10)))
            .unwrap()
    }

    #[test]
    fn open_memory_lands_on_latest_schema() {
        let db = test_db();
        let version: i32 = db
            .conn()
            .query_row("SELECT version FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 3);
    }

    #[test]
    fn create_and_fetch_user() {
        let db = test_db();
        let user = make_user(&db);
        assert_eq!(user.forgiveness_tokens, 2);
        assert_eq!(user.dp, None);

        let by_id = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(by_id.username, "ada@example.com");

        let by_name = db.get_user_by_username("ada@example.com").unwrap().unwrap();
        assert_eq!(by_name.id, user.id);

        assert!(db.get_user(999).unwrap().is_none());
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let db = test_db();
        make_user(&db);
        assert!(db
            .create_user("ada@example.com", "ada", 2, at_noon(date(2024, 1, 11)))
            .is_err());
    }

    #[test]
    fn profile_updates_persist() {
        let db = test_db();
        let user = make_user(&db);
        db.update_user_name(user.id, "Ada Lovelace").unwrap();
        db.update_user_dp(user.id, "/uploads/ada.png").unwrap();

        let back = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(back.name, "Ada Lovelace");
        assert_eq!(back.dp.as_deref(), Some("/uploads/ada.png"));
    }

    #[test]
    fn refill_adjusts_balance_and_rejects_unknown_users() {
        let db = test_db();
        let user = make_user(&db);
        assert_eq!(db.refill_tokens(user.id, 3).unwrap(), 5);
        assert_eq!(db.user_tokens(user.id).unwrap(), Some(5));
        assert!(matches!(
            db.refill_tokens(999, 1),
            Err(CoreError::UserNotFound(_))
        ));
    }

    #[test]
    fn tasks_list_by_deadline_and_respect_archive_flag() {
        let db = test_db();
        let user = make_user(&db);
        let now = at_noon(date(2024, 1, 10));
        let later = db
            .create_task(user.id, "later quest", at_noon(date(2024, 2, 1)), 3, now)
            .unwrap();
        let sooner = db
            .create_task(user.id, "sooner quest", at_noon(date(2024, 1, 15)), 1, now)
            .unwrap();

        let listed = db.list_tasks(user.id, false).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, sooner.id);
        assert_eq!(listed[1].id, later.id);

        let mut archived = later.clone();
        archived.archived = true;
        db.update_task(&archived).unwrap();

        assert_eq!(db.list_tasks(user.id, false).unwrap().len(), 1);
        assert_eq!(db.list_tasks(user.id, true).unwrap().len(), 2);
    }

    #[test]
    fn update_task_persists_all_columns() {
        let db = test_db();
        let user = make_user(&db);
        let now = at_noon(date(2024, 1, 10));
        let mut task = db
            .create_task(user.id, "quest", at_noon(date(2024, 1, 15)), 3, now)
            .unwrap();

        task.text = "renamed quest".to_string();
        task.progress = 3;
        task.completed = true;
        task.updated_at = at_noon(date(2024, 1, 11));
        db.update_task(&task).unwrap();

        let back = db.get_task(user.id, task.id).unwrap().unwrap();
        assert_eq!(back.text, "renamed quest");
        assert_eq!(back.progress, 3);
        assert!(back.completed);
    }

    #[test]
    fn get_task_is_scoped_to_the_owner() {
        let db = test_db();
        let user = make_user(&db);
        let other = db
            .create_user("ben@example.com", "ben", 2, at_noon(date(2024, 1, 10)))
            .unwrap();
        let task = db
            .create_task(user.id, "quest", at_noon(date(2024, 1, 15)), 1, at_noon(date(2024, 1, 10)))
            .unwrap();
        assert!(db.get_task(other.id, task.id).unwrap().is_none());
    }

    #[test]
    fn delete_task_cascades_its_journal_entries() {
        let db = test_db();
        let user = make_user(&db);
        let now = at_noon(date(2024, 1, 10));
        let task = db
            .create_task(user.id, "quest", at_noon(date(2024, 1, 15)), 1, now)
            .unwrap();
        db.insert_entry(user.id, "done early", "keep pace", Some(task.id), now)
            .unwrap();
        db.insert_entry(user.id, "unrelated note", "none", None, now)
            .unwrap();

        db.delete_task(user.id, task.id).unwrap();

        let entries = db.list_entries(user.id).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, "unrelated note");
        assert!(db.get_task(user.id, task.id).unwrap().is_none());

        assert!(matches!(
            db.delete_task(user.id, task.id),
            Err(CoreError::TaskNotFound { .. })
        ));
    }

    #[test]
    fn entries_list_newest_first() {
        let db = test_db();
        let user = make_user(&db);
        db.insert_entry(user.id, "first", "n/a", None, at_noon(date(2024, 1, 10)))
            .unwrap();
        db.insert_entry(user.id, "second", "n/a", None, at_noon(date(2024, 1, 11)))
            .unwrap();

        let entries = db.list_entries(user.id).unwrap();
        assert_eq!(entries[0].reason, "second");
        assert_eq!(entries[1].reason, "first");
    }

    #[test]
    fn record_login_entry_is_idempotent_per_day() {
        let db = test_db();
        let user = make_user(&db);
        let morning = date(2024, 1, 10).and_time(NaiveTime::from_hms_opt(8, 0, 0).unwrap()).and_utc();
        let evening = date(2024, 1, 10).and_time(NaiveTime::from_hms_opt(20, 0, 0).unwrap()).and_utc();

        assert!(db.record_login_entry(user.id, morning).unwrap().is_some());
        assert!(db.record_login_entry(user.id, evening).unwrap().is_none());
        assert_eq!(db.list_entries(user.id).unwrap().len(), 1);

        // Next day gets its own marker.
        assert!(db
            .record_login_entry(user.id, at_noon(date(2024, 1, 11)))
            .unwrap()
            .is_some());
        assert_eq!(db.list_entries(user.id).unwrap().len(), 2);
    }

    #[test]
    fn reflections_do_not_satisfy_the_login_marker() {
        let db = test_db();
        let user = make_user(&db);
        let now = at_noon(date(2024, 1, 10));
        db.insert_entry(user.id, "missed standup", "set alarm", None, now)
            .unwrap();

        assert!(db.record_login_entry(user.id, now).unwrap().is_some());
        assert_eq!(db.list_entries(user.id).unwrap().len(), 2);
    }

    #[test]
    fn has_activity_on_respects_day_bounds() {
        let db = test_db();
        let user = make_user(&db);
        db.insert_entry(user.id, "note", "n/a", None, journal::backdate(date(2024, 1, 12)))
            .unwrap();

        assert!(db.has_activity_on(user.id, date(2024, 1, 12)).unwrap());
        assert!(!db.has_activity_on(user.id, date(2024, 1, 11)).unwrap());
        assert!(!db.has_activity_on(user.id, date(2024, 1, 13)).unwrap());
    }

    #[test]
    fn activity_by_day_groups_entries() {
        let db = test_db();
        let user = make_user(&db);
        db.insert_entry(user.id, "a", "n/a", None, at_noon(date(2024, 1, 10)))
            .unwrap();
        db.insert_entry(user.id, "b", "n/a", None, at_noon(date(2024, 1, 10)))
            .unwrap();
        db.insert_entry(user.id, "c", "n/a", None, at_noon(date(2024, 1, 12)))
            .unwrap();
        db.insert_entry(user.id, "old", "n/a", None, at_noon(date(2023, 12, 1)))
            .unwrap();

        let days = db.activity_by_day(user.id, date(2024, 1, 1)).unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].day, date(2024, 1, 10));
        assert_eq!(days[0].entries, 2);
        assert_eq!(days[1].day, date(2024, 1, 12));
        assert_eq!(days[1].entries, 1);
    }

    #[test]
    fn evaluate_streak_creates_then_advances_the_ledger() {
        let db = test_db();
        let user = make_user(&db);

        let (eval, row) = db.evaluate_streak(user.id, date(2024, 1, 10)).unwrap();
        assert!(!eval.broken);
        assert_eq!(row.count, 1);
        assert_eq!(row.last_updated, date(2024, 1, 10));

        // Same day again: no mutation, same row.
        let (eval, again) = db.evaluate_streak(user.id, date(2024, 1, 10)).unwrap();
        assert!(eval.is_noop());
        assert_eq!(again, row);

        let (eval, row) = db.evaluate_streak(user.id, date(2024, 1, 11)).unwrap();
        assert!(!eval.broken);
        assert_eq!(row.count, 2);
        assert_eq!(row.last_updated, date(2024, 1, 11));
    }

    #[test]
    fn evaluate_streak_snapshots_on_break() {
        let db = test_db();
        let user = make_user(&db);
        db.evaluate_streak(user.id, date(2024, 1, 9)).unwrap();
        db.evaluate_streak(user.id, date(2024, 1, 10)).unwrap();

        let (eval, row) = db.evaluate_streak(user.id, date(2024, 1, 15)).unwrap();
        assert!(eval.broken);
        assert_eq!(row.count, 1);
        assert_eq!(row.prev_count, Some(2));
        assert_eq!(row.last_updated, date(2024, 1, 15));
    }

    #[test]
    fn forgive_needs_a_ledger_and_a_break() {
        let db = test_db();
        let user = make_user(&db);
        assert!(matches!(
            db.forgive_streak(user.id),
            Err(CoreError::NoStreakToForgive)
        ));

        db.evaluate_streak(user.id, date(2024, 1, 10)).unwrap();
        assert!(matches!(
            db.forgive_streak(user.id),
            Err(CoreError::NoStreakToForgive)
        ));
    }

    #[test]
    fn forgive_restores_and_clears_the_snapshot() {
        let db = test_db();
        let user = make_user(&db);
        // Build a 5-day run ending 2024-01-10, then break on the 15th.
        for offset in 0..5 {
            db.evaluate_streak(user.id, date(2024, 1, 6 + offset)).unwrap();
        }
        let (eval, _) = db.evaluate_streak(user.id, date(2024, 1, 15)).unwrap();
        assert!(eval.broken);

        let outcome = db.forgive_streak(user.id).unwrap();
        assert_eq!(outcome.forgiveness_tokens, 1);
        assert_eq!(outcome.streak.count, 6);
        assert_eq!(outcome.streak.prev_count, None);
        assert_eq!(outcome.streak.last_updated, date(2024, 1, 15));

        // The snapshot is spent; a second forgive has nothing to restore.
        assert!(matches!(
            db.forgive_streak(user.id),
            Err(CoreError::NoStreakToForgive)
        ));
    }

    #[test]
    fn forgive_without_tokens_changes_nothing() {
        let db = test_db();
        let user = db
            .create_user("broke@example.com", "broke", 0, at_noon(date(2024, 1, 1)))
            .unwrap();
        db.evaluate_streak(user.id, date(2024, 1, 10)).unwrap();
        let (eval, before) = db.evaluate_streak(user.id, date(2024, 1, 15)).unwrap();
        assert!(eval.broken);

        assert!(matches!(
            db.forgive_streak(user.id),
            Err(CoreError::InsufficientTokens)
        ));
        assert_eq!(db.get_streak(user.id).unwrap().unwrap(), before);
        assert_eq!(db.user_tokens(user.id).unwrap(), Some(0));
    }

    #[test]
    fn recover_day_rejects_active_days() {
        let db = test_db();
        let user = make_user(&db);
        db.insert_entry(user.id, "note", "n/a", None, at_noon(date(2024, 1, 12)))
            .unwrap();

        assert!(matches!(
            db.recover_day(user.id, date(2024, 1, 12), date(2024, 1, 15), "sick", "rest"),
            Err(CoreError::DayAlreadyActive { .. })
        ));
        assert_eq!(db.user_tokens(user.id).unwrap(), Some(2));
    }

    #[test]
    fn recover_day_credits_and_backdates() {
        let db = test_db();
        let user = make_user(&db);
        db.evaluate_streak(user.id, date(2024, 1, 10)).unwrap();
        db.evaluate_streak(user.id, date(2024, 1, 15)).unwrap();

        let outcome = db
            .recover_day(user.id, date(2024, 1, 12), date(2024, 1, 15), "sick day", "rest up")
            .unwrap();
        assert_eq!(outcome.forgiveness_tokens, 1);
        assert_eq!(outcome.streak.count, 2);
        // Recovery never moves the ledger date.
        assert_eq!(outcome.streak.last_updated, date(2024, 1, 15));
        assert_eq!(
            outcome.entry.created_at.to_rfc3339(),
            "2024-01-12T00:00:00+00:00"
        );

        // The recovered day now reads as active.
        assert!(db.has_activity_on(user.id, date(2024, 1, 12)).unwrap());
    }

    #[test]
    fn recover_day_without_tokens_writes_nothing() {
        let db = test_db();
        let user = db
            .create_user("broke@example.com", "broke", 0, at_noon(date(2024, 1, 1)))
            .unwrap();
        db.evaluate_streak(user.id, date(2024, 1, 15)).unwrap();
        let before = db.get_streak(user.id).unwrap().unwrap();

        assert!(matches!(
            db.recover_day(user.id, date(2024, 1, 12), date(2024, 1, 15), "sick", "rest"),
            Err(CoreError::InsufficientTokens)
        ));
        assert_eq!(db.list_entries(user.id).unwrap().len(), 0);
        assert_eq!(db.get_streak(user.id).unwrap().unwrap(), before);
    }

    #[test]
    fn recover_day_creates_a_ledger_when_missing() {
        let db = test_db();
        let user = make_user(&db);

        let outcome = db
            .recover_day(user.id, date(2024, 1, 12), date(2024, 1, 15), "sick day", "rest up")
            .unwrap();
        assert_eq!(outcome.streak.count, 1);
        assert_eq!(outcome.streak.last_updated, date(2024, 1, 12));
    }

    #[test]
    fn delete_user_cascades_everything() {
        let db = test_db();
        let user = make_user(&db);
        let now = at_noon(date(2024, 1, 10));
        let task = db
            .create_task(user.id, "quest", at_noon(date(2024, 1, 15)), 1, now)
            .unwrap();
        db.insert_entry(user.id, "note", "n/a", Some(task.id), now)
            .unwrap();
        db.evaluate_streak(user.id, date(2024, 1, 10)).unwrap();

        db.delete_user(user.id).unwrap();

        assert!(db.get_user(user.id).unwrap().is_none());
        assert!(db.get_streak(user.id).unwrap().is_none());
        assert!(db.list_tasks(user.id, true).unwrap().is_empty());
        assert!(db.list_entries(user.id).unwrap().is_empty());

        assert!(matches!(
            db.delete_user(user.id),
            Err(CoreError::UserNotFound(_))
        ));
    }
}
