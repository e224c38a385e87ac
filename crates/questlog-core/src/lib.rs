//! # Questlog Core Library
//!
//! This library provides the core business logic for Questlog, a personal
//! task tracker with gamified habit streaks. It implements a CLI-first
//! philosophy where all operations are available via a standalone CLI binary,
//! with any HTTP or GUI surface being a thin layer over the same core library.
//!
//! ## Architecture
//!
//! - **Streak Engine**: A pure calendar-day state machine; callers supply
//!   "today" through an injected clock and storage persists the transition
//! - **Forgiveness Economy**: Scarce per-user tokens spent to repair broken
//!   streaks, always atomically with the paired ledger/journal mutation
//! - **Activity Journal**: Append-only dated record of logins, reflections,
//!   and recovery credits; source of truth for "active on day D"
//! - **Storage**: SQLite-based persistence and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`App`]: The application service tying the pieces together
//! - [`Database`]: User, task, journal, and streak persistence
//! - [`Config`]: Application configuration management
//! - [`Clock`]: Time source abstraction for deterministic tests

pub mod app;
pub mod clock;
pub mod error;
pub mod journal;
pub mod storage;
pub mod streak;
pub mod task;
pub mod user;

pub use app::{App, AppLoadOutcome, LoginOutcome, TaskUpdateOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, Result, StorageError, ValidationError};
pub use journal::{DayActivity, JournalEntry};
pub use storage::{data_dir, Config, Database};
pub use streak::{DayState, Evaluation, ForgivenessOutcome, RecoveryOutcome, Streak};
pub use task::{Task, TaskPatch};
pub use user::User;
