//! Task management commands for CLI.

use chrono::{DateTime, Utc};
use clap::Subcommand;
use questlog_core::{App, TaskPatch};

use super::resolve_user;

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a new task
    Create {
        /// Task text
        text: String,
        /// Username the task belongs to
        #[arg(long)]
        user: String,
        /// Deadline, RFC 3339 or YYYY-MM-DD (end of day UTC)
        #[arg(long)]
        deadline: String,
        /// Progress steps until the task is done (default: 1)
        #[arg(long, default_value = "1")]
        total: i64,
    },
    /// List tasks ordered by deadline
    List {
        /// Username
        #[arg(long)]
        user: String,
        /// Include archived tasks
        #[arg(long)]
        all: bool,
    },
    /// Get task details
    Get {
        /// Task ID
        id: i64,
        /// Username
        #[arg(long)]
        user: String,
    },
    /// Update a task
    Update {
        /// Task ID
        id: i64,
        /// Username
        #[arg(long)]
        user: String,
        /// New text
        #[arg(long)]
        text: Option<String>,
        /// New deadline, RFC 3339 or YYYY-MM-DD
        #[arg(long)]
        deadline: Option<String>,
        /// New progress value
        #[arg(long)]
        progress: Option<i64>,
        /// New progress target
        #[arg(long)]
        total: Option<i64>,
        /// Set completed status (may return a streak verdict)
        #[arg(long)]
        completed: Option<bool>,
        /// Set archived status
        #[arg(long)]
        archived: Option<bool>,
    },
    /// Add progress, deriving completion when the target is reached
    Bump {
        /// Task ID
        id: i64,
        /// Username
        #[arg(long)]
        user: String,
        /// Steps to add (default: 1)
        #[arg(long, default_value = "1")]
        by: i64,
    },
    /// Delete a task and its journal entries
    Delete {
        /// Task ID
        id: i64,
        /// Username
        #[arg(long)]
        user: String,
    },
}

fn parse_deadline(s: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date: chrono::NaiveDate = s.parse()?;
    Ok(date.and_hms_opt(23, 59, 59).unwrap_or_default().and_utc())
}

pub fn run(action: TaskAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;

    match action {
        TaskAction::Create {
            text,
            user,
            deadline,
            total,
        } => {
            let user = resolve_user(&app, &user)?;
            let deadline = parse_deadline(&deadline)?;
            let task = app.create_task(user.id, &text, deadline, total)?;
            println!("Task created: {}", task.id);
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskAction::List { user, all } => {
            let user = resolve_user(&app, &user)?;
            let tasks = app.list_tasks(user.id, all)?;
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }
        TaskAction::Get { id, user } => {
            let user = resolve_user(&app, &user)?;
            let task = app.get_task(user.id, id)?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskAction::Update {
            id,
            user,
            text,
            deadline,
            progress,
            total,
            completed,
            archived,
        } => {
            let user = resolve_user(&app, &user)?;
            let deadline = deadline.map(|d| parse_deadline(&d)).transpose()?;
            let patch = TaskPatch {
                text,
                completed,
                deadline,
                progress,
                total,
                archived,
            };
            let outcome = app.update_task(user.id, id, &patch)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        TaskAction::Bump { id, user, by } => {
            let user = resolve_user(&app, &user)?;
            let task = app.get_task(user.id, id)?;
            let progress = task.progress + by;
            let patch = TaskPatch {
                progress: Some(progress),
                completed: Some(progress >= task.total),
                ..Default::default()
            };
            let outcome = app.update_task(user.id, id, &patch)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        TaskAction::Delete { id, user } => {
            let user = resolve_user(&app, &user)?;
            app.delete_task(user.id, id)?;
            println!("Task deleted: {id}");
        }
    }
    Ok(())
}
