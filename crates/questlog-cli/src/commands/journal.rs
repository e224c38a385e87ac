//! Activity journal commands.

use clap::Subcommand;
use questlog_core::App;

use super::resolve_user;

#[derive(Subcommand)]
pub enum JournalAction {
    /// List journal entries, newest first
    List {
        /// Username
        #[arg(long)]
        user: String,
    },
    /// Add a reflection entry
    Add {
        /// Username
        #[arg(long)]
        user: String,
        /// What went wrong
        #[arg(long)]
        reason: String,
        /// What will keep it from happening again
        #[arg(long)]
        mitigation: String,
        /// Task the reflection refers to
        #[arg(long)]
        task_id: Option<i64>,
    },
}

pub fn run(action: JournalAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;

    match action {
        JournalAction::List { user } => {
            let user = resolve_user(&app, &user)?;
            let entries = app.list_journal(user.id)?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        JournalAction::Add {
            user,
            reason,
            mitigation,
            task_id,
        } => {
            let user = resolve_user(&app, &user)?;
            let entry = app.add_journal_entry(user.id, &reason, &mitigation, task_id, None)?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
    }
    Ok(())
}
