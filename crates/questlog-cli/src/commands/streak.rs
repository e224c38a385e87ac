//! Streak ledger commands: inspection and the two repair modes.

use chrono::NaiveDate;
use clap::Subcommand;
use questlog_core::App;

use super::resolve_user;

#[derive(Subcommand)]
pub enum StreakAction {
    /// Show the current streak ledger
    Show {
        /// Username
        #[arg(long)]
        user: String,
    },
    /// Spend a token to restore the run lost at the last break
    Forgive {
        /// Username
        #[arg(long)]
        user: String,
    },
    /// Spend a token to back-fill a missed day with a reflection
    Recover {
        /// Username
        #[arg(long)]
        user: String,
        /// Day to recover, YYYY-MM-DD (must be in the past)
        #[arg(long)]
        date: NaiveDate,
        /// What went wrong that day
        #[arg(long)]
        reason: String,
        /// What will keep it from happening again
        #[arg(long)]
        mitigation: String,
    },
    /// Per-day activity counts over the configured window
    Grid {
        /// Username
        #[arg(long)]
        user: String,
    },
}

pub fn run(action: StreakAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;

    match action {
        StreakAction::Show { user } => {
            let user = resolve_user(&app, &user)?;
            match app.get_streak(user.id)? {
                Some(streak) => println!("{}", serde_json::to_string_pretty(&streak)?),
                None => println!("No streak yet"),
            }
        }
        StreakAction::Forgive { user } => {
            let user = resolve_user(&app, &user)?;
            let outcome = app.forgive(user.id)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        StreakAction::Recover {
            user,
            date,
            reason,
            mitigation,
        } => {
            let user = resolve_user(&app, &user)?;
            let outcome = app.recover_day(user.id, date, &reason, &mitigation)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        StreakAction::Grid { user } => {
            let user = resolve_user(&app, &user)?;
            let days = app.activity_by_day(user.id)?;
            println!("{}", serde_json::to_string_pretty(&days)?);
        }
    }
    Ok(())
}
