//! Forgiveness token commands.

use clap::Subcommand;
use questlog_core::App;

use super::resolve_user;

#[derive(Subcommand)]
pub enum TokensAction {
    /// Show the current balance
    Show {
        /// Username
        #[arg(long)]
        user: String,
    },
    /// Add tokens (requires the `[debug] token_refill` config flag)
    Refill {
        /// Username
        #[arg(long)]
        user: String,
        /// Tokens to add (default: 1)
        #[arg(long, default_value = "1")]
        amount: i64,
    },
}

pub fn run(action: TokensAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;

    match action {
        TokensAction::Show { user } => {
            let user = resolve_user(&app, &user)?;
            let balance = app.tokens(user.id)?;
            println!("{balance}");
        }
        TokensAction::Refill { user, amount } => {
            let user = resolve_user(&app, &user)?;
            let balance = app.refill_tokens(user.id, amount)?;
            println!("{balance}");
        }
    }
    Ok(())
}
