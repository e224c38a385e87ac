//! Session commands: login and the app-load flow.

use clap::Subcommand;
use questlog_core::App;

use super::resolve_user;

#[derive(Subcommand)]
pub enum SessionAction {
    /// Log in, provisioning the account on first use
    Login {
        /// Username (an email works; the part before '@' becomes the name)
        username: String,
    },
    /// Run the app-load flow: login marker plus streak evaluation
    Load {
        /// Username to load the session for
        #[arg(long)]
        user: String,
    },
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;

    match action {
        SessionAction::Login { username } => {
            let outcome = app.login(&username)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        SessionAction::Load { user } => {
            let user = resolve_user(&app, &user)?;
            let outcome = app.app_load(user.id)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }
    Ok(())
}
