//! CLI subcommand implementations.

pub mod config;
pub mod journal;
pub mod session;
pub mod streak;
pub mod task;
pub mod tokens;

use questlog_core::{App, User};

/// Resolve `--user` the way the identity provider would: provision the
/// account on first use, fetch it afterwards.
pub(crate) fn resolve_user(app: &App, username: &str) -> Result<User, Box<dyn std::error::Error>> {
    Ok(app.login(username)?.user)
}
