use clap::{Parser, Subcommand};
use questlog_core::CoreError;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "questlog-cli", version, about = "Questlog CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Session entry points (login, app load)
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
    /// Task management
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// Streak ledger and repairs
    Streak {
        #[command(subcommand)]
        action: commands::streak::StreakAction,
    },
    /// Activity journal
    Journal {
        #[command(subcommand)]
        action: commands::journal::JournalAction,
    },
    /// Forgiveness token balance
    Tokens {
        #[command(subcommand)]
        action: commands::tokens::TokensAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    // Logs go to stderr so stdout stays valid JSON.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Session { action } => commands::session::run(action),
        Commands::Task { action } => commands::task::run(action),
        Commands::Streak { action } => commands::streak::run(action),
        Commands::Journal { action } => commands::journal::run(action),
        Commands::Tokens { action } => commands::tokens::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        // Business-rule failures carry their own message; storage faults get
        // a generic line with the detail behind the log filter.
        match e.downcast_ref::<CoreError>() {
            Some(err) if !err.is_client_error() => {
                tracing::error!(error = %err, "command failed");
                eprintln!("error: storage error");
            }
            _ => eprintln!("error: {e}"),
        }
        std::process::exit(1);
    }
}
