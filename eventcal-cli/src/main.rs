mod commands;
mod logging;
mod render;
mod singleton;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use eventcal_core::config::AppConfig;
use eventcal_core::{ConfigError, EventError, EventService, EventStore};
use owo_colors::OwoColorize;

#[derive(Parser)]
#[command(name = "eventcal")]
#[command(about = "Keep track of upcoming events and get notified when they are due")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add an event (prompts for anything not given)
    Add {
        description: Option<String>,

        /// When it happens (e.g. "2025-03-20 15:00", "tomorrow 3pm")
        #[arg(short, long)]
        at: Option<String>,
    },
    /// Remove an event by id or unique id prefix
    Remove {
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// List events, earliest first
    List {
        /// Only show events on this day (YYYY-MM-DD, "today", "friday", ...)
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Wait for events to become due and show them one at a time
    Watch {
        /// Also raise a desktop notification for each due event
        #[arg(long)]
        desktop: bool,
    },
    /// Show file locations and configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (config, config_error) = match AppConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    let log_path = config.log_path().ok();
    logging::init(log_path.as_deref());
    logging::install_panic_hook(log_path.clone());

    let result = match config_error {
        Some(e) => Err(e.into()),
        None => run(cli.command, config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(err, log_path),
    }
}

async fn run(command: Commands, config: AppConfig) -> Result<()> {
    match command {
        Commands::Add { description, at } => {
            let service = open_service(&config)?;
            commands::add::run(&service, description, at)
        }
        Commands::Remove { id, yes } => {
            let service = open_service(&config)?;
            commands::remove::run(&service, &id, yes)
        }
        Commands::List { date } => {
            let service = open_service(&config)?;
            commands::list::run(&service, date.as_deref())
        }
        Commands::Watch { desktop } => {
            let service = open_service(&config)?;
            let period = config.poll_interval()?;
            commands::watch::run(Arc::new(service), period, desktop).await
        }
        Commands::Config => commands::config::run(&config),
    }
}

fn open_service(config: &AppConfig) -> Result<EventService> {
    let events_path = config
        .events_path()
        .context("Could not determine where to store events")?;

    Ok(EventService::new(EventStore::new(events_path)))
}

/// Print a failure for the user. Expected failures (bad input, unknown ids,
/// failed saves, bad config) get their own message; anything else is logged
/// in full and reported with a pointer to the log.
fn report(err: anyhow::Error, log_path: Option<PathBuf>) -> ExitCode {
    if let Some(e) = err.downcast_ref::<EventError>() {
        if let EventError::Store(store_error) = e {
            tracing::error!(error = %store_error, "Could not save events");
            eprintln!("{}", format!("Could not save events: {store_error}").red());
        } else {
            eprintln!("{}", e.to_string().red());
        }
        return ExitCode::FAILURE;
    }

    if let Some(e) = err.downcast_ref::<ConfigError>() {
        eprintln!("{}", e.to_string().red());
        return ExitCode::FAILURE;
    }

    if let Some(e) = err.downcast_ref::<commands::UserError>() {
        eprintln!("{}", e.to_string().red());
        return ExitCode::FAILURE;
    }

    tracing::error!(error = ?err, "Unexpected error");
    eprintln!("{}", logging::generic_message(log_path.as_deref()).red());
    ExitCode::FAILURE
}
