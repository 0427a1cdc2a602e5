//! meetlink CLI entry point.

use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;
use meetlink_core::tracing::{TracingConfig, init_tracing};

use meetlink_client::App;
use meetlink_client::cli::{Cli, Command, ConfigAction};
use meetlink_client::commands;
use meetlink_client::config::ClientConfig;
use meetlink_client::error::ClientResult;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing_config = if cli.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::default()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> ClientResult<()> {
    let config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load()?,
    };
    let conference = config.conference_config(&cli.overrides())?;

    match &cli.command {
        Some(Command::Config { action }) => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Validate => commands::config::validate(&conference),
            ConfigAction::Path => commands::config::path(),
        },
        Some(Command::Parse { file }) => commands::parse::run(file, &conference),
        Some(Command::List) | None => {
            let now = cli.now.map_or_else(Utc::now, |t| t.with_timezone(&Utc));
            let store =
                config.calendar_store(cli.calendar_dir.clone(), cli.uids_command_args(), &conference);
            let app = App::new(store, conference);
            commands::list::run(&app, now)
        }
    }
}
