//! Command-line interface definition.
//!
//! The conference settings can also come from the environment, using the
//! lowercase variable names a launcher workflow sets (`use_direct_zoom=true`).

use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use clap::{Parser, Subcommand};
use meetlink_core::config::keys;

/// meetlink - join the meeting that is about to start
#[derive(Debug, Parser)]
#[command(name = "meetlink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "MEETLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output (on stderr)
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Pretend the current time is this RFC 3339 timestamp
    #[arg(long, value_parser = parse_now)]
    pub now: Option<DateTime<FixedOffset>>,

    // --- Calendar store ---
    /// Root of the calendar store
    #[arg(long, env = "MEETLINK_CALENDAR_DIR")]
    pub calendar_dir: Option<PathBuf>,

    /// Command printing comma-separated event identifiers, one argument per
    /// word (end the list with `;` before a subcommand)
    #[arg(
        long,
        env = "MEETLINK_UIDS_COMMAND",
        num_args = 1..,
        allow_hyphen_values = true,
        value_terminator = ";"
    )]
    pub uids_command: Option<Vec<String>>,

    // --- Conference settings ---
    /// Comma-separated provider domain globs
    #[arg(long, env = keys::CONFERENCE_DOMAINS)]
    pub conference_domains: Option<String>,

    /// Comma-separated calendar names to include
    #[arg(long, env = keys::CALENDAR_NAMES)]
    pub calendar_names: Option<String>,

    /// Open Zoom links in the desktop app (true/false)
    #[arg(long, env = keys::USE_DIRECT_ZOOM)]
    pub use_direct_zoom: Option<String>,

    /// Open Teams links in the desktop app (true/false)
    #[arg(long, env = keys::USE_DIRECT_MSTEAMS)]
    pub use_direct_msteams: Option<String>,

    /// Minutes before/after the start time an event is shown
    #[arg(long, env = keys::EVENT_TIME_THRESHOLD_MINS)]
    pub event_time_threshold_mins: Option<String>,

    /// Zone for floating times and unknown timezones (local, utc, +HH:MM)
    #[arg(long, env = keys::FALLBACK_TIMEZONE)]
    pub fallback_timezone: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Conference settings given on the command line or in the environment,
    /// as core configuration pairs.
    pub fn overrides(&self) -> Vec<(&'static str, String)> {
        [
            (keys::CONFERENCE_DOMAINS, &self.conference_domains),
            (keys::CALENDAR_NAMES, &self.calendar_names),
            (keys::USE_DIRECT_ZOOM, &self.use_direct_zoom),
            (keys::USE_DIRECT_MSTEAMS, &self.use_direct_msteams),
            (keys::EVENT_TIME_THRESHOLD_MINS, &self.event_time_threshold_mins),
            (keys::FALLBACK_TIMEZONE, &self.fallback_timezone),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.clone().map(|v| (key, v)))
        .collect()
    }

    /// The enumeration command as program and arguments.
    pub fn uids_command_args(&self) -> Option<Vec<String>> {
        self.uids_command.clone()
    }
}

fn parse_now(value: &str) -> Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(value).map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print launcher feedback for current meetings (default)
    List,

    /// Print the normalized event of one .ics file as JSON
    Parse {
        /// Path to the .ics file
        file: PathBuf,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("meetlink").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn default_command() {
        let cli = parse(&[]);
        assert!(cli.command.is_none());
        assert!(!cli.debug);
        assert!(cli.now.is_none());
    }

    #[test]
    fn subcommands() {
        let cli = parse(&["parse", "event.ics"]);
        assert!(matches!(cli.command, Some(Command::Parse { ref file }) if file == &PathBuf::from("event.ics")));

        let cli = parse(&["config", "dump"]);
        assert!(matches!(
            cli.command,
            Some(Command::Config {
                action: ConfigAction::Dump
            })
        ));
    }

    #[test]
    fn now_override() {
        let cli = parse(&["--now", "2025-02-05T10:05:00-05:00", "list"]);
        assert_eq!(cli.now.unwrap().to_rfc3339(), "2025-02-05T10:05:00-05:00");
        assert!(Cli::try_parse_from(["meetlink", "--now", "tomorrow"]).is_err());
    }

    #[test]
    fn overrides_from_flags() {
        let cli = parse(&["--use-direct-zoom", "true", "--event-time-threshold-mins", "5"]);
        let overrides = cli.overrides();
        assert!(overrides.contains(&(keys::USE_DIRECT_ZOOM, "true".to_string())));
        assert!(overrides.contains(&(keys::EVENT_TIME_THRESHOLD_MINS, "5".to_string())));
    }

    #[test]
    fn uids_command_keeps_arguments_whole() {
        let cli = parse(&[
            "--uids-command",
            "osascript",
            "/Users/me/Library/Application Support/uids.applescript",
        ]);
        assert_eq!(
            cli.uids_command_args().unwrap(),
            ["osascript", "/Users/me/Library/Application Support/uids.applescript"]
        );
    }

    #[test]
    fn uids_command_ends_before_subcommand() {
        let cli = parse(&["--uids-command", "sh", "-c", "echo A,B", ";", "parse", "event.ics"]);
        assert_eq!(cli.uids_command_args().unwrap(), ["sh", "-c", "echo A,B"]);
        assert!(matches!(cli.command, Some(Command::Parse { .. })));
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
