//! Access to the local calendar store.
//!
//! Event identifiers come from an external command (an AppleScript that asks
//! Calendar.app for today's events by default). Each identifier maps to one
//! `.ics` file under `~/Library/Calendars/<account>/<calendar>/Events/`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use glob::Pattern;
use thiserror::Error;
use tracing::{debug, trace};

/// Default command printing the comma-separated identifiers of current events.
pub const DEFAULT_UIDS_COMMAND: [&str; 2] = ["osascript", "get-event-uids.applescript"];

/// Errors raised while enumerating or reading events.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no event enumeration command configured")]
    EmptyCommand,

    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("no calendar file for event {uid}")]
    NotFound { uid: String },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Something that can list current events and hand out their record text.
pub trait EventSource {
    /// Identifiers of the events to consider, in display order.
    fn event_uids(&self) -> SourceResult<Vec<String>>;

    /// Path of the record for an identifier.
    fn locate(&self, uid: &str) -> SourceResult<PathBuf>;

    /// Reads the record text for an identifier.
    fn read_record(&self, uid: &str) -> SourceResult<String> {
        let path = self.locate(uid)?;
        fs::read_to_string(&path).map_err(|source| SourceError::Read { path, source })
    }
}

/// The macOS calendar store: an enumeration command plus a directory tree.
#[derive(Debug, Clone)]
pub struct CalendarStore {
    calendar_dir: PathBuf,
    uids_command: Vec<String>,
    calendar_names: Vec<String>,
}

impl CalendarStore {
    /// Creates a store rooted at `calendar_dir` using the default command.
    pub fn new(calendar_dir: impl Into<PathBuf>) -> Self {
        Self {
            calendar_dir: calendar_dir.into(),
            uids_command: DEFAULT_UIDS_COMMAND.iter().map(|s| s.to_string()).collect(),
            calendar_names: Vec::new(),
        }
    }

    /// Builder: set the enumeration command (program followed by arguments).
    pub fn with_uids_command(mut self, command: Vec<String>) -> Self {
        self.uids_command = command;
        self
    }

    /// Builder: set the calendar allow-list passed to the command.
    pub fn with_calendar_names(mut self, names: Vec<String>) -> Self {
        self.calendar_names = names;
        self
    }

    pub fn calendar_dir(&self) -> &Path {
        &self.calendar_dir
    }

    /// Returns the default calendar directory (`~/Library/Calendars`).
    pub fn default_calendar_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Library")
            .join("Calendars")
    }
}

impl EventSource for CalendarStore {
    fn event_uids(&self) -> SourceResult<Vec<String>> {
        let (program, args) = self.uids_command.split_first().ok_or(SourceError::EmptyCommand)?;
        let command_line = self.uids_command.join(" ");
        debug!(command = %command_line, "enumerating events");

        let output = Command::new(program)
            .args(args)
            .env("calendar_names", self.calendar_names.join(","))
            .output()
            .map_err(|source| SourceError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SourceError::CommandFailed {
                command: command_line,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let uids = parse_uid_output(&String::from_utf8_lossy(&output.stdout));
        debug!(count = uids.len(), "enumerated events");
        Ok(uids)
    }

    fn locate(&self, uid: &str) -> SourceResult<PathBuf> {
        let file_name = format!("{}.ics", normalize_uid(uid));
        find_event_file(&self.calendar_dir, &file_name).ok_or_else(|| SourceError::NotFound {
            uid: uid.to_string(),
        })
    }
}

/// Parses the enumeration output: comma-separated identifiers with every `.`
/// removed. Blank output means no events.
pub fn parse_uid_output(output: &str) -> Vec<String> {
    output
        .replace('.', "")
        .split(',')
        .map(str::trim)
        .filter(|uid| !uid.is_empty())
        .map(String::from)
        .collect()
}

/// Removes the `.` characters the calendar store drops from file names.
pub fn normalize_uid(uid: &str) -> String {
    uid.replace('.', "")
}

/// Looks for `<root>/*/*/Events/<file_name>`. When several calendars hold
/// the file, the first path in name order wins.
fn find_event_file(root: &Path, file_name: &str) -> Option<PathBuf> {
    let pattern = format!(
        "{}/*/*/Events/{}",
        Pattern::escape(&root.to_string_lossy()),
        Pattern::escape(file_name)
    );
    trace!(pattern = %pattern, "looking up event file");

    let paths = match glob::glob(&pattern) {
        Ok(paths) => paths,
        Err(e) => {
            debug!(pattern = %pattern, error = %e, "invalid lookup pattern");
            return None;
        }
    };
    paths.filter_map(Result::ok).filter(|p| p.is_file()).min()
}
