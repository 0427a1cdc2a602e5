//! Client configuration.
//!
//! Settings are layered, lowest precedence first:
//!
//! 1. built-in defaults,
//! 2. `~/.config/meetlink/config.toml`,
//! 3. environment variables and command-line flags (see [`crate::cli`]).
//!
//! The launcher sets the environment variables using the same lowercase
//! names as the TOML keys (`conference_domains`, `use_direct_zoom`, ...).

use std::path::{Path, PathBuf};

use meetlink_core::config::{DEFAULT_EVENT_TIME_THRESHOLD_MINS, keys};
use meetlink_core::links::DEFAULT_PROVIDER_DOMAINS;
use meetlink_core::{ConferenceConfig, FallbackZone};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};
use crate::source::{CalendarStore, DEFAULT_UIDS_COMMAND};

/// Configuration for the meetlink client (`config.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Provider domain globs.
    pub conference_domains: Vec<String>,

    /// Calendars passed to the enumeration command; empty means all.
    pub calendar_names: Vec<String>,

    /// Open Zoom links in the desktop app.
    pub use_direct_zoom: bool,

    /// Open Teams links in the desktop app.
    pub use_direct_msteams: bool,

    /// Minutes before/after the start an event is shown.
    pub event_time_threshold_mins: u32,

    /// Zone for floating times and unknown TZIDs: `local`, `utc` or `+HH:MM`.
    pub fallback_timezone: String,

    /// Calendar store settings.
    #[serde(default)]
    pub source: SourceSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            conference_domains: DEFAULT_PROVIDER_DOMAINS
                .split(',')
                .map(|d| d.trim().to_string())
                .collect(),
            calendar_names: Vec::new(),
            use_direct_zoom: false,
            use_direct_msteams: false,
            event_time_threshold_mins: DEFAULT_EVENT_TIME_THRESHOLD_MINS,
            fallback_timezone: FallbackZone::HostLocal.to_string(),
            source: SourceSettings::default(),
        }
    }
}

/// Where events come from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Root of the calendar store (default `~/Library/Calendars`).
    pub calendar_dir: Option<PathBuf>,

    /// Enumeration command and arguments.
    pub uids_command: Option<Vec<String>>,
}

impl ClientConfig {
    /// Loads configuration from the default path, or defaults if it does not
    /// exist.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            ClientError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("meetlink")
    }

    /// Flattens the file settings into core configuration pairs.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            (keys::CONFERENCE_DOMAINS, self.conference_domains.join(",")),
            (keys::CALENDAR_NAMES, self.calendar_names.join(",")),
            (keys::USE_DIRECT_ZOOM, self.use_direct_zoom.to_string()),
            (keys::USE_DIRECT_MSTEAMS, self.use_direct_msteams.to_string()),
            (
                keys::EVENT_TIME_THRESHOLD_MINS,
                self.event_time_threshold_mins.to_string(),
            ),
            (keys::FALLBACK_TIMEZONE, self.fallback_timezone.clone()),
        ]
    }

    /// Builds the core configuration, applying `overrides` on top of the
    /// file settings.
    pub fn conference_config(
        &self,
        overrides: &[(&'static str, String)],
    ) -> ClientResult<ConferenceConfig> {
        let pairs = self.to_pairs().into_iter().chain(overrides.iter().cloned());
        Ok(ConferenceConfig::from_pairs(pairs)?)
    }

    /// Builds the calendar store, preferring explicit arguments over the
    /// file settings.
    pub fn calendar_store(
        &self,
        calendar_dir: Option<PathBuf>,
        uids_command: Option<Vec<String>>,
        conference: &ConferenceConfig,
    ) -> CalendarStore {
        let dir = calendar_dir
            .or_else(|| self.source.calendar_dir.clone())
            .unwrap_or_else(CalendarStore::default_calendar_dir);
        let command = uids_command
            .or_else(|| self.source.uids_command.clone())
            .unwrap_or_else(|| DEFAULT_UIDS_COMMAND.iter().map(|s| s.to_string()).collect());

        CalendarStore::new(dir)
            .with_uids_command(command)
            .with_calendar_names(conference.calendar_names().to_vec())
    }
}
