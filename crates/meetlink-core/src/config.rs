//! Conference configuration.
//!
//! [`ConferenceConfig`] is built once by the caller and passed to every core
//! call. It is usually created from the flat key/value pairs a launcher sets
//! in the environment:
//!
//! | key                         | value                                  |
//! |-----------------------------|----------------------------------------|
//! | `conference_domains`        | comma-separated provider globs         |
//! | `calendar_names`            | comma-separated calendar allow-list    |
//! | `use_direct_zoom`           | boolean                                |
//! | `use_direct_msteams`        | boolean                                |
//! | `event_time_threshold_mins` | non-negative integer (default 20)      |
//! | `fallback_timezone`         | `local`, `utc` or `+HH:MM`             |

use std::fmt;

use chrono::{Duration, FixedOffset};
use thiserror::Error;
use tracing::debug;

use crate::links::ProviderRules;
use crate::time::UtcOffset;

/// Recognized configuration keys.
pub mod keys {
    pub const CONFERENCE_DOMAINS: &str = "conference_domains";
    pub const CALENDAR_NAMES: &str = "calendar_names";
    pub const USE_DIRECT_ZOOM: &str = "use_direct_zoom";
    pub const USE_DIRECT_MSTEAMS: &str = "use_direct_msteams";
    pub const EVENT_TIME_THRESHOLD_MINS: &str = "event_time_threshold_mins";
    pub const FALLBACK_TIMEZONE: &str = "fallback_timezone";

    /// Every key, in documentation order.
    pub const ALL: [&str; 6] = [
        CONFERENCE_DOMAINS,
        CALENDAR_NAMES,
        USE_DIRECT_ZOOM,
        USE_DIRECT_MSTEAMS,
        EVENT_TIME_THRESHOLD_MINS,
        FALLBACK_TIMEZONE,
    ];
}

/// Minutes before/after the start time an event counts as current.
pub const DEFAULT_EVENT_TIME_THRESHOLD_MINS: u32 = 20;

/// An invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A provider glob could not be compiled.
    #[error("invalid provider pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A boolean key holds something other than true/false/yes/no/on/off/1/0.
    #[error("invalid boolean for {key}: {value:?}")]
    InvalidBool { key: String, value: String },

    /// An integer key holds something other than a non-negative integer.
    #[error("invalid integer for {key}: {value:?}")]
    InvalidInteger { key: String, value: String },

    /// The fallback timezone is not `local`, `utc` or an offset.
    #[error("invalid fallback timezone {0:?} (expected local, utc or +HH:MM)")]
    InvalidTimezone(String),
}

/// The zone used for floating times and unknown TZIDs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FallbackZone {
    /// The host's configured zone.
    #[default]
    HostLocal,
    Utc,
    Fixed(FixedOffset),
}

impl FallbackZone {
    /// Parses `local`, `utc`/`z`, `+HH:MM`, or `+HHMM` (case-insensitive).
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let trimmed = value.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "local" => return Ok(Self::HostLocal),
            "utc" | "z" => return Ok(Self::Utc),
            _ => {}
        }
        UtcOffset::parse(&trimmed.replace(':', ""))
            .map(|offset| Self::Fixed(offset.fixed()))
            .ok_or_else(|| ConfigError::InvalidTimezone(value.to_string()))
    }
}

impl fmt::Display for FallbackZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostLocal => f.write_str("local"),
            Self::Utc => f.write_str("utc"),
            Self::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}

/// Per-provider app deep-link preferences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectOpen {
    /// Rewrite Zoom web links to `zoommtg://`.
    pub zoom: bool,
    /// Rewrite Teams web links to `msteams:`.
    pub msteams: bool,
}

/// Configuration for parsing and link extraction.
#[derive(Debug, Clone)]
pub struct ConferenceConfig {
    providers: ProviderRules,
    direct_open: DirectOpen,
    calendar_names: Vec<String>,
    event_time_threshold: Duration,
    fallback_zone: FallbackZone,
}

impl Default for ConferenceConfig {
    fn default() -> Self {
        Self {
            providers: ProviderRules::default(),
            direct_open: DirectOpen::default(),
            calendar_names: Vec::new(),
            event_time_threshold: Duration::minutes(i64::from(DEFAULT_EVENT_TIME_THRESHOLD_MINS)),
            fallback_zone: FallbackZone::default(),
        }
    }
}

impl ConferenceConfig {
    /// Builds a configuration from key/value pairs over the defaults.
    ///
    /// Later pairs override earlier ones. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for the first invalid value.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in pairs {
            config.apply(key.as_ref(), value.as_ref())?;
        }
        Ok(config)
    }

    /// Applies one key/value pair.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            keys::CONFERENCE_DOMAINS => self.providers = ProviderRules::parse(value)?,
            keys::CALENDAR_NAMES => self.calendar_names = split_list(value),
            keys::USE_DIRECT_ZOOM => self.direct_open.zoom = parse_bool(key, value)?,
            keys::USE_DIRECT_MSTEAMS => self.direct_open.msteams = parse_bool(key, value)?,
            keys::EVENT_TIME_THRESHOLD_MINS => {
                let minutes: u32 =
                    value
                        .trim()
                        .parse()
                        .map_err(|_| ConfigError::InvalidInteger {
                            key: key.to_string(),
                            value: value.to_string(),
                        })?;
                self.event_time_threshold = Duration::minutes(i64::from(minutes));
            }
            keys::FALLBACK_TIMEZONE => self.fallback_zone = FallbackZone::parse(value)?,
            other => debug!(key = other, "ignoring unknown configuration key"),
        }
        Ok(())
    }

    /// Builder: set provider rules.
    pub fn with_providers(mut self, providers: ProviderRules) -> Self {
        self.providers = providers;
        self
    }

    /// Builder: set direct-open preferences.
    pub fn with_direct_open(mut self, direct_open: DirectOpen) -> Self {
        self.direct_open = direct_open;
        self
    }

    /// Builder: set the calendar allow-list.
    pub fn with_calendar_names(mut self, names: Vec<String>) -> Self {
        self.calendar_names = names;
        self
    }

    /// Builder: set the current-event threshold.
    pub fn with_event_time_threshold(mut self, threshold: Duration) -> Self {
        self.event_time_threshold = threshold;
        self
    }

    /// Builder: set the fallback zone.
    pub fn with_fallback_zone(mut self, zone: FallbackZone) -> Self {
        self.fallback_zone = zone;
        self
    }

    pub fn providers(&self) -> &ProviderRules {
        &self.providers
    }

    pub fn direct_open(&self) -> DirectOpen {
        self.direct_open
    }

    /// Calendars to enumerate; empty means all.
    pub fn calendar_names(&self) -> &[String] {
        &self.calendar_names
    }

    pub fn event_time_threshold(&self) -> Duration {
        self.event_time_threshold
    }

    pub fn fallback_zone(&self) -> FallbackZone {
        self.fallback_zone
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parses a launcher-style boolean. Empty means false.
pub fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "0" | "no" | "off" => Ok(false),
        "true" | "1" | "yes" | "on" => Ok(true),
        _ => Err(ConfigError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
