//! Core: calendar record parsing, timezones, conference links, normalization
//!
//! The pipeline for one event record is:
//!
//! ```text
//! raw .ics text ──parse──▶ RawRecord ──normalize──▶ CanonicalEvent
//!                              │                        ▲
//!                              ├── TimezoneResolver ────┤ start instant
//!                              └── LinkExtractor ───────┘ conference URL
//! ```
//!
//! Every call is a pure function of its inputs and the [`ConferenceConfig`]
//! passed in; nothing here reads the process environment.

pub mod config;
pub mod error;
pub mod event;
pub mod links;
pub mod record;
pub mod time;
pub mod tracing;

pub use config::{ConferenceConfig, ConfigError, DirectOpen, FallbackZone};
pub use error::{RecordError, RecordErrorKind, RecordResult};
pub use event::{CanonicalEvent, normalize, normalize_text};
pub use links::{LinkCandidate, LinkExtractor, LinkSource, ProviderRule, ProviderRules};
pub use record::{Cardinality, FieldName, Property, RawRecord, RawTimezone, parse};
pub use time::{
    DateTimeValue, TimeRef, TimeWindow, TimezoneDefinition, TimezoneResolver, UtcOffset,
};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
