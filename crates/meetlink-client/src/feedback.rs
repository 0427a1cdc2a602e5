//! Launcher feedback output.
//!
//! The output is Alfred script-filter JSON: an `items` array with one entry
//! per current meeting, or a single non-actionable "No Results" entry.

use chrono::{DateTime, FixedOffset, Local, TimeZone, Utc};
use meetlink_core::{CanonicalEvent, FallbackZone};
use serde::Serialize;

/// Top-level feedback document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feedback {
    pub items: Vec<FeedbackItem>,
}

/// One result row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackItem {
    pub title: String,
    pub subtitle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<ItemText>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<ItemVariables>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<&'static str>,
}

/// Text for copy (⌘C) and large type (⌘L).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemText {
    pub copy: String,
    pub largetype: String,
}

/// Workflow variables passed to the next action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemVariables {
    pub event_summary: String,
    pub event_conference_url: String,
}

impl FeedbackItem {
    /// Builds the row for an event. Returns `None` when it has no link.
    pub fn from_event(event: &CanonicalEvent, display_zone: FallbackZone) -> Option<Self> {
        let url = event.conference_url()?;
        Some(Self {
            title: event.title().to_string(),
            subtitle: format_start(event.start(), display_zone),
            text: Some(ItemText {
                copy: url.to_string(),
                largetype: url.to_string(),
            }),
            variables: Some(ItemVariables {
                event_summary: event.title().to_string(),
                event_conference_url: url.to_string(),
            }),
            valid: None,
        })
    }

    /// The placeholder row shown when nothing qualifies.
    pub fn no_results() -> Self {
        Self {
            title: "No Results".to_string(),
            subtitle: "No calendar events could be found".to_string(),
            text: None,
            variables: None,
            valid: Some("no"),
        }
    }
}

impl Feedback {
    /// Builds feedback for events, falling back to the placeholder row.
    pub fn from_events(events: &[CanonicalEvent], display_zone: FallbackZone) -> Self {
        let mut items: Vec<_> = events
            .iter()
            .filter_map(|e| FeedbackItem::from_event(e, display_zone))
            .collect();
        if items.is_empty() {
            items.push(FeedbackItem::no_results());
        }
        Self { items }
    }

    /// Pretty JSON, as printed on stdout.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Formats a start time like `9:05am` in the display zone.
pub fn format_start(start: DateTime<FixedOffset>, zone: FallbackZone) -> String {
    match zone {
        FallbackZone::HostLocal => clock_time(&start.with_timezone(&Local)),
        FallbackZone::Utc => clock_time(&start.with_timezone(&Utc)),
        FallbackZone::Fixed(offset) => clock_time(&start.with_timezone(&offset)),
    }
}

fn clock_time<Z: TimeZone>(dt: &DateTime<Z>) -> String
where
    Z::Offset: std::fmt::Display,
{
    dt.format("%-I:%M%p").to_string().to_lowercase()
}
