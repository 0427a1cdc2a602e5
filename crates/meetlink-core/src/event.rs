//! The canonical event produced from one calendar record.

use chrono::{DateTime, Duration, FixedOffset, TimeZone};
use serde::Serialize;
use tracing::debug;

use crate::config::ConferenceConfig;
use crate::error::{RecordError, RecordResult};
use crate::links::LinkExtractor;
use crate::record::{FieldName, RawRecord, parse};
use crate::time::{DateTimeValue, TimeWindow, TimezoneResolver};

/// A normalized event: title, absolute start, and conference link.
///
/// A missing conference URL is a valid state, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalEvent {
    title: String,
    start: DateTime<FixedOffset>,
    all_day: bool,
    conference_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uid: Option<String>,
}

impl CanonicalEvent {
    /// Creates an event without a conference link.
    pub fn new(title: impl Into<String>, start: DateTime<FixedOffset>) -> Self {
        Self {
            title: title.into(),
            start,
            all_day: false,
            conference_url: None,
            uid: None,
        }
    }

    /// Builder: mark as an all-day event.
    pub fn with_all_day(mut self, all_day: bool) -> Self {
        self.all_day = all_day;
        self
    }

    /// Builder: set the conference URL.
    pub fn with_conference_url(mut self, url: impl Into<String>) -> Self {
        self.conference_url = Some(url.into());
        self
    }

    /// Builder: set the record UID.
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Start instant, in the offset it was resolved with.
    pub fn start(&self) -> DateTime<FixedOffset> {
        self.start
    }

    pub fn is_all_day(&self) -> bool {
        self.all_day
    }

    pub fn conference_url(&self) -> Option<&str> {
        self.conference_url.as_deref()
    }

    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    /// Returns true if the event has a conference link.
    pub fn has_conference(&self) -> bool {
        self.conference_url.is_some()
    }

    /// Returns true if `now` is within `threshold` of the start, either side,
    /// bounds included.
    pub fn is_current_at<Z: TimeZone>(&self, now: &DateTime<Z>, threshold: Duration) -> bool {
        TimeWindow::around(&self.start, threshold).contains(now)
    }
}

/// Normalizes a parsed record.
///
/// # Errors
///
/// - [`RecordError::MissingField`](crate::RecordError::MissingField) when
///   SUMMARY or DTSTART is absent (an empty SUMMARY is accepted).
/// - [`RecordError::MalformedRecord`](crate::RecordError::MalformedRecord)
///   when DTSTART is not a date or date-time.
/// - [`RecordError::MalformedTimezone`](crate::RecordError::MalformedTimezone)
///   when DTSTART names a VTIMEZONE block that cannot be interpreted.
pub fn normalize(record: &RawRecord, config: &ConferenceConfig) -> RecordResult<CanonicalEvent> {
    if let Some(&field) = record.missing_required().first() {
        return Err(RecordError::MissingField(field));
    }
    let title = record.require(FieldName::Summary)?.value.clone();
    let start_value = DateTimeValue::from_property(record.require(FieldName::DtStart)?)?;

    let resolver =
        TimezoneResolver::for_reference(record, &start_value.reference, config.fallback_zone())?;
    let start = resolver.resolve(&start_value.reference, start_value.naive);
    let conference_url = LinkExtractor::from_config(config).extract(record);

    debug!(
        title = %title,
        start = %start,
        conference = conference_url.is_some(),
        "normalized event"
    );

    Ok(CanonicalEvent {
        title,
        start,
        all_day: start_value.all_day,
        conference_url,
        uid: record.value(FieldName::Uid).map(String::from),
    })
}

/// Parses and normalizes the text of one record.
pub fn normalize_text(input: &str, config: &ConferenceConfig) -> RecordResult<CanonicalEvent> {
    normalize(&parse(input)?, config)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::config::{DirectOpen, FallbackZone};
    use crate::error::{RecordError, RecordErrorKind};

    fn config() -> ConferenceConfig {
        ConferenceConfig::default().with_fallback_zone(FallbackZone::Fixed(
            FixedOffset::west_opt(5 * 3600).unwrap(),
        ))
    }

    fn calendar(event_props: &str) -> String {
        format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Apple Inc.//macOS 14.0//EN\r\n\
             BEGIN:VEVENT\r\n{event_props}END:VEVENT\r\nEND:VCALENDAR\r\n"
        )
    }

    mod normalization {
        use super::*;

        #[test]
        fn full_event() {
            let event = normalize_text(
                &calendar(
                    "UID:ABC-123\r\nSUMMARY:Weekly sync\r\nDTSTART:20250205T100000\r\n\
                     DESCRIPTION:Join Zoom Meeting\\nhttps://zoom.us/j/1234567890?pwd=abc\r\n",
                ),
                &config(),
            )
            .unwrap();

            assert_eq!(event.title(), "Weekly sync");
            assert_eq!(event.uid(), Some("ABC-123"));
            assert!(!event.is_all_day());
            assert_eq!(
                event.conference_url(),
                Some("https://zoom.us/j/1234567890?pwd=abc")
            );
            assert_eq!(
                event.start().with_timezone(&Utc),
                Utc.with_ymd_and_hms(2025, 2, 5, 15, 0, 0).unwrap()
            );

            insta::assert_json_snapshot!(event, @r#"
            {
              "title": "Weekly sync",
              "start": "2025-02-05T10:00:00-05:00",
              "all_day": false,
              "conference_url": "https://zoom.us/j/1234567890?pwd=abc",
              "uid": "ABC-123"
            }
            "#);
        }

        #[test]
        fn no_link_is_not_an_error() {
            let event = normalize_text(
                &calendar(
                    "SUMMARY:Lunch\r\nDTSTART:20250205T120000Z\r\nLOCATION:Cafeteria\r\n\
                     DESCRIPTION:Menu at https://intranet.example.com/menu\r\n",
                ),
                &config(),
            )
            .unwrap();
            assert_eq!(event.conference_url(), None);
            assert!(!event.has_conference());

            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["conference_url"], serde_json::Value::Null);
            assert!(json.get("uid").is_none());
        }

        #[test]
        fn empty_summary_counts_as_present() {
            let event =
                normalize_text(&calendar("SUMMARY:\r\nDTSTART:20250205T120000Z\r\n"), &config())
                    .unwrap();
            assert_eq!(event.title(), "");
        }

        #[test]
        fn all_day_event_starts_at_midnight_in_fallback_zone() {
            let event = normalize_text(
                &calendar("SUMMARY:Offsite\r\nDTSTART;VALUE=DATE:20250210\r\n"),
                &config(),
            )
            .unwrap();
            assert!(event.is_all_day());
            assert_eq!(event.start().to_rfc3339(), "2025-02-10T00:00:00-05:00");
        }

        #[test]
        fn all_day_event_ignores_tzid() {
            let event = normalize_text(
                &calendar("SUMMARY:Offsite\r\nDTSTART;TZID=Asia/Tokyo;VALUE=DATE:20250210\r\n"),
                &config(),
            )
            .unwrap();
            assert_eq!(event.start().to_rfc3339(), "2025-02-10T00:00:00-05:00");
        }

        #[test]
        fn direct_open_applies() {
            let config = config().with_direct_open(DirectOpen {
                zoom: true,
                msteams: false,
            });
            let event = normalize_text(
                &calendar(
                    "SUMMARY:Sync\r\nDTSTART:20250205T100000Z\r\nURL:https://zoom.us/j/1234567890?pwd=abc\r\n",
                ),
                &config,
            )
            .unwrap();
            assert_eq!(
                event.conference_url(),
                Some("zoommtg://zoom.us/join?confno=1234567890&pwd=abc")
            );
        }

        #[test]
        fn alarm_description_does_not_leak() {
            let event = normalize_text(
                &calendar(
                    "SUMMARY:Sync\r\nDTSTART:20250205T100000Z\r\nDESCRIPTION:No link\r\n\
                     BEGIN:VALARM\r\nACTION:DISPLAY\r\nDESCRIPTION:https://meet.google.com/abc-defg-hij\r\n\
                     TRIGGER:-PT15M\r\nEND:VALARM\r\n",
                ),
                &config(),
            )
            .unwrap();
            assert_eq!(event.conference_url(), None);
        }
    }

    mod errors {
        use super::*;

        #[test]
        fn missing_summary() {
            let err = normalize_text(&calendar("DTSTART:20250205T100000Z\r\n"), &config()).unwrap_err();
            assert_eq!(err, RecordError::MissingField(FieldName::Summary));
        }

        #[test]
        fn missing_start() {
            let err = normalize_text(&calendar("SUMMARY:Sync\r\n"), &config()).unwrap_err();
            assert_eq!(err, RecordError::MissingField(FieldName::DtStart));
        }

        #[test]
        fn invalid_start() {
            let err = normalize_text(&calendar("SUMMARY:Sync\r\nDTSTART:soon\r\n"), &config())
                .unwrap_err();
            assert_eq!(err.kind(), RecordErrorKind::MalformedRecord);
        }

        #[test]
        fn malformed_referenced_timezone() {
            let input = "BEGIN:VCALENDAR\r\nBEGIN:VTIMEZONE\r\nTZID:Office\r\nEND:VTIMEZONE\r\n\
                 BEGIN:VEVENT\r\nSUMMARY:Sync\r\nDTSTART;TZID=Office:20250205T100000\r\nEND:VEVENT\r\n\
                 END:VCALENDAR\r\n";
            let err = normalize_text(input, &config()).unwrap_err();
            assert_eq!(err.kind(), RecordErrorKind::MalformedTimezone);
        }

        #[test]
        fn unusable_transition_rules_are_errors() {
            for byday in ["é1", "-2147483648SU"] {
                let input = format!(
                    "BEGIN:VCALENDAR\r\nBEGIN:VTIMEZONE\r\nTZID:Office\r\nBEGIN:DAYLIGHT\r\n\
                     TZOFFSETFROM:-0500\r\nTZOFFSETTO:-0400\r\nDTSTART:20070311T020000\r\n\
                     RRULE:FREQ=YEARLY;BYMONTH=3;BYDAY={byday}\r\nEND:DAYLIGHT\r\nEND:VTIMEZONE\r\n\
                     BEGIN:VEVENT\r\nSUMMARY:Sync\r\nDTSTART;TZID=Office:20250205T100000\r\nEND:VEVENT\r\n\
                     END:VCALENDAR\r\n"
                );
                let err = normalize_text(&input, &config()).unwrap_err();
                assert_eq!(err.kind(), RecordErrorKind::MalformedTimezone, "{byday}");
            }
        }

        #[test]
        fn unterminated_record() {
            let err = normalize_text("BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nSUMMARY:Sync\r\n", &config())
                .unwrap_err();
            assert_eq!(err.kind(), RecordErrorKind::MalformedRecord);
        }
    }

    mod current {
        use super::*;

        #[test]
        fn threshold_window() {
            let start = FixedOffset::east_opt(3600)
                .unwrap()
                .with_ymd_and_hms(2025, 2, 5, 10, 0, 0)
                .unwrap();
            let event = CanonicalEvent::new("Sync", start);
            let threshold = Duration::minutes(20);

            assert!(event.is_current_at(&(start - threshold), threshold));
            assert!(event.is_current_at(&(start + threshold), threshold));
            assert!(event.is_current_at(&Utc.with_ymd_and_hms(2025, 2, 5, 9, 10, 0).unwrap(), threshold));
            assert!(!event.is_current_at(&(start - Duration::minutes(21)), threshold));
            assert!(!event.is_current_at(&(start + Duration::minutes(21)), threshold));
        }
    }
}
