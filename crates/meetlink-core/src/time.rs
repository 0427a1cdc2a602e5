//! Timezone resolution for event start times.
//!
//! A DTSTART value is one of three shapes: UTC (`...Z`), floating (no zone),
//! or zoned (`TZID=...`). [`TimezoneResolver`] turns any of them into an
//! absolute instant with a fixed offset. Zoned values are looked up in this
//! order:
//!
//! 1. a VTIMEZONE block from the same record ([`TimezoneDefinition`]),
//! 2. an IANA zone known to `chrono-tz`,
//! 3. the configured [`FallbackZone`] (host local zone by default).
//!
//! Floating values always use the fallback zone.

use std::collections::HashMap;
use std::fmt;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, Offset,
    TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::config::FallbackZone;
use crate::error::{RecordError, RecordResult};
use crate::record::{
    FieldName, ObservanceKind, Property, RawObservance, RawRecord, RawTimezone,
};

/// How a date-time value refers to its zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeRef {
    /// Trailing `Z`: the value is already UTC.
    Utc,
    /// No zone information; interpreted in the fallback zone.
    Floating,
    /// A `TZID` parameter.
    Zone(String),
}

/// A parsed DTSTART-style value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateTimeValue {
    /// The wall-clock value as written.
    pub naive: NaiveDateTime,
    /// Which zone the wall-clock value is in.
    pub reference: TimeRef,
    /// True for `VALUE=DATE` (all-day) values, which start at midnight.
    pub all_day: bool,
}

impl DateTimeValue {
    /// Parses a date or date-time property.
    ///
    /// Accepts `YYYYMMDDTHHMMSSZ`, `YYYYMMDDTHHMMSS` (with an optional TZID
    /// parameter) and `YYYYMMDD`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MalformedRecord`] for any other shape.
    pub fn from_property(property: &Property) -> RecordResult<Self> {
        let raw = property.value.trim();
        let malformed =
            || RecordError::malformed(property.line, format!("invalid date-time value {raw:?}"));

        let is_date = raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit());
        if is_date || property.param("VALUE").is_some_and(|v| v.eq_ignore_ascii_case("DATE")) {
            let date = NaiveDate::parse_from_str(raw, "%Y%m%d").map_err(|_| malformed())?;
            // a date has no time of day, so any TZID on it is ignored
            return Ok(Self {
                naive: date.and_time(chrono::NaiveTime::MIN),
                reference: TimeRef::Floating,
                all_day: true,
            });
        }

        let (digits, reference) = match raw.strip_suffix(['Z', 'z']) {
            Some(digits) => (digits, TimeRef::Utc),
            None => match property.param("TZID") {
                Some(tzid) => (raw, TimeRef::Zone(tzid.to_string())),
                None => (raw, TimeRef::Floating),
            },
        };
        let naive = parse_naive(digits).ok_or_else(malformed)?;

        Ok(Self {
            naive,
            reference,
            all_day: false,
        })
    }
}

/// Parses `YYYYMMDDTHHMMSS`.
fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S").ok()
}

/// Parses `YYYYMMDD[THHMMSS[Z]]`, as used by RRULE `UNTIL`.
fn parse_until(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim_end_matches(['Z', 'z']);
    if s.len() == 8 {
        return NaiveDate::parse_from_str(s, "%Y%m%d")
            .ok()
            .and_then(|d| d.and_hms_opt(23, 59, 59));
    }
    parse_naive(s)
}

/// A UTC offset as written in TZOFFSETFROM / TZOFFSETTO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtcOffset {
    seconds: i32,
}

impl UtcOffset {
    /// Creates an offset from total seconds east of UTC.
    pub const fn from_seconds(seconds: i32) -> Self {
        Self { seconds }
    }

    /// Total seconds east of UTC.
    pub const fn seconds(self) -> i32 {
        self.seconds
    }

    /// Parses `(+|-)HHMM[SS]`. Returns `None` for anything else, including
    /// offsets of 24 hours or more.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (sign, rest) = match s.as_bytes().first()? {
            b'+' => (1, &s[1..]),
            b'-' => (-1, &s[1..]),
            _ => return None,
        };
        if !(rest.len() == 4 || rest.len() == 6) || !rest.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let hours: i32 = rest[0..2].parse().ok()?;
        let minutes: i32 = rest[2..4].parse().ok()?;
        let seconds: i32 = if rest.len() == 6 { rest[4..6].parse().ok()? } else { 0 };
        if hours > 23 || minutes > 59 || seconds > 59 {
            return None;
        }
        Some(Self::from_seconds(sign * (hours * 3600 + minutes * 60 + seconds)))
    }

    /// Converts to a chrono offset.
    pub fn fixed(self) -> FixedOffset {
        FixedOffset::east_opt(self.seconds).unwrap_or(Utc.fix())
    }
}

impl fmt::Display for UtcOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.seconds >= 0 { '+' } else { '-' };
        let total = self.seconds.abs();
        write!(f, "{sign}{:02}{:02}", total / 3600, (total % 3600) / 60)?;
        if total % 60 != 0 {
            write!(f, "{:02}", total % 60)?;
        }
        Ok(())
    }
}

/// Which day of the month a yearly transition falls on.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DaySelector {
    /// `BYDAY=2SU` (second Sunday), `BYDAY=-1SU` (last Sunday).
    NthWeekday { ordinal: i32, weekday: Weekday },
    /// `BYDAY=SU;BYMONTHDAY=8,9,...,14`: first listed day on that weekday.
    WeekdayInDays { weekday: Weekday, days: Vec<u32> },
    /// `BYMONTHDAY=n`, or no BY-day part at all.
    MonthDay(u32),
}

/// A yearly transition rule (the subset of RRULE timezones use).
#[derive(Debug, Clone, PartialEq, Eq)]
struct TransitionRule {
    month: u32,
    day: DaySelector,
    until: Option<NaiveDateTime>,
}

impl TransitionRule {
    /// Parses an observance RRULE. `dtstart` supplies the day when the
    /// rule names none.
    fn parse(rule: &str, dtstart: NaiveDateTime) -> Result<Self, String> {
        let parts: HashMap<String, &str> = rule
            .split(';')
            .filter_map(|part| part.split_once('='))
            .map(|(k, v)| (k.trim().to_ascii_uppercase(), v.trim()))
            .collect();

        match parts.get("FREQ") {
            Some(freq) if freq.eq_ignore_ascii_case("YEARLY") => {}
            Some(freq) => return Err(format!("unsupported RRULE frequency {freq}")),
            None => return Err("RRULE without FREQ".to_string()),
        }

        let month = match parts.get("BYMONTH") {
            Some(m) => m
                .parse::<u32>()
                .ok()
                .filter(|m| (1..=12).contains(m))
                .ok_or_else(|| format!("invalid BYMONTH {m}"))?,
            None => dtstart.month(),
        };

        let days = match parts.get("BYMONTHDAY") {
            Some(list) => {
                let mut days = list
                    .split(',')
                    .map(|d| d.trim().parse::<u32>().ok().filter(|d| (1..=31).contains(d)))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| format!("invalid BYMONTHDAY {list}"))?;
                days.sort_unstable();
                Some(days)
            }
            None => None,
        };

        let day = match (parts.get("BYDAY"), days) {
            (Some(byday), days) => {
                let (ordinal, weekday) =
                    parse_byday(byday).ok_or_else(|| format!("invalid BYDAY {byday}"))?;
                match (ordinal, days) {
                    (0, Some(days)) => DaySelector::WeekdayInDays { weekday, days },
                    (0, None) => return Err(format!("BYDAY {byday} needs an ordinal")),
                    (ordinal @ (-5..=-1 | 1..=5), _) => {
                        DaySelector::NthWeekday { ordinal, weekday }
                    }
                    (_, _) => return Err(format!("BYDAY ordinal out of range in {byday}")),
                }
            }
            (None, Some(days)) => DaySelector::MonthDay(days[0]),
            (None, None) => DaySelector::MonthDay(dtstart.day()),
        };

        let until = match parts.get("UNTIL") {
            Some(u) => Some(parse_until(u).ok_or_else(|| format!("invalid UNTIL {u}"))?),
            None => None,
        };

        Ok(Self { month, day, until })
    }

    /// The transition date in a given year, if that year has one.
    fn date_in(&self, year: i32) -> Option<NaiveDate> {
        match &self.day {
            DaySelector::NthWeekday { ordinal, weekday } => {
                nth_weekday_of_month(year, self.month, *weekday, *ordinal)
            }
            DaySelector::WeekdayInDays { weekday, days } => days
                .iter()
                .filter_map(|d| NaiveDate::from_ymd_opt(year, self.month, *d))
                .find(|d| d.weekday() == *weekday),
            DaySelector::MonthDay(day) => NaiveDate::from_ymd_opt(year, self.month, *day),
        }
    }
}

/// Parses `BYDAY` values like `1SU`, `-1SU`, `SU`.
fn parse_byday(s: &str) -> Option<(i32, Weekday)> {
    let s = s.trim();
    if s.contains(',') {
        return None;
    }
    let (split, _) = s.char_indices().rev().nth(1)?;
    let (num, day) = s.split_at(split);
    let ordinal = if num.is_empty() { 0 } else { num.parse().ok()? };

    let weekday = match day.to_ascii_uppercase().as_str() {
        "MO" => Weekday::Mon,
        "TU" => Weekday::Tue,
        "WE" => Weekday::Wed,
        "TH" => Weekday::Thu,
        "FR" => Weekday::Fri,
        "SA" => Weekday::Sat,
        "SU" => Weekday::Sun,
        _ => return None,
    };
    Some((ordinal, weekday))
}

/// The nth weekday of a month; negative ordinals count from the end.
fn nth_weekday_of_month(year: i32, month: u32, weekday: Weekday, ordinal: i32) -> Option<NaiveDate> {
    if ordinal > 0 {
        return NaiveDate::from_weekday_of_month_opt(
            year,
            month,
            weekday,
            u8::try_from(ordinal).ok()?,
        );
    }
    if ordinal == 0 {
        return None;
    }

    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last = next_month.pred_opt()?;
    let back = (7 + last.weekday().num_days_from_monday() - weekday.num_days_from_monday()) % 7;
    let weeks_back = u32::try_from(ordinal.checked_neg()?.checked_sub(1)?).ok()?;
    let day = last.day().checked_sub(back + 7 * weeks_back)?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// One STANDARD or DAYLIGHT observance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observance {
    pub kind: ObservanceKind,
    pub offset_from: UtcOffset,
    pub offset_to: UtcOffset,
    /// First onset, in local wall-clock time.
    pub dtstart: NaiveDateTime,
    rule: Option<TransitionRule>,
    rdates: Vec<NaiveDateTime>,
}

impl Observance {
    fn from_raw(raw: &RawObservance, tzid: &str) -> RecordResult<Self> {
        let kind = raw.kind.as_str();
        let field = |name: FieldName| {
            raw.fields.value(name).ok_or_else(|| {
                RecordError::malformed_timezone(tzid, format!("{kind} without {name}"))
            })
        };
        let offset = |name: FieldName| -> RecordResult<UtcOffset> {
            let value = field(name)?;
            UtcOffset::parse(value).ok_or_else(|| {
                RecordError::malformed_timezone(tzid, format!("invalid {name} {value:?}"))
            })
        };

        let offset_from = offset(FieldName::TzOffsetFrom)?;
        let offset_to = offset(FieldName::TzOffsetTo)?;
        let dtstart_raw = field(FieldName::DtStart)?;
        let dtstart = parse_naive(dtstart_raw.trim()).ok_or_else(|| {
            RecordError::malformed_timezone(tzid, format!("invalid DTSTART {dtstart_raw:?}"))
        })?;

        let rule = raw
            .fields
            .value(FieldName::RRule)
            .map(|rule| TransitionRule::parse(rule, dtstart))
            .transpose()
            .map_err(|reason| RecordError::malformed_timezone(tzid, reason))?;

        let rdates = raw
            .fields
            .get_all(FieldName::RDate)
            .iter()
            .flat_map(|p| p.value.split(','))
            .map(|v| {
                parse_naive(v.trim()).ok_or_else(|| {
                    RecordError::malformed_timezone(tzid, format!("invalid RDATE {v:?}"))
                })
            })
            .collect::<RecordResult<Vec<_>>>()?;

        Ok(Self {
            kind: raw.kind,
            offset_from,
            offset_to,
            dtstart,
            rule,
            rdates,
        })
    }

    /// How far the clocks jump forward at this observance's onsets. Zero
    /// when they fall back or stay put.
    fn gap(&self) -> Duration {
        let delta = self.offset_to.seconds() - self.offset_from.seconds();
        Duration::seconds(i64::from(delta.max(0)))
    }

    /// The latest onset of this observance at or before `local`.
    fn latest_onset(&self, local: NaiveDateTime) -> Option<NaiveDateTime> {
        if local < self.dtstart {
            return None;
        }
        let mut best = self.dtstart;

        for rdate in &self.rdates {
            if *rdate <= local && *rdate > best {
                best = *rdate;
            }
        }

        if let Some(rule) = &self.rule {
            let last_year = rule
                .until
                .map_or(local.year(), |until| until.year().min(local.year()));
            let onset = (self.dtstart.year()..=last_year)
                .rev()
                .filter_map(|year| rule.date_in(year))
                .map(|date| date.and_time(self.dtstart.time()))
                .find(|onset| {
                    *onset <= local
                        && *onset >= self.dtstart
                        && rule.until.is_none_or(|until| *onset <= until)
                });
            if let Some(onset) = onset.filter(|o| *o > best) {
                best = onset;
            }
        }

        Some(best)
    }
}

/// A VTIMEZONE definition ready for offset lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimezoneDefinition {
    tzid: String,
    observances: Vec<Observance>,
}

impl TimezoneDefinition {
    /// Builds a definition from a parsed VTIMEZONE block.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MalformedTimezone`] when the block has no TZID,
    /// no observances, or an observance with a missing or invalid
    /// TZOFFSETFROM, TZOFFSETTO, DTSTART, RRULE or RDATE.
    pub fn from_raw(raw: &RawTimezone) -> RecordResult<Self> {
        let tzid = raw
            .tzid()
            .ok_or_else(|| RecordError::malformed_timezone("", "VTIMEZONE without TZID"))?
            .to_string();
        if raw.observances.is_empty() {
            return Err(RecordError::malformed_timezone(
                tzid,
                "VTIMEZONE needs at least one STANDARD or DAYLIGHT block",
            ));
        }
        let observances = raw
            .observances
            .iter()
            .map(|obs| Observance::from_raw(obs, &tzid))
            .collect::<RecordResult<Vec<_>>>()?;

        Ok(Self { tzid, observances })
    }

    /// The TZID this definition answers to.
    pub fn tzid(&self) -> &str {
        &self.tzid
    }

    /// The observances, in source order.
    pub fn observances(&self) -> &[Observance] {
        &self.observances
    }

    /// The offset in effect at a local wall-clock time.
    ///
    /// Before the first onset of any observance, the standard offset applies.
    /// A time skipped by a forward jump keeps the offset from before the
    /// jump; a repeated time takes the earlier of its two instants.
    pub fn offset_at(&self, local: NaiveDateTime) -> UtcOffset {
        self.observances
            .iter()
            .filter_map(|obs| {
                // an onset only takes effect once the skipped hour is over
                let shifted = local.checked_sub_signed(obs.gap()).unwrap_or(local);
                obs.latest_onset(shifted).map(|onset| (onset, obs))
            })
            .max_by_key(|(onset, _)| *onset)
            .map_or_else(|| self.base_offset(), |(_, obs)| obs.offset_to)
    }

    /// The standard offset, or the earliest observance's starting offset
    /// when there is no STANDARD block.
    fn base_offset(&self) -> UtcOffset {
        self.observances
            .iter()
            .find(|o| o.kind == ObservanceKind::Standard)
            .map(|o| o.offset_to)
            .or_else(|| {
                self.observances
                    .iter()
                    .min_by_key(|o| o.dtstart)
                    .map(|o| o.offset_from)
            })
            .unwrap_or(UtcOffset::from_seconds(0))
    }

    /// Converts a local wall-clock time to an absolute instant.
    pub fn localize(&self, local: NaiveDateTime) -> DateTime<FixedOffset> {
        localize(&self.offset_at(local).fixed(), local)
    }
}

/// Resolves date-time values to absolute instants.
///
/// Holds no state beyond the definitions registered on it; resolution itself
/// cannot fail.
#[derive(Debug, Clone)]
pub struct TimezoneResolver {
    definitions: HashMap<String, TimezoneDefinition>,
    fallback: FallbackZone,
}

impl TimezoneResolver {
    /// Creates a resolver with no VTIMEZONE definitions.
    pub fn new(fallback: FallbackZone) -> Self {
        Self {
            definitions: HashMap::new(),
            fallback,
        }
    }

    /// Creates a resolver for one reference, registering the VTIMEZONE block
    /// of the record it names (if there is one).
    ///
    /// Blocks the reference does not name are not inspected.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MalformedTimezone`] if the named block is
    /// malformed.
    pub fn for_reference(
        record: &RawRecord,
        reference: &TimeRef,
        fallback: FallbackZone,
    ) -> RecordResult<Self> {
        let mut resolver = Self::new(fallback);
        if let TimeRef::Zone(tzid) = reference {
            let raw = record
                .timezones()
                .iter()
                .find(|tz| tz.tzid() == Some(tzid.as_str()));
            if let Some(raw) = raw {
                resolver.register(TimezoneDefinition::from_raw(raw)?);
            }
        }
        Ok(resolver)
    }

    /// Creates a resolver with every VTIMEZONE block of a record.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MalformedTimezone`] if any block is malformed.
    pub fn from_record(record: &RawRecord, fallback: FallbackZone) -> RecordResult<Self> {
        let mut resolver = Self::new(fallback);
        for raw in record.timezones() {
            resolver.register(TimezoneDefinition::from_raw(raw)?);
        }
        Ok(resolver)
    }

    /// Registers a definition, replacing any with the same TZID.
    pub fn register(&mut self, definition: TimezoneDefinition) {
        self.definitions
            .insert(definition.tzid().to_string(), definition);
    }

    /// Resolves a wall-clock value to an absolute instant.
    ///
    /// Unknown zone identifiers fall back to the configured
    /// [`FallbackZone`]; this is logged but is not an error.
    pub fn resolve(&self, reference: &TimeRef, naive: NaiveDateTime) -> DateTime<FixedOffset> {
        match reference {
            TimeRef::Utc => naive.and_utc().fixed_offset(),
            TimeRef::Floating => self.localize_fallback(naive),
            TimeRef::Zone(tzid) => {
                if let Some(definition) = self.definitions.get(tzid) {
                    return definition.localize(naive);
                }
                if let Some(tz) = iana_zone(tzid) {
                    debug!(tzid = %tzid, zone = %tz.name(), "resolved TZID as IANA zone");
                    return localize(&tz, naive);
                }
                warn!(tzid = %tzid, fallback = ?self.fallback, "unknown timezone, using fallback zone");
                self.localize_fallback(naive)
            }
        }
    }

    fn localize_fallback(&self, naive: NaiveDateTime) -> DateTime<FixedOffset> {
        match self.fallback {
            FallbackZone::HostLocal => localize(&chrono::Local, naive),
            FallbackZone::Utc => naive.and_utc().fixed_offset(),
            FallbackZone::Fixed(offset) => localize(&offset, naive),
        }
    }
}

/// Looks up an IANA zone, stripping vendor prefixes some clients add.
fn iana_zone(tzid: &str) -> Option<Tz> {
    let stripped = tzid
        .strip_prefix("/mozilla.org/20050126_1/")
        .or_else(|| tzid.strip_prefix("/mozilla.org/"))
        .or_else(|| tzid.strip_prefix("/softwarestudio.org/Olson_20011030_5/"))
        .or_else(|| tzid.strip_prefix("/softwarestudio.org/"))
        .unwrap_or(tzid)
        .trim_matches('"');
    stripped.parse::<Tz>().ok()
}

/// Attaches a zone to a wall-clock time.
///
/// Ambiguous times (DST fold) take the earlier instant. Times in a DST gap
/// keep the offset in effect just before the gap.
fn localize<Z: TimeZone>(zone: &Z, naive: NaiveDateTime) -> DateTime<FixedOffset> {
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.fixed_offset(),
        LocalResult::Ambiguous(earliest, _) => earliest.fixed_offset(),
        LocalResult::None => {
            let before = zone
                .offset_from_local_datetime(&(naive - Duration::hours(3)))
                .earliest()
                .map_or(Utc.fix(), |o| o.fix());
            let utc = naive - Duration::seconds(i64::from(before.local_minus_utc()));
            DateTime::from_naive_utc_and_offset(utc, before)
        }
    }
}

/// An inclusive time window around an instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (inclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a new time window.
    ///
    /// # Panics
    ///
    /// Panics if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        assert!(start <= end, "TimeWindow start must be <= end");
        Self { start, end }
    }

    /// The window `[instant - threshold, instant + threshold]`.
    ///
    /// A negative threshold is treated as zero.
    pub fn around<Z: TimeZone>(instant: &DateTime<Z>, threshold: Duration) -> Self {
        let center = instant.with_timezone(&Utc);
        let threshold = threshold.max(Duration::zero());
        Self::new(center - threshold, center + threshold)
    }

    /// Returns the duration of this time window.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Checks if an instant falls within this window, bounds included.
    pub fn contains<Z: TimeZone>(&self, instant: &DateTime<Z>) -> bool {
        let instant = instant.with_timezone(&Utc);
        self.start <= instant && instant <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecordErrorKind;
    use crate::record::parse;

    fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn fixed(hours: i32) -> FixedOffset {
        FixedOffset::east_opt(hours * 3600).unwrap()
    }

    const NEW_YORK: &str = "BEGIN:VTIMEZONE\r\n\
        TZID:America/New_York\r\n\
        BEGIN:DAYLIGHT\r\n\
        TZOFFSETFROM:-0500\r\n\
        TZOFFSETTO:-0400\r\n\
        TZNAME:EDT\r\n\
        DTSTART:20070311T020000\r\n\
        RRULE:FREQ=YEARLY;BYMONTH=3;BYDAY=2SU\r\n\
        END:DAYLIGHT\r\n\
        BEGIN:STANDARD\r\n\
        TZOFFSETFROM:-0400\r\n\
        TZOFFSETTO:-0500\r\n\
        TZNAME:EST\r\n\
        DTSTART:20071104T020000\r\n\
        RRULE:FREQ=YEARLY;BYMONTH=11;BYDAY=1SU\r\n\
        END:STANDARD\r\n\
        END:VTIMEZONE\r\n";

    fn record_with(timezone: &str, dtstart: &str) -> RawRecord {
        parse(&format!(
            "BEGIN:VCALENDAR\r\n{timezone}BEGIN:VEVENT\r\nSUMMARY:x\r\n{dtstart}\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n"
        ))
        .unwrap()
    }

    fn definition(timezone: &str) -> RecordResult<TimezoneDefinition> {
        let record = record_with(timezone, "DTSTART:20250101T000000Z");
        TimezoneDefinition::from_raw(&record.timezones()[0])
    }

    mod offsets {
        use super::*;

        #[test]
        fn parses_offsets() {
            assert_eq!(UtcOffset::parse("+0100").unwrap().seconds(), 3600);
            assert_eq!(UtcOffset::parse("-0800").unwrap().seconds(), -8 * 3600);
            assert_eq!(UtcOffset::parse("+0530").unwrap().seconds(), 5 * 3600 + 1800);
            assert_eq!(UtcOffset::parse("-003015").unwrap().seconds(), -(30 * 60 + 15));
        }

        #[test]
        fn rejects_invalid_offsets() {
            for bad in ["0100", "+1", "+01:00", "+2500", "+0160", "", "+01000"] {
                assert!(UtcOffset::parse(bad).is_none(), "{bad}");
            }
        }

        #[test]
        fn display() {
            assert_eq!(UtcOffset::from_seconds(-5 * 3600).to_string(), "-0500");
            assert_eq!(UtcOffset::from_seconds(3600 + 15).to_string(), "+010015");
        }
    }

    mod rules {
        use super::*;

        #[test]
        fn nth_weekday() {
            assert_eq!(
                nth_weekday_of_month(2025, 3, Weekday::Sun, 2),
                NaiveDate::from_ymd_opt(2025, 3, 9)
            );
            assert_eq!(
                nth_weekday_of_month(2025, 10, Weekday::Sun, -1),
                NaiveDate::from_ymd_opt(2025, 10, 26)
            );
            assert_eq!(
                nth_weekday_of_month(2025, 12, Weekday::Wed, -1),
                NaiveDate::from_ymd_opt(2025, 12, 31)
            );
            assert_eq!(nth_weekday_of_month(2025, 2, Weekday::Sat, 5), None);
        }

        #[test]
        fn byday_forms() {
            assert_eq!(parse_byday("2SU"), Some((2, Weekday::Sun)));
            assert_eq!(parse_byday("-1SU"), Some((-1, Weekday::Sun)));
            assert_eq!(parse_byday("MO"), Some((0, Weekday::Mon)));
            assert_eq!(parse_byday("XX"), None);
            assert_eq!(parse_byday("é1"), None);
            assert_eq!(parse_byday("S"), None);
        }

        #[test]
        fn monthday_window_matches_nth_weekday() {
            let start = naive(1987, 4, 5, 2, 0);
            let legacy =
                TransitionRule::parse("FREQ=YEARLY;BYMONTH=3;BYDAY=SU;BYMONTHDAY=8,9,10,11,12,13,14", start)
                    .unwrap();
            let modern = TransitionRule::parse("FREQ=YEARLY;BYMONTH=3;BYDAY=2SU", start).unwrap();
            for year in 2020..2030 {
                assert_eq!(legacy.date_in(year), modern.date_in(year), "{year}");
            }
        }

        #[test]
        fn rejects_unsupported_rules() {
            let start = naive(2007, 3, 11, 2, 0);
            assert!(TransitionRule::parse("FREQ=MONTHLY;BYDAY=2SU", start).is_err());
            assert!(TransitionRule::parse("BYMONTH=3;BYDAY=2SU", start).is_err());
            assert!(TransitionRule::parse("FREQ=YEARLY;BYMONTH=13;BYDAY=2SU", start).is_err());
            assert!(TransitionRule::parse("FREQ=YEARLY;BYMONTH=3;BYDAY=SU", start).is_err());
            assert!(TransitionRule::parse("FREQ=YEARLY;BYMONTH=3;BYDAY=2SU;UNTIL=x", start).is_err());
        }
    }

    mod definitions {
        use super::*;

        #[test]
        fn daylight_transition_shifts_offset() {
            let tz = definition(NEW_YORK).unwrap();
            assert_eq!(tz.tzid(), "America/New_York");
            assert_eq!(tz.offset_at(naive(2025, 3, 8, 10, 0)).seconds(), -5 * 3600);
            assert_eq!(tz.offset_at(naive(2025, 3, 10, 10, 0)).seconds(), -4 * 3600);
            assert_eq!(tz.offset_at(naive(2025, 11, 3, 10, 0)).seconds(), -5 * 3600);
            assert_eq!(tz.offset_at(naive(2025, 7, 4, 12, 0)).seconds(), -4 * 3600);
        }

        #[test]
        fn before_all_rules_uses_standard_offset() {
            let tz = definition(NEW_YORK).unwrap();
            assert_eq!(tz.offset_at(naive(1990, 7, 1, 12, 0)).seconds(), -5 * 3600);
        }

        #[test]
        fn after_daylight_rule_ends_uses_standard_offset() {
            let tz = definition(
                "BEGIN:VTIMEZONE\r\nTZID:Old\r\n\
                 BEGIN:DAYLIGHT\r\nTZOFFSETFROM:+0300\r\nTZOFFSETTO:+0400\r\nDTSTART:20000326T020000\r\n\
                 RRULE:FREQ=YEARLY;BYMONTH=3;BYDAY=-1SU;UNTIL=20100328T000000Z\r\nEND:DAYLIGHT\r\n\
                 BEGIN:STANDARD\r\nTZOFFSETFROM:+0400\r\nTZOFFSETTO:+0300\r\nDTSTART:20001029T030000\r\n\
                 RRULE:FREQ=YEARLY;BYMONTH=10;BYDAY=-1SU\r\nEND:STANDARD\r\nEND:VTIMEZONE\r\n",
            )
            .unwrap();
            assert_eq!(tz.offset_at(naive(2009, 7, 1, 12, 0)).seconds(), 4 * 3600);
            assert_eq!(tz.offset_at(naive(2020, 7, 1, 12, 0)).seconds(), 3 * 3600);
        }

        #[test]
        fn fixed_zone_without_rules() {
            let tz = definition(
                "BEGIN:VTIMEZONE\r\nTZID:Asia/Kolkata\r\nBEGIN:STANDARD\r\nTZOFFSETFROM:+0530\r\nTZOFFSETTO:+0530\r\nDTSTART:19700101T000000\r\nEND:STANDARD\r\nEND:VTIMEZONE\r\n",
            )
            .unwrap();
            let dt = tz.localize(naive(2025, 2, 5, 10, 0));
            assert_eq!(dt.with_timezone(&Utc), utc(2025, 2, 5, 4, 30));
        }

        #[test]
        fn rdates_are_onsets() {
            let tz = definition(
                "BEGIN:VTIMEZONE\r\nTZID:R\r\n\
                 BEGIN:STANDARD\r\nTZOFFSETFROM:+0200\r\nTZOFFSETTO:+0100\r\nDTSTART:20000101T000000\r\nEND:STANDARD\r\n\
                 BEGIN:DAYLIGHT\r\nTZOFFSETFROM:+0100\r\nTZOFFSETTO:+0200\r\nDTSTART:20200601T000000\r\nEND:DAYLIGHT\r\n\
                 BEGIN:STANDARD\r\nTZOFFSETFROM:+0200\r\nTZOFFSETTO:+0100\r\nDTSTART:20200901T000000\r\nRDATE:20210901T000000,20220901T000000\r\nEND:STANDARD\r\n\
                 END:VTIMEZONE\r\n",
            )
            .unwrap();
            assert_eq!(tz.offset_at(naive(2020, 7, 1, 0, 0)).seconds(), 7200);
            assert_eq!(tz.offset_at(naive(2020, 10, 1, 0, 0)).seconds(), 3600);
        }

        #[test]
        fn agrees_with_iana_around_transitions() {
            let embedded = definition(NEW_YORK).unwrap();
            let iana: Tz = "America/New_York".parse().unwrap();
            for local in [
                naive(2025, 3, 9, 1, 59),
                naive(2025, 3, 9, 2, 0),
                naive(2025, 3, 9, 2, 30),
                naive(2025, 3, 9, 3, 0),
                naive(2025, 11, 2, 0, 59),
                naive(2025, 11, 2, 1, 30),
                naive(2025, 11, 2, 2, 0),
                naive(2025, 11, 2, 2, 30),
            ] {
                assert_eq!(embedded.localize(local), localize(&iana, local), "{local}");
            }
        }

        #[test]
        fn gap_uses_offset_before_jump() {
            let tz = definition(NEW_YORK).unwrap();
            let dt = tz.localize(naive(2025, 3, 9, 2, 30));
            assert_eq!(dt.offset().local_minus_utc(), -5 * 3600);
            assert_eq!(dt.with_timezone(&Utc), utc(2025, 3, 9, 7, 30));
        }

        #[test]
        fn fold_takes_earlier_instant() {
            let tz = definition(NEW_YORK).unwrap();
            let dt = tz.localize(naive(2025, 11, 2, 1, 30));
            assert_eq!(dt.with_timezone(&Utc), utc(2025, 11, 2, 5, 30));
        }

        #[test]
        fn malformed_definitions() {
            let cases = [
                "BEGIN:VTIMEZONE\r\nBEGIN:STANDARD\r\nTZOFFSETFROM:+0100\r\nTZOFFSETTO:+0100\r\nDTSTART:19700101T000000\r\nEND:STANDARD\r\nEND:VTIMEZONE\r\n",
                "BEGIN:VTIMEZONE\r\nTZID:Empty\r\nEND:VTIMEZONE\r\n",
                "BEGIN:VTIMEZONE\r\nTZID:NoTo\r\nBEGIN:STANDARD\r\nTZOFFSETFROM:+0100\r\nDTSTART:19700101T000000\r\nEND:STANDARD\r\nEND:VTIMEZONE\r\n",
                "BEGIN:VTIMEZONE\r\nTZID:BadOffset\r\nBEGIN:STANDARD\r\nTZOFFSETFROM:+0100\r\nTZOFFSETTO:one\r\nDTSTART:19700101T000000\r\nEND:STANDARD\r\nEND:VTIMEZONE\r\n",
                "BEGIN:VTIMEZONE\r\nTZID:BadStart\r\nBEGIN:STANDARD\r\nTZOFFSETFROM:+0100\r\nTZOFFSETTO:+0100\r\nDTSTART:yesterday\r\nEND:STANDARD\r\nEND:VTIMEZONE\r\n",
                "BEGIN:VTIMEZONE\r\nTZID:BadRule\r\nBEGIN:DAYLIGHT\r\nTZOFFSETFROM:+0100\r\nTZOFFSETTO:+0200\r\nDTSTART:19700101T000000\r\nRRULE:FREQ=WEEKLY\r\nEND:DAYLIGHT\r\nEND:VTIMEZONE\r\n",
                "BEGIN:VTIMEZONE\r\nTZID:BadDay\r\nBEGIN:DAYLIGHT\r\nTZOFFSETFROM:+0100\r\nTZOFFSETTO:+0200\r\nDTSTART:19700101T000000\r\nRRULE:FREQ=YEARLY;BYMONTH=3;BYDAY=é1\r\nEND:DAYLIGHT\r\nEND:VTIMEZONE\r\n",
                "BEGIN:VTIMEZONE\r\nTZID:HugeOrdinal\r\nBEGIN:DAYLIGHT\r\nTZOFFSETFROM:+0100\r\nTZOFFSETTO:+0200\r\nDTSTART:19700101T000000\r\nRRULE:FREQ=YEARLY;BYMONTH=3;BYDAY=-2147483648SU\r\nEND:DAYLIGHT\r\nEND:VTIMEZONE\r\n",
                "BEGIN:VTIMEZONE\r\nTZID:SixthSunday\r\nBEGIN:DAYLIGHT\r\nTZOFFSETFROM:+0100\r\nTZOFFSETTO:+0200\r\nDTSTART:19700101T000000\r\nRRULE:FREQ=YEARLY;BYMONTH=3;BYDAY=6SU\r\nEND:DAYLIGHT\r\nEND:VTIMEZONE\r\n",
            ];
            for case in cases {
                let err = definition(case).unwrap_err();
                assert_eq!(err.kind(), RecordErrorKind::MalformedTimezone, "{case}");
            }
        }
    }

    mod resolver {
        use super::*;

        fn resolver() -> TimezoneResolver {
            TimezoneResolver::new(FallbackZone::Fixed(fixed(2)))
        }

        #[test]
        fn utc_values() {
            let dt = resolver().resolve(&TimeRef::Utc, naive(2025, 2, 5, 10, 0));
            assert_eq!(dt.offset().local_minus_utc(), 0);
            assert_eq!(dt.with_timezone(&Utc), utc(2025, 2, 5, 10, 0));
        }

        #[test]
        fn floating_values_use_fallback() {
            let dt = resolver().resolve(&TimeRef::Floating, naive(2025, 2, 5, 10, 0));
            assert_eq!(dt.with_timezone(&Utc), utc(2025, 2, 5, 8, 0));
        }

        #[test]
        fn unknown_zone_uses_fallback() {
            let dt = resolver().resolve(
                &TimeRef::Zone("Custom Zone 42".to_string()),
                naive(2025, 2, 5, 10, 0),
            );
            assert_eq!(*dt.offset(), fixed(2));
        }

        #[test]
        fn utc_fallback() {
            let resolver = TimezoneResolver::new(FallbackZone::Utc);
            let dt = resolver.resolve(&TimeRef::Floating, naive(2025, 2, 5, 10, 0));
            assert_eq!(dt.with_timezone(&Utc), utc(2025, 2, 5, 10, 0));
        }

        #[test]
        fn iana_names_resolve() {
            let r = resolver();
            let summer = r.resolve(&TimeRef::Zone("Europe/Paris".to_string()), naive(2025, 7, 1, 10, 0));
            assert_eq!(summer.with_timezone(&Utc), utc(2025, 7, 1, 8, 0));
            let winter = r.resolve(
                &TimeRef::Zone("/mozilla.org/20050126_1/Europe/Paris".to_string()),
                naive(2025, 1, 15, 10, 0),
            );
            assert_eq!(winter.with_timezone(&Utc), utc(2025, 1, 15, 9, 0));
        }

        #[test]
        fn dst_gap_keeps_previous_offset() {
            let dt = resolver().resolve(&TimeRef::Zone("Europe/Paris".to_string()), naive(2025, 3, 30, 2, 30));
            assert_eq!(*dt.offset(), fixed(1));
            assert_eq!(dt.with_timezone(&Utc), utc(2025, 3, 30, 1, 30));
        }

        #[test]
        fn dst_fold_takes_earlier_instant() {
            let dt = resolver().resolve(&TimeRef::Zone("Europe/Paris".to_string()), naive(2025, 10, 26, 2, 30));
            assert_eq!(dt.with_timezone(&Utc), utc(2025, 10, 26, 0, 30));
        }

        #[test]
        fn embedded_definition_wins_over_iana() {
            let record = record_with(
                "BEGIN:VTIMEZONE\r\nTZID:Europe/Paris\r\nBEGIN:STANDARD\r\nTZOFFSETFROM:+0300\r\nTZOFFSETTO:+0300\r\nDTSTART:19700101T000000\r\nEND:STANDARD\r\nEND:VTIMEZONE\r\n",
                "DTSTART;TZID=Europe/Paris:20250701T100000",
            );
            let reference = TimeRef::Zone("Europe/Paris".to_string());
            let r = TimezoneResolver::for_reference(&record, &reference, FallbackZone::Utc).unwrap();
            let dt = r.resolve(&reference, naive(2025, 7, 1, 10, 0));
            assert_eq!(dt.with_timezone(&Utc), utc(2025, 7, 1, 7, 0));
        }

        #[test]
        fn spring_forward_records_differ_by_one_hour() {
            let before = record_with(NEW_YORK, "DTSTART;TZID=America/New_York:20250308T100000");
            let after = record_with(NEW_YORK, "DTSTART;TZID=America/New_York:20250310T100000");

            let resolve = |record: &RawRecord| {
                let start = DateTimeValue::from_property(record.get(FieldName::DtStart).unwrap()).unwrap();
                TimezoneResolver::for_reference(record, &start.reference, FallbackZone::Utc)
                    .unwrap()
                    .resolve(&start.reference, start.naive)
            };
            let first = resolve(&before);
            let second = resolve(&after);

            assert_eq!(second - first, Duration::days(2) - Duration::hours(1));
            assert_eq!(first.with_timezone(&Utc), utc(2025, 3, 8, 15, 0));
            assert_eq!(second.with_timezone(&Utc), utc(2025, 3, 10, 14, 0));
        }

        #[test]
        fn unreferenced_malformed_block_is_ignored() {
            let record = record_with(
                "BEGIN:VTIMEZONE\r\nTZID:Broken\r\nEND:VTIMEZONE\r\n",
                "DTSTART:20250701T100000Z",
            );
            assert!(TimezoneResolver::for_reference(&record, &TimeRef::Utc, FallbackZone::Utc).is_ok());
            let err = TimezoneResolver::from_record(&record, FallbackZone::Utc).unwrap_err();
            assert_eq!(err.kind(), RecordErrorKind::MalformedTimezone);
        }

        #[test]
        fn referenced_malformed_block_fails() {
            let record = record_with(
                "BEGIN:VTIMEZONE\r\nTZID:Broken\r\nEND:VTIMEZONE\r\n",
                "DTSTART;TZID=Broken:20250701T100000",
            );
            let err = TimezoneResolver::for_reference(
                &record,
                &TimeRef::Zone("Broken".to_string()),
                FallbackZone::Utc,
            )
            .unwrap_err();
            assert_eq!(err.kind(), RecordErrorKind::MalformedTimezone);
        }
    }

    mod values {
        use super::*;

        fn value_of(line: &str) -> RecordResult<DateTimeValue> {
            let record = parse(&format!("BEGIN:VEVENT\r\n{line}\r\nEND:VEVENT\r\n")).unwrap();
            DateTimeValue::from_property(record.get(FieldName::DtStart).unwrap())
        }

        #[test]
        fn utc_value() {
            let v = value_of("DTSTART:20250205T100000Z").unwrap();
            assert_eq!(v.reference, TimeRef::Utc);
            assert_eq!(v.naive, naive(2025, 2, 5, 10, 0));
            assert!(!v.all_day);
        }

        #[test]
        fn zoned_value() {
            let v = value_of("DTSTART;TZID=Europe/Paris:20250205T100000").unwrap();
            assert_eq!(v.reference, TimeRef::Zone("Europe/Paris".to_string()));
        }

        #[test]
        fn floating_value() {
            let v = value_of("DTSTART:20250205T100000").unwrap();
            assert_eq!(v.reference, TimeRef::Floating);
        }

        #[test]
        fn date_values() {
            let v = value_of("DTSTART;VALUE=DATE:20250210").unwrap();
            assert!(v.all_day);
            assert_eq!(v.naive, naive(2025, 2, 10, 0, 0));
            assert!(value_of("DTSTART:20250210").unwrap().all_day);
        }

        #[test]
        fn date_values_ignore_tzid() {
            let v = value_of("DTSTART;TZID=Europe/Paris;VALUE=DATE:20250210").unwrap();
            assert!(v.all_day);
            assert_eq!(v.reference, TimeRef::Floating);
        }

        #[test]
        fn invalid_values() {
            for line in ["DTSTART:tomorrow", "DTSTART:20251340T100000", "DTSTART;VALUE=DATE:2025-02-10"] {
                let err = value_of(line).unwrap_err();
                assert_eq!(err.kind(), RecordErrorKind::MalformedRecord, "{line}");
            }
        }
    }

    mod time_window {
        use super::*;

        #[test]
        fn around_is_inclusive() {
            let start = utc(2025, 2, 5, 10, 0).with_timezone(&fixed(-5));
            let window = TimeWindow::around(&start, Duration::minutes(20));
            assert_eq!(window.duration(), Duration::minutes(40));
            assert!(window.contains(&utc(2025, 2, 5, 9, 40)));
            assert!(window.contains(&utc(2025, 2, 5, 10, 20)));
            assert!(window.contains(&utc(2025, 2, 5, 10, 5)));
            assert!(!window.contains(&utc(2025, 2, 5, 9, 39)));
            assert!(!window.contains(&utc(2025, 2, 5, 10, 21)));
        }

        #[test]
        fn zero_threshold() {
            let start = utc(2025, 2, 5, 10, 0);
            let window = TimeWindow::around(&start, Duration::minutes(-5));
            assert!(window.contains(&start));
            assert!(!window.contains(&(start + Duration::seconds(1))));
        }

        #[test]
        #[should_panic(expected = "start must be <= end")]
        fn invalid_window() {
            TimeWindow::new(utc(2025, 2, 5, 17, 0), utc(2025, 2, 5, 9, 0));
        }
    }
}
