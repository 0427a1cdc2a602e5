//! Calendar record parsing (iCalendar content lines, RFC 5545 §3.1).
//!
//! [`parse`] turns the raw text of one `.ics` event file into a [`RawRecord`]:
//! the fields of its first VEVENT plus any VTIMEZONE blocks defined next to
//! it. Only the small set of fields in [`FieldName`] is retained; everything
//! else (X- properties, VALARM contents, attendees) is skipped.
//!
//! Content lines are tokenized with `icalendar`'s parser. The component
//! layout is checked against the physical lines beforehand, so structural
//! errors and [`Property::line`] refer to lines of the original text.
//!
//! Duplicate field lines resolve to the **first** occurrence. Multi-valued
//! fields (RDATE) keep every occurrence and can be read with
//! [`FieldMap::get_all`].

use std::collections::BTreeMap;
use std::fmt;

use icalendar::parser::{Component, read_calendar, unfold};
use tracing::{debug, trace};

use crate::error::{RecordError, RecordResult};

/// Maximum octets per physical line when folding.
const FOLD_WIDTH: usize = 75;

/// The fields this crate understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldName {
    Summary,
    DtStart,
    DtEnd,
    Description,
    Location,
    Url,
    Uid,
    Tzid,
    TzOffsetFrom,
    TzOffsetTo,
    TzName,
    RRule,
    RDate,
}

/// Whether an event record must carry a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Normalization fails without it.
    Required,
    /// May be absent.
    Optional,
}

impl FieldName {
    /// Every recognized field.
    pub const ALL: [FieldName; 13] = [
        Self::Summary,
        Self::DtStart,
        Self::DtEnd,
        Self::Description,
        Self::Location,
        Self::Url,
        Self::Uid,
        Self::Tzid,
        Self::TzOffsetFrom,
        Self::TzOffsetTo,
        Self::TzName,
        Self::RRule,
        Self::RDate,
    ];

    /// Returns the property name as written in iCalendar text.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "SUMMARY",
            Self::DtStart => "DTSTART",
            Self::DtEnd => "DTEND",
            Self::Description => "DESCRIPTION",
            Self::Location => "LOCATION",
            Self::Url => "URL",
            Self::Uid => "UID",
            Self::Tzid => "TZID",
            Self::TzOffsetFrom => "TZOFFSETFROM",
            Self::TzOffsetTo => "TZOFFSETTO",
            Self::TzName => "TZNAME",
            Self::RRule => "RRULE",
            Self::RDate => "RDATE",
        }
    }

    /// Looks up a property name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str().eq_ignore_ascii_case(name))
    }

    /// Cardinality of the field inside an event.
    pub fn cardinality(&self) -> Cardinality {
        match self {
            Self::Summary | Self::DtStart => Cardinality::Required,
            _ => Cardinality::Optional,
        }
    }

    /// Returns true for TEXT-typed fields, whose values use backslash escapes.
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            Self::Summary | Self::Description | Self::Location | Self::TzName
        )
    }

    /// Returns true if every occurrence of the field is meaningful.
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, Self::RDate)
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed property: its parameters and (unescaped) value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Parameters in source order, names upper-cased, quotes removed.
    pub params: Vec<(String, String)>,
    /// The property value. TEXT values are already unescaped.
    pub value: String,
    /// 1-based line number of the logical line this came from.
    pub line: usize,
}

impl Property {
    /// Returns a parameter value by name, ignoring ASCII case.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Recognized fields of one component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    fields: BTreeMap<FieldName, Vec<Property>>,
}

impl FieldMap {
    /// Records an occurrence of a field. Returns false when an earlier
    /// occurrence already determines the field's value.
    fn insert(&mut self, name: FieldName, property: Property) -> bool {
        let entries = self.fields.entry(name).or_default();
        entries.push(property);
        entries.len() == 1 || name.is_multi_valued()
    }

    /// Returns the first occurrence of a field.
    pub fn get(&self, name: FieldName) -> Option<&Property> {
        self.fields.get(&name).and_then(|entries| entries.first())
    }

    /// Returns every occurrence of a field, in source order.
    pub fn get_all(&self, name: FieldName) -> &[Property] {
        self.fields.get(&name).map_or(&[], Vec::as_slice)
    }

    /// Returns the value of the first occurrence of a field.
    pub fn value(&self, name: FieldName) -> Option<&str> {
        self.get(name).map(|p| p.value.as_str())
    }

    /// Returns true if the field occurs at least once.
    pub fn contains(&self, name: FieldName) -> bool {
        self.fields.contains_key(&name)
    }

}

/// STANDARD or DAYLIGHT observance inside a VTIMEZONE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservanceKind {
    Standard,
    Daylight,
}

impl ObservanceKind {
    /// Returns the component name for this observance kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Daylight => "DAYLIGHT",
        }
    }
}

/// A STANDARD/DAYLIGHT block as it appeared in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObservance {
    pub kind: ObservanceKind,
    pub fields: FieldMap,
    pub line: usize,
}

/// A VTIMEZONE block as it appeared in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTimezone {
    pub fields: FieldMap,
    pub observances: Vec<RawObservance>,
    pub line: usize,
}

impl RawTimezone {
    /// The TZID of this block, if it declares one.
    pub fn tzid(&self) -> Option<&str> {
        self.fields.value(FieldName::Tzid)
    }
}

/// The parsed form of one event record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    event: FieldMap,
    timezones: Vec<RawTimezone>,
}

impl RawRecord {
    /// The recognized fields of the event.
    pub fn fields(&self) -> &FieldMap {
        &self.event
    }

    /// Returns the first occurrence of an event field.
    pub fn get(&self, name: FieldName) -> Option<&Property> {
        self.event.get(name)
    }

    /// Returns the value of an event field.
    pub fn value(&self, name: FieldName) -> Option<&str> {
        self.event.value(name)
    }

    /// Returns a field or [`RecordError::MissingField`].
    pub fn require(&self, name: FieldName) -> RecordResult<&Property> {
        self.event.get(name).ok_or(RecordError::MissingField(name))
    }

    /// VTIMEZONE blocks found in the same container, in source order.
    pub fn timezones(&self) -> &[RawTimezone] {
        &self.timezones
    }

    /// Returns the fields declared [`Cardinality::Required`] that are absent.
    pub fn missing_required(&self) -> Vec<FieldName> {
        FieldName::ALL
            .into_iter()
            .filter(|f| f.cardinality() == Cardinality::Required && !self.event.contains(*f))
            .collect()
    }
}

/// Parses the text of one calendar record.
///
/// Accepts CRLF or LF line endings and a leading byte-order mark. The outer
/// component must be VCALENDAR (a bare VEVENT is tolerated). Content lines
/// are tokenized by the `icalendar` parser; the component layout is checked
/// here first so errors can point at a line.
///
/// # Errors
///
/// Returns [`RecordError::MalformedRecord`] when a component is never
/// terminated or closed out of order, when a continuation line has nothing
/// to continue, when a line is not of the form `NAME[;PARAMS]:VALUE`, or when
/// the record holds no VEVENT.
pub fn parse(input: &str) -> RecordResult<RawRecord> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let layout = Layout::scan(input)?;

    let unfolded = unfold(input);
    let calendar = read_calendar(&unfolded).map_err(|e| {
        RecordError::malformed(layout.last_line, format!("unparsable content: {e}"))
    })?;

    let lifted_root = layout.root_is_calendar
        && !calendar
            .components
            .iter()
            .any(|c| name_of(&c.name).eq_ignore_ascii_case("VCALENDAR"));
    let mut lines = layout.components.into_iter();
    if lifted_root {
        lines.next();
    }

    let nodes: Vec<Node> = calendar
        .components
        .iter()
        .map(|c| Node::convert(c, &mut lines))
        .collect();

    let mut collected = Collected::default();
    for node in nodes {
        collected.visit(node);
    }

    let event = collected
        .event
        .ok_or_else(|| RecordError::malformed(layout.last_line, "record contains no VEVENT"))?;
    Ok(RawRecord {
        event,
        timezones: collected.timezones,
    })
}

fn name_of<'a>(name: &'a impl AsRef<str>) -> &'a str {
    name.as_ref()
}

/// Line numbers of one component, in document order.
#[derive(Debug)]
struct ComponentLines {
    kind: String,
    begin: usize,
    properties: Vec<usize>,
}

/// The component layout of a record, read from its physical lines.
#[derive(Debug)]
struct Layout {
    /// Every component in BEGIN order.
    components: Vec<ComponentLines>,
    root_is_calendar: bool,
    last_line: usize,
}

impl Layout {
    fn scan(input: &str) -> RecordResult<Self> {
        let mut components: Vec<ComponentLines> = Vec::new();
        let mut stack: Vec<usize> = Vec::new();
        let mut root: Option<String> = None;
        let mut has_event = false;
        let mut previous_blank = true;
        let mut last_line = 0;

        for (idx, raw) in input.split('\n').enumerate() {
            let line_num = idx + 1;
            let line = raw.strip_suffix('\r').unwrap_or(raw);

            if line.starts_with([' ', '\t']) {
                if previous_blank {
                    return Err(RecordError::malformed(
                        line_num,
                        "continuation line with no preceding content line",
                    ));
                }
                continue;
            }
            previous_blank = line.is_empty();
            if line.is_empty() {
                continue;
            }
            last_line = line_num;

            let name_end = line
                .find([';', ':'])
                .ok_or_else(|| RecordError::malformed(line_num, "line has no NAME: delimiter"))?;
            let name = &line[..name_end];
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                return Err(RecordError::malformed(
                    line_num,
                    format!("line has no NAME: delimiter (found {name:?})"),
                ));
            }
            let rest = &line[name_end..];

            if name.eq_ignore_ascii_case("BEGIN") {
                let value = component_kind(rest);
                if stack.is_empty() {
                    if root.is_some() {
                        return Err(RecordError::malformed(
                            line_num,
                            format!("BEGIN:{value} after the outer component was closed"),
                        ));
                    }
                    if value != "VCALENDAR" && value != "VEVENT" {
                        return Err(RecordError::malformed(
                            line_num,
                            format!("unexpected outer component {value}"),
                        ));
                    }
                    root = Some(value.clone());
                }
                has_event |= value == "VEVENT";
                stack.push(components.len());
                components.push(ComponentLines {
                    kind: value,
                    begin: line_num,
                    properties: Vec::new(),
                });
            } else if name.eq_ignore_ascii_case("END") {
                let value = component_kind(rest);
                let open = stack.pop().ok_or_else(|| {
                    RecordError::malformed(line_num, format!("END:{value} without matching BEGIN"))
                })?;
                if components[open].kind != value {
                    return Err(RecordError::malformed(
                        line_num,
                        format!("END:{value} does not close BEGIN:{}", components[open].kind),
                    ));
                }
            } else {
                let open = stack.last().ok_or_else(|| {
                    RecordError::malformed(line_num, "property outside of any component")
                })?;
                components[*open].properties.push(line_num);
            }
        }

        if let Some(&open) = stack.last() {
            return Err(RecordError::malformed(
                last_line,
                format!(
                    "BEGIN:{} at line {} is never terminated",
                    components[open].kind, components[open].begin
                ),
            ));
        }
        if !has_event {
            return Err(RecordError::malformed(last_line, "record contains no VEVENT"));
        }

        Ok(Self {
            components,
            root_is_calendar: root.as_deref() == Some("VCALENDAR"),
            last_line,
        })
    }
}

/// The upper-cased value of a BEGIN or END line, given the text after its
/// name.
fn component_kind(rest: &str) -> String {
    rest.split_once(':')
        .map_or("", |(_, v)| v)
        .trim()
        .to_ascii_uppercase()
}

/// A parsed component reduced to the recognized fields.
struct Node {
    kind: String,
    line: usize,
    fields: FieldMap,
    children: Vec<Node>,
}

impl Node {
    /// Converts a parsed component, taking line numbers from `lines` in
    /// document order.
    fn convert(
        component: &Component<'_>,
        lines: &mut impl Iterator<Item = ComponentLines>,
    ) -> Self {
        let kind = name_of(&component.name).to_ascii_uppercase();
        let (line, property_lines) = lines
            .next()
            .map_or((0, Vec::new()), |c| (c.begin, c.properties));

        let mut fields = FieldMap::default();
        for (idx, prop) in component.properties.iter().enumerate() {
            let line = property_lines.get(idx).copied().unwrap_or(line);
            let prop_name = name_of(&prop.name);
            let Some(name) = FieldName::from_name(prop_name) else {
                trace!(name = %prop_name, line, "skipping unrecognized property");
                continue;
            };
            let raw = name_of(&prop.val);
            let property = Property {
                params: prop
                    .params
                    .iter()
                    .map(|p| {
                        let value = p.val.as_ref().map_or("", |v| v.as_ref());
                        (name_of(&p.key).to_ascii_uppercase(), unquote(value).to_string())
                    })
                    .collect(),
                value: if name.is_text() {
                    unescape_text(raw)
                } else {
                    raw.to_string()
                },
                line,
            };
            if !fields.insert(name, property) {
                debug!(field = %name, line, component = %kind, "duplicate field, keeping first occurrence");
            }
        }

        let children = component
            .components
            .iter()
            .map(|c| Self::convert(c, lines))
            .collect();

        Self {
            kind,
            line,
            fields,
            children,
        }
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// The parts of the component tree a record keeps.
#[derive(Default)]
struct Collected {
    event: Option<FieldMap>,
    timezones: Vec<RawTimezone>,
}

impl Collected {
    fn visit(&mut self, node: Node) {
        match node.kind.as_str() {
            "VEVENT" => {
                if self.event.is_none() {
                    self.event = Some(node.fields);
                } else {
                    debug!(line = node.line, "ignoring additional VEVENT");
                }
            }
            "VTIMEZONE" => {
                let observances = node
                    .children
                    .into_iter()
                    .filter_map(|child| {
                        let kind = match child.kind.as_str() {
                            "STANDARD" => ObservanceKind::Standard,
                            "DAYLIGHT" => ObservanceKind::Daylight,
                            _ => return None,
                        };
                        Some(RawObservance {
                            kind,
                            fields: child.fields,
                            line: child.line,
                        })
                    })
                    .collect();
                self.timezones.push(RawTimezone {
                    fields: node.fields,
                    observances,
                    line: node.line,
                });
            }
            "VCALENDAR" => {
                for child in node.children {
                    self.visit(child);
                }
            }
            _ => {}
        }
    }
}

/// Folds one logical content line to physical lines of at most 75 octets.
///
/// Never splits a UTF-8 sequence. Continuation lines start with one space,
/// lines are joined with CRLF, and no trailing line break is added.
pub fn fold_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + line.len() / FOLD_WIDTH * 3);
    let mut width = 0;
    let mut limit = FOLD_WIDTH;

    for c in line.chars() {
        let len = c.len_utf8();
        if width + len > limit {
            out.push_str("\r\n ");
            width = 0;
            // the leading space counts towards the width
            limit = FOLD_WIDTH - 1;
        }
        out.push(c);
        width += len;
    }

    out
}

/// Reverses TEXT escaping: `\\`, `\,`, `\;`, `\n` and `\N`.
///
/// Unknown escapes keep their backslash.
pub fn unescape_text(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.peek() {
            Some(&escaped @ (',' | ';' | '\\')) => {
                result.push(escaped);
                chars.next();
            }
            Some('n' | 'N') => {
                result.push('\n');
                chars.next();
            }
            _ => result.push(c),
        }
    }

    result
}
