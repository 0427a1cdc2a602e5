//! Conference link detection.
//!
//! This module provides functionality to:
//! - Compile provider domain globs (`*.zoom.us`, `meet.google.com`) into rules
//! - Extract candidate URLs from free text, trimming the punctuation people
//!   type around them
//! - Unwrap Microsoft Outlook SafeLinks
//! - Pick the single best conference URL of a record
//! - Rewrite Zoom and Teams web URLs to their desktop-app URIs and back
//!
//! # Example
//!
//! ```
//! use meetlink_core::links::{LinkExtractor, ProviderRules};
//! use meetlink_core::parse;
//!
//! let record = parse(
//!     "BEGIN:VEVENT\r\nSUMMARY:Sync\r\nDESCRIPTION:Join at https://us02web.zoom.us/j/123.\r\nEND:VEVENT\r\n",
//! )
//! .unwrap();
//! let rules = ProviderRules::parse("*.zoom.us, meet.google.com").unwrap();
//! let url = LinkExtractor::new(&rules).extract(&record);
//! assert_eq!(url.as_deref(), Some("https://us02web.zoom.us/j/123"));
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, trace};
use url::{Position, Url};

use crate::config::{ConferenceConfig, ConfigError, DirectOpen};
use crate::record::{FieldName, RawRecord};

/// Provider domains used when none are configured.
pub const DEFAULT_PROVIDER_DOMAINS: &str = "*.zoom.us, zoom.us, meet.google.com, \
    hangouts.google.com, *.microsoft.com, teams.live.com, meet.goto.com, *.webex.com, \
    webex.com, meetings.dialpad.com, meet.jit.si";

/// Regex for extracting `scheme://...` substrings from text.
static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[A-Za-z][A-Za-z0-9+.\-]*://[^\s<>"'`]+"#).expect("Invalid URL regex")
});

/// Regex for detecting Microsoft Outlook SafeLinks.
///
/// SafeLinks wrap the original URL in a redirect through `safelinks.protection.outlook.com`.
/// The original URL is encoded in the `url` query parameter.
static SAFELINK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https?://[^/]*safelinks\.protection\.outlook\.com/?\?(?:[^&]*&)*url=([^&]+)")
        .expect("Invalid SafeLink regex")
});

static DEFAULT_RULES: LazyLock<ProviderRules> = LazyLock::new(|| {
    ProviderRules::parse(DEFAULT_PROVIDER_DOMAINS).expect("Invalid default provider domains")
});

/// Characters stripped from the end of a candidate URL.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '\'', '"'];

/// Closing wrappers stripped when they have no opening partner in the URL.
const WRAPPERS: &[(char, char)] = &[('(', ')'), ('[', ']'), ('<', '>'), ('{', '}')];

/// One compiled provider glob.
///
/// The host part is a dot-separated list of labels where each label is
/// either a literal or exactly `*`. A `*` label matches one non-empty DNS
/// label, so `*.zoom.us` matches `us02web.zoom.us` but neither `zoom.us` nor
/// `a.b.zoom.us`. An optional path part (`zoom.us/j/*`) is matched as a
/// prefix of the URL path, with `*` matching within one path segment.
#[derive(Debug, Clone)]
pub struct ProviderRule {
    pattern: String,
    host: Regex,
    path: Option<Regex>,
}

impl ProviderRule {
    /// Compiles one glob.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] for empty labels and for labels
    /// that mix `*` with other characters (`*zoom.us`, `zo*m.us`).
    pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
        let pattern = pattern.trim();
        let invalid = |reason: &str| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let (host_part, path_part) = match pattern.find('/') {
            Some(idx) => (&pattern[..idx], Some(&pattern[idx..])),
            None => (pattern, None),
        };
        if host_part.is_empty() {
            return Err(invalid("empty host"));
        }

        let mut host_re = String::from("(?i)^");
        for (i, label) in host_part.trim_end_matches('.').split('.').enumerate() {
            if i > 0 {
                host_re.push_str(r"\.");
            }
            match label {
                "" => return Err(invalid("empty label")),
                "*" => host_re.push_str(r"[^.]+"),
                l if l.contains('*') => {
                    return Err(invalid("a wildcard must be a whole label"));
                }
                l => host_re.push_str(&regex::escape(l)),
            }
        }
        host_re.push('$');

        let path = path_part
            .filter(|p| *p != "/")
            .map(|p| {
                let body = p
                    .split('*')
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join("[^/]*");
                Regex::new(&format!("^{body}"))
            })
            .transpose()
            .map_err(|e| invalid(&e.to_string()))?;

        let host = Regex::new(&host_re).map_err(|e| invalid(&e.to_string()))?;
        Ok(Self {
            pattern: pattern.to_string(),
            host,
            path,
        })
    }

    /// The glob this rule was compiled from.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns true if `host` matches the host part of the rule.
    pub fn matches(&self, host: &str) -> bool {
        self.host.is_match(host.trim_end_matches('.'))
    }

    /// Returns true if both host and (when present) path match.
    pub fn matches_url(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        self.matches(host) && self.path.as_ref().is_none_or(|p| p.is_match(url.path()))
    }
}

impl fmt::Display for ProviderRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// An ordered list of provider rules.
#[derive(Debug, Clone)]
pub struct ProviderRules {
    rules: Vec<ProviderRule>,
}

impl ProviderRules {
    /// Compiles a comma-separated glob list. Blank entries are skipped.
    pub fn parse(list: &str) -> Result<Self, ConfigError> {
        let rules = list
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(ProviderRule::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// The rules, in configured order.
    pub fn rules(&self) -> &[ProviderRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns true if any rule matches `host`.
    pub fn matches(&self, host: &str) -> bool {
        self.rules.iter().any(|r| r.matches(host))
    }

    /// Returns the first rule matching a URL.
    pub fn find(&self, url: &Url) -> Option<&ProviderRule> {
        self.rules.iter().find(|r| r.matches_url(url))
    }
}

impl Default for ProviderRules {
    fn default() -> Self {
        DEFAULT_RULES.clone()
    }
}

/// Where a candidate URL was found. Variants are in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkSource {
    Url,
    Description,
    Location,
}

impl LinkSource {
    /// All sources, highest priority first.
    pub const ALL: [LinkSource; 3] = [Self::Url, Self::Description, Self::Location];

    /// The record field this source reads.
    pub const fn field(self) -> FieldName {
        match self {
            Self::Url => FieldName::Url,
            Self::Description => FieldName::Description,
            Self::Location => FieldName::Location,
        }
    }
}

/// A provider URL found in a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkCandidate {
    pub url: String,
    pub source: LinkSource,
}

/// Finds the conference URL of a record.
#[derive(Debug, Clone)]
pub struct LinkExtractor<'a> {
    rules: &'a ProviderRules,
    direct_open: DirectOpen,
}

impl<'a> LinkExtractor<'a> {
    /// Creates an extractor with direct-open rewriting disabled.
    pub fn new(rules: &'a ProviderRules) -> Self {
        Self {
            rules,
            direct_open: DirectOpen::default(),
        }
    }

    /// Creates an extractor from a full configuration.
    pub fn from_config(config: &'a ConferenceConfig) -> Self {
        Self::new(config.providers()).with_direct_open(config.direct_open())
    }

    /// Sets the direct-open preferences.
    pub fn with_direct_open(mut self, direct_open: DirectOpen) -> Self {
        self.direct_open = direct_open;
        self
    }

    /// Returns the provider URLs in `text`, in order of appearance.
    ///
    /// Trailing punctuation and unbalanced wrappers are trimmed and SafeLinks
    /// are unwrapped before rules are applied.
    pub fn urls_in(&self, text: &str) -> Vec<String> {
        URL_REGEX
            .find_iter(text)
            .filter_map(|m| {
                let trimmed = trim_candidate(m.as_str());
                let unwrapped = unwrap_safelink(trimmed);
                let Ok(parsed) = Url::parse(&unwrapped) else {
                    trace!(candidate = %unwrapped, "skipping unparsable URL");
                    return None;
                };
                let rule = self.rules.find(&parsed)?;
                trace!(url = %unwrapped, rule = %rule, "provider rule matched");
                Some(unwrapped)
            })
            .collect()
    }

    /// Returns every distinct provider URL of a record, with the
    /// highest-priority source it appeared in.
    pub fn candidates(&self, record: &RawRecord) -> Vec<LinkCandidate> {
        let sources = LinkSource::ALL
            .into_iter()
            .filter_map(|source| record.value(source.field()).map(|text| (source, text)));
        self.candidates_from(sources)
    }

    /// Like [`candidates`](Self::candidates), over explicit `(source, text)`
    /// pairs.
    pub fn candidates_from<'t, I>(&self, sources: I) -> Vec<LinkCandidate>
    where
        I: IntoIterator<Item = (LinkSource, &'t str)>,
    {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for (source, text) in sources {
            for url in self.urls_in(text) {
                if seen.insert(url.clone()) {
                    candidates.push(LinkCandidate { url, source });
                }
            }
        }
        candidates
    }

    /// Returns the conference URL of a record, rewritten for direct open when
    /// configured. `None` means the record has no provider link.
    pub fn extract(&self, record: &RawRecord) -> Option<String> {
        let candidate = self.candidates(record).into_iter().next()?;
        let url = to_app_uri(&candidate.url, self.direct_open);
        debug!(url = %url, source = ?candidate.source, "selected conference link");
        Some(url)
    }
}

/// Strips sentence punctuation and unbalanced closing wrappers from the end
/// of a candidate.
fn trim_candidate(mut s: &str) -> &str {
    loop {
        let Some(last) = s.chars().last() else {
            return s;
        };
        let strip = if TRAILING_PUNCTUATION.contains(&last) {
            true
        } else if let Some((open, close)) = WRAPPERS.iter().find(|(_, c)| *c == last) {
            s.matches(*close).count() > s.matches(*open).count()
        } else {
            false
        };
        if !strip {
            return s;
        }
        s = &s[..s.len() - last.len_utf8()];
    }
}

/// Unwraps a Microsoft Outlook SafeLink to get the original URL.
///
/// If the URL is not a SafeLink, it is returned unchanged.
fn unwrap_safelink(url: &str) -> String {
    if let Some(encoded) = SAFELINK_REGEX.captures(url).and_then(|caps| caps.get(1))
        && let Ok(decoded) = urlencoding::decode(encoded.as_str())
    {
        return decoded.into_owned();
    }
    url.to_string()
}

/// Applies the enabled direct-open rewrites. URLs without a recognized
/// shape are returned unchanged.
pub fn to_app_uri(url: &str, direct_open: DirectOpen) -> String {
    if direct_open.zoom
        && let Some(uri) = zoom_app_uri(url)
    {
        return uri;
    }
    if direct_open.msteams
        && let Some(uri) = teams_app_uri(url)
    {
        return uri;
    }
    url.to_string()
}

/// Inverse of [`to_app_uri`]: turns an app URI back into its web URL.
/// Anything else is returned unchanged.
pub fn to_web_url(uri: &str) -> String {
    zoom_web_url(uri)
        .or_else(|| teams_web_url(uri))
        .unwrap_or_else(|| uri.to_string())
}

fn is_zoom_host(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host == "zoom.us" || host.ends_with(".zoom.us")
}

/// `https://HOST/j/ID?pwd=P` → `zoommtg://HOST/join?confno=ID&pwd=P`.
///
/// Also accepts `/w/ID` and `/s/ID`. The app joins all three the same way,
/// so they share one deep link and [`zoom_web_url`] gives back the `/j/`
/// form. Other query pairs are kept in order; a fragment is dropped.
pub fn zoom_app_uri(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str().filter(|h| is_zoom_host(h))?;

    let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());
    let (kind, id) = (segments.next()?, segments.next()?);
    if segments.next().is_some() || !matches!(kind, "j" | "w" | "s") {
        return None;
    }

    let mut uri = format!("zoommtg://{host}/join?confno={id}");
    for pair in parsed.query().unwrap_or("").split('&').filter(|p| !p.is_empty()) {
        uri.push('&');
        uri.push_str(pair);
    }
    Some(uri)
}

/// `zoommtg://HOST/join?confno=ID&rest` → `https://HOST/j/ID?rest`.
pub fn zoom_web_url(uri: &str) -> Option<String> {
    let parsed = Url::parse(uri).ok()?;
    if !parsed.scheme().eq_ignore_ascii_case("zoommtg") || parsed.path() != "/join" {
        return None;
    }
    let host = parsed.host_str()?;

    let mut id = None;
    let mut rest = Vec::new();
    for pair in parsed.query().unwrap_or("").split('&').filter(|p| !p.is_empty()) {
        match pair.strip_prefix("confno=") {
            Some(value) if id.is_none() => id = Some(value),
            _ => rest.push(pair),
        }
    }
    let id = id.filter(|id| !id.is_empty())?;

    let mut url = format!("https://{host}/j/{id}");
    if !rest.is_empty() {
        url.push('?');
        url.push_str(&rest.join("&"));
    }
    Some(url)
}

/// `https://teams.microsoft.com/PATH` → `msteams:/PATH`.
pub fn teams_app_uri(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https")
        || parsed.host_str() != Some("teams.microsoft.com")
    {
        return None;
    }
    let rest = &parsed[Position::BeforePath..];
    if rest.is_empty() || rest == "/" {
        return None;
    }
    Some(format!("msteams:{rest}"))
}

/// `msteams:/PATH` → `https://teams.microsoft.com/PATH`.
pub fn teams_web_url(uri: &str) -> Option<String> {
    let rest = uri.strip_prefix("msteams:")?;
    if !rest.starts_with('/') || rest.starts_with("//") {
        return None;
    }
    Some(format!("https://teams.microsoft.com{rest}"))
}
