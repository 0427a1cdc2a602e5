//! Error types for record parsing and normalization.
//!
//! A missing conference link is never an error; these only describe records
//! that cannot be turned into a [`CanonicalEvent`](crate::CanonicalEvent).

use std::fmt;

use thiserror::Error;

use crate::record::FieldName;

/// The category of a record error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordErrorKind {
    /// Structurally invalid record (unterminated block, orphan continuation).
    MalformedRecord,
    /// A timezone block is present but cannot be interpreted.
    MalformedTimezone,
    /// A required field (title or start) is absent.
    MissingField,
}

impl RecordErrorKind {
    /// Returns a stable name for this error kind, suitable for log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedRecord => "malformed_record",
            Self::MalformedTimezone => "malformed_timezone",
            Self::MissingField => "missing_field",
        }
    }
}

impl fmt::Display for RecordErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised while parsing or normalizing one event record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The record text is not a well-formed calendar record.
    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord {
        /// 1-based physical line number where the problem was detected.
        line: usize,
        /// What was wrong.
        reason: String,
    },

    /// A VTIMEZONE definition is present but unusable.
    #[error("malformed timezone {tzid:?}: {reason}")]
    MalformedTimezone {
        /// The TZID of the offending block (empty when the block has none).
        tzid: String,
        /// What was wrong.
        reason: String,
    },

    /// A field the normalizer requires is absent.
    #[error("missing required field {0}")]
    MissingField(FieldName),
}

impl RecordError {
    /// Creates a malformed record error.
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            line,
            reason: reason.into(),
        }
    }

    /// Creates a malformed timezone error.
    pub fn malformed_timezone(tzid: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedTimezone {
            tzid: tzid.into(),
            reason: reason.into(),
        }
    }

    /// Returns the error kind.
    pub fn kind(&self) -> RecordErrorKind {
        match self {
            Self::MalformedRecord { .. } => RecordErrorKind::MalformedRecord,
            Self::MalformedTimezone { .. } => RecordErrorKind::MalformedTimezone,
            Self::MissingField(_) => RecordErrorKind::MissingField,
        }
    }
}

/// A specialized Result type for record operations.
pub type RecordResult<T> = Result<T, RecordError>;
