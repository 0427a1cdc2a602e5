//! Client error types.

use std::fmt;

use meetlink_core::{ConfigError, RecordError};

use crate::source::SourceError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// IO error.
    Io(std::io::Error),
    /// Event enumeration or lookup failed.
    Source(SourceError),
    /// A single record could not be normalized.
    Record(RecordError),
    /// JSON serialization failed.
    Json(serde_json::Error),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Source(err) => write!(f, "calendar error: {}", err),
            Self::Record(err) => write!(f, "invalid event: {}", err),
            Self::Json(err) => write!(f, "JSON error: {}", err),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Source(err) => Some(err),
            Self::Record(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::Config(_) => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<SourceError> for ClientError {
    fn from(err: SourceError) -> Self {
        Self::Source(err)
    }
}

impl From<RecordError> for ClientError {
    fn from(err: RecordError) -> Self {
        Self::Record(err)
    }
}

impl From<ConfigError> for ClientError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meetlink_core::FieldName;

    #[test]
    fn display_messages() {
        let err = ClientError::Config("bad value".to_string());
        assert_eq!(err.to_string(), "configuration error: bad value");

        let err: ClientError = RecordError::MissingField(FieldName::Summary).into();
        assert_eq!(err.to_string(), "invalid event: missing required field SUMMARY");

        let err: ClientError = ConfigError::InvalidTimezone("Mars/Olympus".to_string()).into();
        assert!(err.to_string().starts_with("configuration error: invalid fallback timezone"));

        let err: ClientError = SourceError::NotFound {
            uid: "ABC".to_string(),
        }
        .into();
        assert!(err.to_string().contains("ABC"));
    }
}
