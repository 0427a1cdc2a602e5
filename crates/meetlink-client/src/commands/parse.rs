//! Normalize a single `.ics` file.

use std::path::Path;

use meetlink_core::{ConferenceConfig, normalize_text};

use crate::error::ClientResult;

/// Prints the normalized event of `path` as JSON.
pub fn run(path: &Path, config: &ConferenceConfig) -> ClientResult<()> {
    println!("{}", render(path, config)?);
    Ok(())
}

/// The normalized event of `path` as pretty JSON.
///
/// Unlike the list query, record errors are reported to the caller.
pub fn render(path: &Path, config: &ConferenceConfig) -> ClientResult<String> {
    let text = std::fs::read_to_string(path)?;
    let event = normalize_text(&text, config)?;
    Ok(serde_json::to_string_pretty(&event)?)
}
