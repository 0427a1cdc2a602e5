//! The default query: print feedback for current meetings.

use chrono::{DateTime, Utc};

use crate::app::App;
use crate::error::ClientResult;
use crate::source::EventSource;

/// Prints the launcher feedback for meetings current at `now`.
pub fn run<S: EventSource>(app: &App<S>, now: DateTime<Utc>) -> ClientResult<()> {
    println!("{}", render(app, now)?);
    Ok(())
}

/// The feedback JSON for meetings current at `now`.
pub fn render<S: EventSource>(app: &App<S>, now: DateTime<Utc>) -> ClientResult<String> {
    Ok(app.feedback(now)?.to_json()?)
}
