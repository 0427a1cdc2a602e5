//! CLI, calendar store access, launcher feedback output
//!
//! This crate provides the `meetlink` command-line interface.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod feedback;
pub mod source;

pub use app::App;
pub use cli::Cli;
pub use error::{ClientError, ClientResult};
pub use source::{CalendarStore, EventSource};
