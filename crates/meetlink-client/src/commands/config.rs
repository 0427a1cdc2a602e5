//! Configuration commands.

use meetlink_core::ConferenceConfig;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Dump the current configuration to stdout.
pub fn dump(config: &ClientConfig) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", ClientConfig::default_path().display());
    println!("{}", toml_str);

    Ok(())
}

/// Validate the configuration. `conference` is the result of layering the
/// environment and flags over the file, which already failed on bad values.
pub fn validate(conference: &ConferenceConfig) -> ClientResult<()> {
    if conference.providers().is_empty() {
        return Err(ClientError::Config(
            "conference_domains must not be empty".to_string(),
        ));
    }
    println!(
        "Configuration is valid ({} provider rules, fallback timezone {}).",
        conference.providers().rules().len(),
        conference.fallback_zone()
    );
    Ok(())
}

/// Show the configuration file path.
pub fn path() -> ClientResult<()> {
    let config_path = ClientConfig::default_path();
    println!("config: {}", config_path.display());
    Ok(())
}
