//! Configuration validation utilities.

use std::collections::HashSet;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotConfig, ChannelConfig, DispatchConfig, GeneralConfig};

/// Validates the entire configuration.
///
/// Only startup-fatal problems are rejected here. Inconsistent plugin
/// sections are reported by the loader and cost at most one role.
pub fn validate_config(config: &BotConfig) -> ConfigResult<()> {
    validate_general_config(&config.general)?;
    validate_channel_config(&config.channel)?;
    validate_dispatch_config(&config.dispatch)?;
    Ok(())
}

/// Validates server, account and plugin list.
fn validate_general_config(general: &GeneralConfig) -> ConfigResult<()> {
    validate_url(&general.server_url, "general.mattermost", "http")?;
    validate_url(&general.ws_url, "general.wsurl", "ws")?;

    require(&general.team_name, "general.teamname")?;
    require(&general.user_name, "general.username")?;
    require(&general.user_password, "general.userpassword")?;

    let mut seen = HashSet::new();
    for plugin in &general.plugins {
        if plugin.trim().is_empty() {
            return Err(ConfigError::validation("Plugin names cannot be empty"));
        }
        if !seen.insert(plugin) {
            return Err(ConfigError::DuplicatePlugin(plugin.clone()));
        }
    }

    Ok(())
}

/// Validates the fixed channel names.
fn validate_channel_config(channel: &ChannelConfig) -> ConfigResult<()> {
    require(&channel.log, "channel.log")?;
    require(&channel.main, "channel.main")?;
    require(&channel.status, "channel.status")?;
    Ok(())
}

fn validate_dispatch_config(dispatch: &DispatchConfig) -> ConfigResult<()> {
    if dispatch.call_timeout_secs == Some(0) {
        return Err(ConfigError::validation(
            "dispatch.call_timeout_secs must be greater than 0",
        ));
    }
    Ok(())
}

fn require(value: &str, field: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::missing_field(field));
    }
    Ok(())
}

/// Validates a URL.
fn validate_url(url: &str, field: &str, expected_scheme: &str) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::missing_field(field));
    }

    let valid_schemes = match expected_scheme {
        "ws" => ["ws://", "wss://"],
        "http" => ["http://", "https://"],
        _ => return Err(ConfigError::validation("Unknown URL scheme type")),
    };

    if !valid_schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("{field} must start with one of: {valid_schemes:?}"),
        ));
    }

    Ok(())
}
