//! Configuration schema definitions.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use mbot_core::PluginDescriptor;
use serde::{Deserialize, Serialize};

/// Root configuration structure.
///
/// Every top-level table other than the fixed sections is a plugin section,
/// keyed by plugin name:
///
/// ```toml
/// [general]
/// plugins = ["weather"]
///
/// [weather]
/// watcher = "OnPost"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BotConfig {
    /// Server, account and plugin list.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Fixed channel names.
    #[serde(default)]
    pub channel: ChannelConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Plugin sections.
    #[serde(flatten)]
    pub plugins: BTreeMap<String, PluginDescriptor>,
}

impl BotConfig {
    /// Descriptor of the listed plugin `name`.
    ///
    /// The section is looked up by the full name first, then by its file
    /// stem, so `weather.so` may be configured under `[weather]`. A plugin
    /// without a section gets an inert descriptor.
    pub fn descriptor(&self, name: &str) -> PluginDescriptor {
        let stem = Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name);

        let mut desc = self
            .plugins
            .get(name)
            .or_else(|| self.plugins.get(stem))
            .cloned()
            .unwrap_or_default();
        desc.name = name.to_string();
        desc
    }

    /// Descriptors of all listed plugins, in list order.
    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        self.general
            .plugins
            .iter()
            .map(|name| self.descriptor(name))
            .collect()
    }
}

// =============================================================================
// General
// =============================================================================

/// Server, bot account and plugin list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// REST base URL, e.g. `https://chat.example.com`.
    #[serde(rename = "mattermost", default)]
    pub server_url: String,

    /// Websocket base URL, e.g. `wss://chat.example.com`.
    #[serde(rename = "wsurl", default)]
    pub ws_url: String,

    /// HTTP listen address; `:8080` means all interfaces.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Display name used in notices and the help reply.
    #[serde(rename = "botname", default = "default_bot_name")]
    pub bot_name: String,

    #[serde(rename = "useremail", default)]
    pub user_email: String,

    /// Login name of the bot account.
    #[serde(rename = "username", default)]
    pub user_name: String,

    #[serde(rename = "userpassword", default)]
    pub user_password: String,

    #[serde(rename = "userfirstname", default)]
    pub user_first_name: String,

    #[serde(rename = "userlastname", default)]
    pub user_last_name: String,

    /// Team the bot operates in.
    #[serde(rename = "teamname", default)]
    pub team_name: String,

    /// Directory module references are resolved against.
    #[serde(default = "default_plugins_directory")]
    pub plugins_directory: PathBuf,

    /// Plugins to load, in order.
    #[serde(default)]
    pub plugins: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            ws_url: String::new(),
            listen: default_listen(),
            bot_name: default_bot_name(),
            user_email: String::new(),
            user_name: String::new(),
            user_password: String::new(),
            user_first_name: String::new(),
            user_last_name: String::new(),
            team_name: String::new(),
            plugins_directory: default_plugins_directory(),
            plugins: Vec::new(),
        }
    }
}

fn default_listen() -> String {
    ":8080".to_string()
}

fn default_bot_name() -> String {
    "mbot".to_string()
}

fn default_plugins_directory() -> PathBuf {
    PathBuf::from("plugins")
}

// =============================================================================
// Channels
// =============================================================================

/// Names of the fixed channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Debug channel; milestones are mirrored here.
    #[serde(default = "default_log_channel")]
    pub log: String,

    #[serde(default = "default_main_channel")]
    pub main: String,

    #[serde(default = "default_status_channel")]
    pub status: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            log: default_log_channel(),
            main: default_main_channel(),
            status: default_status_channel(),
        }
    }
}

fn default_log_channel() -> String {
    "bot-debug".to_string()
}

fn default_main_channel() -> String {
    "town-square".to_string()
}

fn default_status_channel() -> String {
    "bot-status".to_string()
}

// =============================================================================
// Dispatch
// =============================================================================

/// Entry-point isolation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Abandon an entry-point call after this many seconds. Unset means
    /// calls may run indefinitely.
    #[serde(default)]
    pub call_timeout_secs: Option<u64>,
}

impl DispatchConfig {
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file for `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Per-module levels, e.g. `mbot_core = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,

    /// Include thread ids in log lines.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line of the call site.
    #[serde(default)]
    pub file_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file_path: None,
            filters: HashMap::new(),
            thread_ids: false,
            file_location: false,
        }
    }
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!(
                "invalid log level '{other}', expected one of: trace, debug, info, warn, error"
            )),
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbot_core::Role;

    #[test]
    fn test_plugin_sections_are_flattened() {
        let config: BotConfig = serde_json::from_value(serde_json::json!({
            "general": { "plugins": ["weather.so", "faq", "quiet"] },
            "weather": { "watcher": "OnPost", "channels": ["alerts"] },
            "faq": { "help_handler": "Help" },
        }))
        .unwrap();

        let descs = config.descriptors();
        assert_eq!(descs.len(), 3);

        assert_eq!(descs[0].name, "weather.so");
        assert_eq!(descs[0].entry_point(Role::Watcher), Some("OnPost"));
        assert_eq!(descs[0].channels, vec!["alerts".to_string()]);

        assert_eq!(descs[1].entry_point(Role::HelpHandler), Some("Help"));

        assert_eq!(descs[2].name, "quiet");
        assert!(descs[2].is_inert());
    }

    #[test]
    fn test_general_keys() {
        let config: BotConfig = serde_json::from_value(serde_json::json!({
            "general": {
                "mattermost": "https://chat.example.com",
                "wsurl": "wss://chat.example.com",
                "botname": "helper",
                "teamname": "ops",
            },
        }))
        .unwrap();
        assert_eq!(config.general.server_url, "https://chat.example.com");
        assert_eq!(config.general.ws_url, "wss://chat.example.com");
        assert_eq!(config.general.bot_name, "helper");
        assert_eq!(config.general.team_name, "ops");
        assert_eq!(config.general.listen, ":8080");
        assert_eq!(config.channel.main, "town-square");
        assert!(config.plugins.is_empty());
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("DEBUG".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Error.to_tracing_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_call_timeout() {
        let dispatch = DispatchConfig {
            call_timeout_secs: Some(5),
        };
        assert_eq!(dispatch.call_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(DispatchConfig::default().call_timeout(), None);
    }
}
