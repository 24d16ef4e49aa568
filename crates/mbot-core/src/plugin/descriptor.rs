//! Plugin descriptor: the per-plugin capability declaration.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::entry::EntryShape;

// ─── Role ─────────────────────────────────────────────────────────────────────

/// A dispatch role a plugin can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// HTTP request handling on the shared router.
    Handler,
    /// Every `posted` event on the stream.
    Watcher,
    /// `posted` events that mention the bot.
    MentionHandler,
    /// Help text for the help dispatcher.
    HelpHandler,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Handler,
        Role::Watcher,
        Role::MentionHandler,
        Role::HelpHandler,
    ];

    /// Configuration key naming the role's entry point.
    pub fn config_key(self) -> &'static str {
        match self {
            Self::Handler => "handler",
            Self::Watcher => "watcher",
            Self::MentionHandler => "mention_handler",
            Self::HelpHandler => "help_handler",
        }
    }

    /// Entry-point shape the role requires.
    pub fn expected_shape(self) -> EntryShape {
        match self {
            Self::Handler => EntryShape::Http,
            Self::Watcher | Self::MentionHandler => EntryShape::Event,
            Self::HelpHandler => EntryShape::Help,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

// ─── PluginDescriptor ─────────────────────────────────────────────────────────

/// Declared configuration of one plugin.
///
/// Deserialized from the plugin's configuration section:
///
/// ```toml
/// [weather]
/// watcher = "OnPost"
/// handler = "Forecast"
/// path_patterns = ["/weather/{city}"]
/// config_file = "config/weather.toml"
/// channels = ["alerts"]
/// ```
///
/// An empty entry-point name means the role is absent. A descriptor with no
/// role at all is legal: the plugin loads and stays inert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginDescriptor {
    /// Plugin name, unique within a run. Filled from the plugin list.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub handler: Option<String>,
    pub watcher: Option<String>,
    pub mention_handler: Option<String>,
    pub help_handler: Option<String>,
    /// URL path patterns for the Handler role.
    pub path_patterns: Vec<String>,
    /// File passed to the module's `LoadConfig`.
    pub config_file: Option<PathBuf>,
    /// Channels the plugin needs in addition to the fixed ones.
    pub channels: Vec<String>,
}

impl PluginDescriptor {
    /// Creates an inert descriptor.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn handler(mut self, symbol: impl Into<String>) -> Self {
        self.handler = Some(symbol.into());
        self
    }

    pub fn watcher(mut self, symbol: impl Into<String>) -> Self {
        self.watcher = Some(symbol.into());
        self
    }

    pub fn mention_handler(mut self, symbol: impl Into<String>) -> Self {
        self.mention_handler = Some(symbol.into());
        self
    }

    pub fn help_handler(mut self, symbol: impl Into<String>) -> Self {
        self.help_handler = Some(symbol.into());
        self
    }

    pub fn path_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn config_file(mut self, path: impl AsRef<Path>) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    /// Name users refer to the plugin by: the file stem of its reference,
    /// so `weather.so` is `weather`.
    pub fn short_name(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }

    /// Entry-point name declared for `role`, if the role is present.
    pub fn entry_point(&self, role: Role) -> Option<&str> {
        let symbol = match role {
            Role::Handler => &self.handler,
            Role::Watcher => &self.watcher,
            Role::MentionHandler => &self.mention_handler,
            Role::HelpHandler => &self.help_handler,
        };
        symbol.as_deref().filter(|s| !s.is_empty())
    }

    /// Roles with a declared entry point.
    pub fn declared_roles(&self) -> impl Iterator<Item = Role> + '_ {
        Role::ALL
            .into_iter()
            .filter(|role| self.entry_point(*role).is_some())
    }

    /// Returns `true` if no role is declared.
    pub fn is_inert(&self) -> bool {
        self.declared_roles().next().is_none()
    }

    /// The config file, if one is declared.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_file
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// Logs declarations that cannot take effect.
    ///
    /// Path patterns are meaningful only together with a handler, so either
    /// half without the other binds nothing.
    pub fn warn_inconsistencies(&self) {
        let has_handler = self.entry_point(Role::Handler).is_some();
        if has_handler && self.path_patterns.is_empty() {
            warn!(
                plugin = %self.name,
                "Handler declared without path_patterns, no route will be bound"
            );
        }
        if !has_handler && !self.path_patterns.is_empty() {
            warn!(
                plugin = %self.name,
                patterns = ?self.path_patterns,
                "path_patterns declared without a handler, ignored"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_entry_point_means_absent() {
        let desc = PluginDescriptor::new("p").watcher("").help_handler("Help");
        assert_eq!(desc.entry_point(Role::Watcher), None);
        assert_eq!(desc.entry_point(Role::HelpHandler), Some("Help"));
        assert_eq!(
            desc.declared_roles().collect::<Vec<_>>(),
            vec![Role::HelpHandler]
        );
    }

    #[test]
    fn test_inert_descriptor() {
        assert!(PluginDescriptor::new("quiet").is_inert());
        assert!(!PluginDescriptor::new("busy").watcher("OnPost").is_inert());
    }

    #[test]
    fn test_short_name_is_file_stem() {
        assert_eq!(PluginDescriptor::new("weather.so").short_name(), "weather");
        assert_eq!(PluginDescriptor::new("weather").short_name(), "weather");
    }

    #[test]
    fn test_deserialize_section() {
        let section = serde_json::json!({
            "handler": "Serve",
            "path_patterns": ["/a", "/b/{id}"],
            "config_file": "config/p.toml",
            "channels": ["alerts"],
        });
        let desc: PluginDescriptor = serde_json::from_value(section).unwrap();
        assert_eq!(desc.name, "");
        assert_eq!(desc.entry_point(Role::Handler), Some("Serve"));
        assert_eq!(desc.path_patterns.len(), 2);
        assert_eq!(desc.config_path(), Some(Path::new("config/p.toml")));
        assert_eq!(desc.channels, vec!["alerts".to_string()]);
        assert_eq!(desc.entry_point(Role::Watcher), None);
    }

    #[test]
    fn test_role_shapes() {
        assert_eq!(Role::Handler.expected_shape(), EntryShape::Http);
        assert_eq!(Role::Watcher.expected_shape(), EntryShape::Event);
        assert_eq!(Role::MentionHandler.expected_shape(), EntryShape::Event);
        assert_eq!(Role::HelpHandler.expected_shape(), EntryShape::Help);
        assert_eq!(Role::MentionHandler.to_string(), "mention_handler");
    }
}
