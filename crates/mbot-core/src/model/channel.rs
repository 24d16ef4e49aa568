use serde::{Deserialize, Serialize};

/// Visibility of a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelType {
    /// Public channel.
    #[default]
    #[serde(rename = "O")]
    Open,
    /// Private channel.
    #[serde(rename = "P")]
    Private,
    /// Direct message between two users.
    #[serde(rename = "D")]
    Direct,
    /// Group message.
    #[serde(rename = "G")]
    Group,
}

/// A named conversation on the remote server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Channel {
    pub id: String,
    pub team_id: String,
    pub name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
}

/// The three fixed channels every module is told about through `SetChannels`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelIds {
    pub main: String,
    pub status: String,
    pub debug: String,
}

/// A user account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// A team.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub display_name: String,
}
