//! FAQ module for mbot.
//!
//! Answers questions it is mentioned in from a table of keywords. The table
//! is read from the plugin's configuration file:
//!
//! ```toml
//! [answers]
//! vpn = "Use the `corp` profile, the config lives on the wiki."
//! "on call" = "See the #bot-status channel for today's rotation."
//! ```
//!
//! Wiring in `bot.toml`:
//!
//! ```toml
//! [faq]
//! mention_handler = "OnMention"
//! help_handler = "Help"
//! handler = "Entries"
//! path_patterns = ["/faq"]
//! config_file = "config/faq.toml"
//! ```
//!
//! | Export | Shape |
//! |--------|-------|
//! | `SetChannels` | set-channels |
//! | `LoadConfig` | load-config |
//! | `OnMention` | event |
//! | `Help` | help |
//! | `Entries` | http, JSON dump of the table |

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use figment::Figment;
use figment::providers::{Format, Toml};
use mbot_core::axum::Json;
use mbot_core::prelude::*;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Reply when no keyword matches.
pub const UNKNOWN_REPLY: &str = "Sorry, I have no answer for that. Ask me for `help faq`.";

/// Contents of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaqConfig {
    /// keyword → answer
    pub answers: BTreeMap<String, String>,
}

impl FaqConfig {
    /// Reads the table from a TOML file. Keywords are matched
    /// case-insensitively and stored lowercased.
    pub fn from_file(path: &Path) -> Result<Self, BoxError> {
        if !path.is_file() {
            return Err(format!("{} does not exist", path.display()).into());
        }
        let config: Self = Figment::from(Toml::file(path)).extract()?;
        Ok(Self {
            answers: config
                .answers
                .into_iter()
                .map(|(keyword, answer)| (keyword.trim().to_lowercase(), answer))
                .filter(|(keyword, _)| !keyword.is_empty())
                .collect(),
        })
    }

    /// Answer for the longest keyword contained in `question`.
    pub fn answer(&self, question: &str) -> Option<&str> {
        let question = question.to_lowercase();
        self.answers
            .iter()
            .filter(|(keyword, _)| question.contains(keyword.as_str()))
            .max_by_key(|(keyword, _)| keyword.len())
            .map(|(_, answer)| answer.as_str())
    }
}

/// State shared by the exports of one module instance.
#[derive(Debug, Default)]
pub struct Faq {
    config: RwLock<FaqConfig>,
    channels: RwLock<ChannelIds>,
}

impl Faq {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn config(&self) -> FaqConfig {
        self.config.read().clone()
    }

    pub fn channels(&self) -> ChannelIds {
        self.channels.read().clone()
    }

    fn load(&self, path: &Path) -> Result<(), BoxError> {
        let config = FaqConfig::from_file(path)?;
        info!(path = %path.display(), entries = config.answers.len(), "FAQ loaded");
        *self.config.write() = config;
        Ok(())
    }

    fn help_text(&self) -> String {
        let config = self.config.read();
        if config.answers.is_empty() {
            return "I don't know any answers yet.".to_string();
        }
        let mut text = String::from("Mention me with a question about:\n");
        for keyword in config.answers.keys() {
            text.push_str("- ");
            text.push_str(keyword);
            text.push('\n');
        }
        text
    }

    /// Builds the module exports around `self`.
    pub fn module(self: &Arc<Self>) -> StaticModule {
        let on_channels = Arc::clone(self);
        let on_config = Arc::clone(self);
        let on_mention = Arc::clone(self);
        let on_help = Arc::clone(self);
        let on_http = Arc::clone(self);

        StaticModule::new("faq")
            .export(
                "SetChannels",
                EntryPoint::set_channels(move |main, status, debug| {
                    *on_channels.channels.write() = ChannelIds {
                        main: main.to_string(),
                        status: status.to_string(),
                        debug: debug.to_string(),
                    };
                }),
            )
            .export(
                "LoadConfig",
                EntryPoint::load_config(move |path| on_config.load(path)),
            )
            .export(
                "OnMention",
                EntryPoint::event(move |_event, post: Post, bot: BotContext| {
                    let reply = on_mention
                        .config
                        .read()
                        .answer(&post.message)
                        .unwrap_or(UNKNOWN_REPLY)
                        .to_string();
                    async move {
                        debug!(post = %post.id, "Answering mention");
                        bot.reply(&post, &reply).await?;
                        Ok(())
                    }
                }),
            )
            .export(
                "Help",
                EntryPoint::help(move |user_id: String, _message, bot: BotContext| {
                    let text = on_help.help_text();
                    async move {
                        bot.send_direct(&user_id, &text).await?;
                        Ok(())
                    }
                }),
            )
            .export(
                "Entries",
                EntryPoint::http(move |_req: Request| {
                    let config = on_http.config();
                    async move { Json(config).into_response() }
                }),
            )
    }
}

fn create() -> StaticModule {
    Faq::new().module()
}

register_module!(FAQ_MODULE, "faq", create);
