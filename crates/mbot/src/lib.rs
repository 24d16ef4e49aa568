//! # mbot
//!
//! A chat-bot host for Mattermost-compatible servers.
//!
//! ## Overview
//!
//! The host signs in as a bot account, joins a fixed set of channels and then
//! wires independently built modules into dispatch roles. A module exports
//! typed entry points; the configuration decides which of them serve which
//! role for which plugin.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────┐     ┌────────────────────────────────────┐
//! │   Runtime   │────▶│  Loader  │────▶│ Plugin "weather" (watcher, http)   │
//! │ (bootstrap) │     │          │────▶│ Plugin "faq" (help, mention)       │
//! └─────────────┘     └──────────┘     └────────────────────────────────────┘
//!        │                                   ▲           ▲          ▲
//!        ▼                                   │           │          │
//!  RemoteApi / EventSource ─────────▶  StreamRole   HelpRegistry  HttpRouter
//! ```
//!
//! - **Runtime**: configuration, logging, bootstrap and shutdown
//! - **Loader**: opens modules and resolves `LoadConfig` and `SetChannels`
//! - **Roles**: watcher, mention handler, help handler and HTTP handler
//! - **Transport**: REST client and websocket event source
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mbot::prelude::*;
//!
//! fn create() -> StaticModule {
//!     StaticModule::new("echo").export(
//!         "OnMention",
//!         EntryPoint::event(|_event, post, bot: BotContext| async move {
//!             bot.reply(&post, &post.message).await?;
//!             Ok(())
//!         }),
//!     )
//! }
//!
//! register_module!(ECHO, "echo", create);
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = mbot::runtime::config::load_config_from_file("config/bot.toml")?;
//!     BotRuntime::new(config).run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `json-log`: JSON log format
//! - `http-client`, `ws-client`: default transports (passed through to the runtime)

pub use mbot_core as core;
pub use mbot_runtime as runtime;
pub use mbot_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use mbot::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use mbot_runtime::{BotConfig, BotRuntime, LoggingBuilder, RunningBot};

    // Module authoring
    pub use mbot_core::prelude::*;

    // Plugin configuration
    pub use mbot_core::{PluginDescriptor, Role};
}
