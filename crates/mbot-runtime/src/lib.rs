//! mbot Runtime - startup and shutdown orchestration for the mbot host.
//!
//! This crate provides:
//! - Configuration loading and validation ([`config`])
//! - Logging setup ([`logging`])
//! - The startup sequence and the running host ([`BotRuntime`], [`RunningBot`])
//!
//! # Collaborators
//!
//! The runtime talks to the server through the seams of `mbot-core`. By
//! default it builds them from `mbot-transport` according to the enabled
//! cargo features:
//!
//! - `http-client` (default): REST client
//! - `ws-client` (default): websocket event source
//!
//! Both, and the module source, can be injected instead:
//!
//! ```ignore
//! use std::sync::Arc;
//! use mbot_core::{BroadcastEventSource, ModuleCatalog};
//! use mbot_runtime::BotRuntime;
//!
//! let running = BotRuntime::new(config)
//!     .with_event_source(Arc::new(BroadcastEventSource::new()))
//!     .with_modules(Arc::new(ModuleCatalog::linked()))
//!     .start()
//!     .await?;
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{BotConfig, ConfigError, ConfigLoader, ConfigResult};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use runtime::{BotRuntime, PluginLoadState, RunningBot, wait_for_shutdown};

// Re-export tracing for use by other crates
pub use tracing;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
