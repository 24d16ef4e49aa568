//! Configuration module for the mbot runtime.
//!
//! This module provides TOML-based configuration loading and validation
//! for the server connection, the bot account, the fixed channels and the
//! plugin sections.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BotConfig, ChannelConfig, DispatchConfig, GeneralConfig, LogFormat, LogLevel, LogOutput,
    LoggingConfig,
};
pub use validation::validate_config;
