//! The `mbot` binary.
//!
//! ```bash
//! mbot --config config/bot.toml
//! mbot --log-level debug
//! mbot --list-modules
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mbot_core::ModuleCatalog;
use mbot_runtime::config::{LogLevel, load_config_from_file};
use mbot_runtime::{BotRuntime, LoggingBuilder};
use tracing::info;

// Compiled-in modules. Referencing the crates keeps their registrations in
// the final binary.
use mbot_plugin_faq as _;

/// Mattermost chat host with compiled-in plugins.
#[derive(Debug, Parser)]
#[command(name = "mbot", version, about)]
struct Args {
    /// Configuration file.
    #[arg(short, long, default_value = "config/bot.toml")]
    config: PathBuf,

    /// Overrides `logging.level` (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<LogLevel>,

    /// Prints the names of the compiled-in modules and exits.
    #[arg(long)]
    list_modules: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_modules {
        for name in ModuleCatalog::linked().names() {
            println!("{name}");
        }
        return Ok(());
    }

    let mut config = load_config_from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    LoggingBuilder::from_config(&config.logging).init();

    info!(
        config = %args.config.display(),
        plugins = config.general.plugins.len(),
        "Starting mbot"
    );

    BotRuntime::new(config).run().await?;
    Ok(())
}
