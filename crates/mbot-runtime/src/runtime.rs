//! Startup and shutdown orchestration.
//!
//! # Startup
//!
//! 1. Ping the server, log in, fix up the bot profile, find the team.
//! 2. Resolve the debug channel and announce the start there, then the
//!    main and status channels. Any failure up to here is fatal.
//! 3. Load every listed plugin and bind its roles. A failing plugin is
//!    reported and skipped.
//! 4. Freeze the help registry, open one subscription per stream role and
//!    start the HTTP listener if any route was bound.
//!
//! ```rust,ignore
//! use mbot_runtime::{BotRuntime, config::load_config_from_file};
//!
//! let config = load_config_from_file("config/bot.toml")?;
//! BotRuntime::new(config).run().await?;
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use mbot_core::{
    Activation, BotContext, CallGuard, Channel, ChannelDirectory, EventSource, FixedChannels,
    HttpRouter, LoadedPlugin, Loader, ModuleCatalog, ModuleSource, NewPost, RemoteApi, Role,
    RoleBinder, User,
};

use crate::config::{BotConfig, GeneralConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};

/// Outcome of loading one listed plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginLoadState {
    /// Loaded; `roles` are the roles that were bound.
    Active { name: String, roles: Vec<Role> },
    /// Not loaded.
    Skipped { name: String, reason: String },
}

impl PluginLoadState {
    pub fn name(&self) -> &str {
        match self {
            Self::Active { name, .. } | Self::Skipped { name, .. } => name,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }
}

/// The host, configured but not yet connected.
///
/// Collaborators default to the Mattermost REST client, the websocket event
/// source and the modules linked into the binary. Each can be replaced
/// before [`start`](Self::start).
pub struct BotRuntime {
    config: BotConfig,
    api: Option<Arc<dyn RemoteApi>>,
    events: Option<Arc<dyn EventSource>>,
    modules: Option<Arc<dyn ModuleSource>>,
}

impl BotRuntime {
    pub fn new(config: BotConfig) -> Self {
        Self {
            config,
            api: None,
            events: None,
            modules: None,
        }
    }

    /// Uses `api` instead of the REST client.
    pub fn with_api(mut self, api: Arc<dyn RemoteApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Uses `events` instead of the websocket event source.
    pub fn with_event_source(mut self, events: Arc<dyn EventSource>) -> Self {
        self.events = Some(events);
        self
    }

    /// Uses `modules` instead of the linked module catalog.
    pub fn with_modules(mut self, modules: Arc<dyn ModuleSource>) -> Self {
        self.modules = Some(modules);
        self
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// Runs until Ctrl+C or SIGTERM, then shuts down.
    pub async fn run(self) -> RuntimeResult<()> {
        let running = self.start().await?;
        info!("mbot is now running. Press Ctrl+C to stop.");
        running.run_until(wait_for_shutdown()).await;
        Ok(())
    }

    /// Connects, loads every plugin and activates dispatch.
    pub async fn start(self) -> RuntimeResult<RunningBot> {
        validate_config(&self.config)?;
        let Self {
            config,
            api,
            events,
            modules,
        } = self;
        let general = &config.general;

        let api = match api {
            Some(api) => api,
            None => default_api(general)?,
        };

        info!(server = %general.server_url, user = %general.user_name, listen = %general.listen, "Starting mbot");
        api.ping().await.map_err(RuntimeError::ServerUnreachable)?;

        let user = api
            .login(&general.user_name, &general.user_password)
            .await
            .map_err(|source| RuntimeError::Login {
                user: general.user_name.clone(),
                source,
            })?;
        let user = update_profile_if_needed(&*api, user, general).await;

        let team = api
            .team_by_name(&general.team_name)
            .await
            .map_err(|source| RuntimeError::Team {
                team: general.team_name.clone(),
                source,
            })?;
        info!(team = %team.name, team_id = %team.id, "Team found");

        let directory = ChannelDirectory::new(Arc::clone(&api), &team.id, &user.id);
        let debug_channel = resolve_fixed(&directory, "log", &config.channel.log).await?;
        announce(&*api, &debug_channel, &format!("_{} has **started** running_", general.bot_name)).await;
        let main = resolve_fixed(&directory, "main", &config.channel.main).await?;
        let status = resolve_fixed(&directory, "status", &config.channel.status).await?;

        let bot = BotContext::new(
            Arc::clone(&api),
            user,
            team,
            &general.bot_name,
            FixedChannels {
                debug: debug_channel,
                main,
                status,
            },
        );

        let events = match events {
            Some(events) => events,
            None => default_event_source(general, Arc::clone(&api))?,
        };
        let modules = modules.unwrap_or_else(|| Arc::new(ModuleCatalog::linked()));

        // Load phase
        let guard = CallGuard::new(config.dispatch.call_timeout());
        let http = Arc::new(HttpRouter::new(guard));
        let mut loader = Loader::new(modules, &general.plugins_directory, guard);
        let mut binder = RoleBinder::new(bot.clone(), guard, Arc::clone(&http));
        let mut loaded = Vec::new();
        let mut states = Vec::new();

        for desc in config.descriptors() {
            let name = desc.name.clone();
            match loader.load(desc, &bot, &directory).await {
                Ok(plugin) => {
                    let (roles, refused) = binder.bind(&plugin).await;
                    for e in &refused {
                        bot.notify_debug(&format!("Skipping role of plugin {name}: {e}"))
                            .await;
                    }
                    states.push(PluginLoadState::Active { name, roles });
                    loaded.push(plugin);
                }
                Err(e) => {
                    error!(plugin = %name, error = %e, "Plugin skipped");
                    bot.notify_debug(&format!("Skipping plugin {name}: {e}")).await;
                    states.push(PluginLoadState::Skipped {
                        name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        // Activation phase
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let activation = binder.activate(&*events, &mut tasks, &cancel).await;
        for (plugin, role, e) in &activation.failed {
            bot.notify_debug(&format!("Role {role} of plugin {plugin} is inactive: {e}"))
                .await;
        }
        let http_addr = http
            .start(&general.listen, &mut tasks, cancel.child_token())
            .await?;

        info!(
            loaded = loaded.len(),
            skipped = states.iter().filter(|s| !s.is_active()).count(),
            "Initialization complete"
        );

        Ok(RunningBot {
            bot,
            activation,
            states,
            http_addr,
            tasks,
            cancel,
            _plugins: loaded,
            _loader: loader,
        })
    }
}

impl std::fmt::Debug for BotRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotRuntime")
            .field("server", &self.config.general.server_url)
            .field("plugins", &self.config.general.plugins)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// RunningBot
// =============================================================================

/// A started host. Dropping it aborts all role tasks without the stop
/// notice; call [`shutdown`](Self::shutdown) instead.
pub struct RunningBot {
    bot: BotContext,
    activation: Activation,
    states: Vec<PluginLoadState>,
    http_addr: Option<SocketAddr>,
    tasks: JoinSet<()>,
    cancel: CancellationToken,
    // Module handles stay alive for the lifetime of the host.
    _plugins: Vec<LoadedPlugin>,
    _loader: Loader,
}

impl RunningBot {
    pub fn bot(&self) -> &BotContext {
        &self.bot
    }

    /// Load outcome of every listed plugin, in list order.
    pub fn plugins(&self) -> &[PluginLoadState] {
        &self.states
    }

    pub fn plugin(&self, name: &str) -> Option<&PluginLoadState> {
        self.states.iter().find(|s| s.name() == name)
    }

    pub fn activation(&self) -> &Activation {
        &self.activation
    }

    /// Address of the HTTP listener, if one was started.
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    /// Runs until `shutdown` resolves, then shuts down.
    ///
    /// Roles whose event stream ends stay down; each logs its own end and
    /// the host keeps running.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        shutdown.await;
        self.shutdown().await;
    }

    /// Stops every role and the HTTP listener, waits for them and posts the
    /// stop notice.
    pub async fn shutdown(mut self) {
        info!("Stopping mbot");
        self.cancel.cancel();
        drain(&mut self.tasks).await;
        self.bot
            .notify_debug(&format!("_{} has **stopped** running_", self.bot.name()))
            .await;
        info!("mbot stopped");
    }
}

impl std::fmt::Debug for RunningBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningBot")
            .field("bot", &self.bot)
            .field("plugins", &self.states)
            .field("http_addr", &self.http_addr)
            .finish_non_exhaustive()
    }
}

async fn drain(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result
            && e.is_panic()
        {
            error!(error = %e, "Dispatch task panicked");
        }
    }
}

// =============================================================================
// Bootstrap helpers
// =============================================================================

#[cfg(feature = "http-client")]
fn default_api(general: &GeneralConfig) -> RuntimeResult<Arc<dyn RemoteApi>> {
    let client = mbot_transport::MattermostClient::new(&general.server_url)
        .map_err(RuntimeError::ServerUnreachable)?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "http-client"))]
fn default_api(_general: &GeneralConfig) -> RuntimeResult<Arc<dyn RemoteApi>> {
    Err(RuntimeError::MissingCollaborator("remote API client"))
}

#[cfg(feature = "ws-client")]
fn default_event_source(
    general: &GeneralConfig,
    api: Arc<dyn RemoteApi>,
) -> RuntimeResult<Arc<dyn EventSource>> {
    Ok(Arc::new(mbot_transport::WsEventSource::new(
        &general.ws_url,
        api,
    )))
}

#[cfg(not(feature = "ws-client"))]
fn default_event_source(
    _general: &GeneralConfig,
    _api: Arc<dyn RemoteApi>,
) -> RuntimeResult<Arc<dyn EventSource>> {
    Err(RuntimeError::MissingCollaborator("event source"))
}

/// Brings the bot's profile in line with the configuration. A failed
/// update is logged and the profile is used as is.
async fn update_profile_if_needed(api: &dyn RemoteApi, user: User, general: &GeneralConfig) -> User {
    let mut wanted = user.clone();
    wanted.username.clone_from(&general.user_name);
    wanted.first_name.clone_from(&general.user_first_name);
    wanted.last_name.clone_from(&general.user_last_name);
    if !general.user_email.is_empty() {
        wanted.email.clone_from(&general.user_email);
    }

    if wanted == user {
        debug!(user = %user.username, "Bot profile is up to date");
        return user;
    }

    match api.update_user(&wanted).await {
        Ok(updated) => {
            info!(user = %updated.username, "Bot profile updated");
            updated
        }
        Err(e) => {
            warn!(error = %e, "Failed to update bot profile");
            user
        }
    }
}

async fn resolve_fixed(
    directory: &ChannelDirectory,
    role: &'static str,
    name: &str,
) -> RuntimeResult<Arc<Channel>> {
    directory
        .resolve(name)
        .await
        .map_err(|source| RuntimeError::FixedChannel { role, source })
}

/// Posts to `channel` before the bot context exists.
async fn announce(api: &dyn RemoteApi, channel: &Channel, message: &str) {
    if let Err(e) = api.create_post(&NewPost::new(&channel.id, message)).await {
        warn!(error = %e, "Failed to send message to debug channel");
    }
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                if signal::ctrl_c().await.is_ok() {
                    info!("Received Ctrl+C, shutting down");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        info!("Received Ctrl+C, shutting down");
    }
}
