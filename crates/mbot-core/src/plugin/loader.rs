//! Plugin loader.
//!
//! Turns a [`PluginDescriptor`] plus a module into a [`LoadedPlugin`]. The
//! mandatory contract is enforced here; a violation skips the plugin with a
//! [`LoadError`]. Optional roles are bound one by one and a failure only
//! drops that role.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::descriptor::{PluginDescriptor, Role};
use super::entry::{EntryPoint, EntryShape, EventFn, HelpFn, HttpFn};
use super::module::{Module, ModuleHandle, ModuleSource};
use super::{LOAD_CONFIG, SET_CHANNELS};
use crate::channels::ChannelDirectory;
use crate::context::BotContext;
use crate::dispatch::{CallGuard, CallOutcome, CallSite};
use crate::error::{BindError, LoadError, LoadResult};
use crate::model::Channel;

/// An entry point bound to a role.
#[derive(Clone)]
pub struct BoundRole<F> {
    /// Symbol the entry point was exported under.
    pub symbol: String,
    pub entry: F,
}

impl<F> std::fmt::Debug for BoundRole<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundRole")
            .field("symbol", &self.symbol)
            .finish_non_exhaustive()
    }
}

/// A plugin whose mandatory entry points ran successfully.
pub struct LoadedPlugin {
    pub descriptor: PluginDescriptor,
    pub module: ModuleHandle,
    /// Per-plugin channels that resolved. Failed ones are absent.
    pub channels: Vec<Arc<Channel>>,
    pub handler: Option<BoundRole<HttpFn>>,
    pub watcher: Option<BoundRole<EventFn>>,
    pub mention: Option<BoundRole<EventFn>>,
    pub help: Option<BoundRole<HelpFn>>,
    /// Declared roles that could not be bound.
    pub bind_errors: Vec<BindError>,
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("name", &self.descriptor.name)
            .field("module", &self.module.name())
            .field("roles", &self.bound_roles())
            .field("channels", &self.channels.len())
            .finish_non_exhaustive()
    }
}

impl LoadedPlugin {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Roles with a bound entry point.
    pub fn bound_roles(&self) -> Vec<Role> {
        let mut roles = Vec::new();
        if self.handler.is_some() {
            roles.push(Role::Handler);
        }
        if self.watcher.is_some() {
            roles.push(Role::Watcher);
        }
        if self.mention.is_some() {
            roles.push(Role::MentionHandler);
        }
        if self.help.is_some() {
            roles.push(Role::HelpHandler);
        }
        roles
    }

    pub fn channel(&self, name: &str) -> Option<&Arc<Channel>> {
        self.channels.iter().find(|c| c.name == name)
    }
}

/// Loads plugins from a [`ModuleSource`].
///
/// Module handles are kept until the loader is dropped, which the runtime
/// only does at process exit.
pub struct Loader {
    source: Arc<dyn ModuleSource>,
    search_dir: PathBuf,
    guard: CallGuard,
    loaded: HashSet<String>,
    handles: Vec<ModuleHandle>,
}

impl Loader {
    pub fn new(source: Arc<dyn ModuleSource>, search_dir: impl Into<PathBuf>, guard: CallGuard) -> Self {
        Self {
            source,
            search_dir: search_dir.into(),
            guard,
            loaded: HashSet::new(),
            handles: Vec::new(),
        }
    }

    /// Reference under which the module of `name` is opened.
    pub fn module_path(&self, name: &str) -> PathBuf {
        self.search_dir.join(name)
    }

    /// Number of plugins loaded so far.
    pub fn loaded_count(&self) -> usize {
        self.handles.len()
    }

    /// Loads one plugin.
    ///
    /// Order: open the module, check `SetChannels`, run `LoadConfig` if a
    /// config file is declared, run `SetChannels` with the fixed channel
    /// ids, resolve the plugin's own channels, bind the optional roles.
    pub async fn load(
        &mut self,
        desc: PluginDescriptor,
        bot: &BotContext,
        directory: &ChannelDirectory,
    ) -> LoadResult<LoadedPlugin> {
        let name = desc.name.clone();
        if self.loaded.contains(&name) {
            return Err(LoadError::Duplicate(name));
        }

        let path = self.module_path(&name);
        let module = self.source.open(&path)?;
        info!(plugin = %name, path = %path.display(), "Plugin module opened");
        bot.notify_debug(&format!("Loaded plugin: {name}")).await;

        let set_channels = require(&*module, &name, SET_CHANNELS, EntryShape::SetChannels, |e| {
            match e {
                EntryPoint::SetChannels(f) => Some(f),
                _ => None,
            }
        })?;

        if let Some(config_path) = desc.config_path() {
            self.load_config(&*module, &name, config_path, bot).await?;
        }

        let ids = bot.channels().ids();
        let site = CallSite::new(&name, "set_channels", SET_CHANNELS);
        if let CallOutcome::Panicked(message) = self
            .guard
            .run_sync(site, || set_channels(&ids.main, &ids.status, &ids.debug))
        {
            return Err(LoadError::Panicked {
                module: name,
                symbol: SET_CHANNELS,
                message,
            });
        }

        let channels = resolve_channels(&desc, directory).await;

        desc.warn_inconsistencies();
        let mut bind_errors = Vec::new();
        let mut bind = |role: Role| match bind_role(&*module, &desc, role) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(plugin = %name, role = %role, error = %e, "Role skipped");
                bind_errors.push(e);
                None
            }
        };

        let handler = bind(Role::Handler).and_then(|(symbol, e)| match e {
            EntryPoint::Http(entry) => Some(BoundRole { symbol, entry }),
            _ => None,
        });
        let watcher = bind(Role::Watcher).and_then(|(symbol, e)| match e {
            EntryPoint::Event(entry) => Some(BoundRole { symbol, entry }),
            _ => None,
        });
        let mention = bind(Role::MentionHandler).and_then(|(symbol, e)| match e {
            EntryPoint::Event(entry) => Some(BoundRole { symbol, entry }),
            _ => None,
        });
        let help = bind(Role::HelpHandler).and_then(|(symbol, e)| match e {
            EntryPoint::Help(entry) => Some(BoundRole { symbol, entry }),
            _ => None,
        });

        for e in &bind_errors {
            bot.notify_debug(&format!("Skipping role of plugin {name}: {e}")).await;
        }

        self.loaded.insert(name.clone());
        self.handles.push(Arc::clone(&module));

        let plugin = LoadedPlugin {
            descriptor: desc,
            module,
            channels,
            handler,
            watcher,
            mention,
            help,
            bind_errors,
        };
        info!(plugin = %name, roles = ?plugin.bound_roles(), "Plugin loaded");
        Ok(plugin)
    }

    async fn load_config(
        &self,
        module: &dyn Module,
        name: &str,
        config_path: &Path,
        bot: &BotContext,
    ) -> LoadResult<()> {
        let load_config = require(module, name, LOAD_CONFIG, EntryShape::LoadConfig, |e| match e {
            EntryPoint::LoadConfig(f) => Some(f),
            _ => None,
        })?;

        bot.notify_debug(&format!(
            "Loading configuration file '{}' for plugin: {name}",
            config_path.display()
        ))
        .await;

        let site = CallSite::new(name, "load_config", LOAD_CONFIG);
        match self.guard.run_sync(site, || load_config(config_path)) {
            CallOutcome::Completed(Ok(())) => {
                debug!(plugin = %name, path = %config_path.display(), "Plugin configuration loaded");
                Ok(())
            }
            CallOutcome::Completed(Err(e)) => Err(LoadError::Config {
                module: name.to_string(),
                path: config_path.display().to_string(),
                reason: e.to_string(),
            }),
            CallOutcome::Panicked(message) => Err(LoadError::Panicked {
                module: name.to_string(),
                symbol: LOAD_CONFIG,
                message,
            }),
            // Synchronous calls never time out.
            CallOutcome::TimedOut(_) => Ok(()),
        }
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("search_dir", &self.search_dir)
            .field("loaded", &self.loaded)
            .finish_non_exhaustive()
    }
}

/// Looks up a mandatory entry point and checks its shape.
fn require<F>(
    module: &dyn Module,
    plugin: &str,
    symbol: &'static str,
    expected: EntryShape,
    extract: impl FnOnce(EntryPoint) -> Option<F>,
) -> LoadResult<F> {
    let entry = module.lookup(symbol).ok_or_else(|| LoadError::MissingEntryPoint {
        module: plugin.to_string(),
        symbol,
    })?;
    let found = entry.shape();
    extract(entry).ok_or_else(|| LoadError::ShapeMismatch {
        module: plugin.to_string(),
        symbol,
        expected,
        found,
    })
}

/// Resolves the entry point of an optional role. `Ok(None)` if the role is
/// not declared.
fn bind_role(
    module: &dyn Module,
    desc: &PluginDescriptor,
    role: Role,
) -> Result<Option<(String, EntryPoint)>, BindError> {
    let Some(symbol) = desc.entry_point(role) else {
        return Ok(None);
    };

    let entry = module.lookup(symbol).ok_or_else(|| BindError::MissingEntryPoint {
        plugin: desc.name.clone(),
        role,
        symbol: symbol.to_string(),
    })?;

    let expected = role.expected_shape();
    if entry.shape() != expected {
        return Err(BindError::ShapeMismatch {
            plugin: desc.name.clone(),
            role,
            symbol: symbol.to_string(),
            expected,
            found: entry.shape(),
        });
    }

    debug!(plugin = %desc.name, role = %role, symbol = %symbol, "Role entry point resolved");
    Ok(Some((symbol.to_string(), entry)))
}

async fn resolve_channels(desc: &PluginDescriptor, directory: &ChannelDirectory) -> Vec<Arc<Channel>> {
    let mut channels = Vec::with_capacity(desc.channels.len());
    for channel_name in &desc.channels {
        match directory.resolve(channel_name).await {
            Ok(channel) => channels.push(channel),
            Err(e) => error!(
                plugin = %desc.name,
                channel = %channel_name,
                error = %e,
                "Plugin channel unavailable"
            ),
        }
    }
    channels
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::plugin::{ModuleCatalog, StaticModule};
    use crate::testing::MockApi;

    struct Fixture {
        api: Arc<MockApi>,
        bot: BotContext,
        directory: ChannelDirectory,
    }

    async fn fixture() -> Fixture {
        let api = Arc::new(MockApi::new());
        let bot = api.bot_context().await;
        let directory = ChannelDirectory::new(api.clone(), MockApi::TEAM_ID, MockApi::BOT_ID);
        Fixture { api, bot, directory }
    }

    fn loader(catalog: ModuleCatalog) -> Loader {
        Loader::new(Arc::new(catalog), "plugins/", CallGuard::default())
    }

    fn recording_module(name: &str, calls: Arc<Mutex<Vec<String>>>) -> StaticModule {
        let on_channels = Arc::clone(&calls);
        let on_config = calls;
        StaticModule::new(name)
            .export(
                "SetChannels",
                EntryPoint::set_channels(move |main, status, debug| {
                    on_channels
                        .lock()
                        .push(format!("SetChannels({main},{status},{debug})"));
                }),
            )
            .export(
                "LoadConfig",
                EntryPoint::load_config(move |path| {
                    on_config.lock().push(format!("LoadConfig({})", path.display()));
                    Ok(())
                }),
            )
            .export("OnPost", EntryPoint::event(|_, _, _| async { Ok(()) }))
            .export("Help", EntryPoint::help(|_, _, _| async { Ok(()) }))
    }

    #[tokio::test]
    async fn test_load_runs_config_before_channels() {
        let f = fixture().await;
        let calls = Arc::new(Mutex::new(Vec::new()));
        let catalog = ModuleCatalog::new().with_module("weather", recording_module("weather", calls.clone()));
        let mut loader = loader(catalog);

        let desc = PluginDescriptor::new("weather")
            .watcher("OnPost")
            .config_file("config/weather.toml")
            .channels(["alerts"]);
        let plugin = loader.load(desc, &f.bot, &f.directory).await.unwrap();

        let ids = f.bot.channels().ids();
        assert_eq!(
            *calls.lock(),
            vec![
                "LoadConfig(config/weather.toml)".to_string(),
                format!("SetChannels({},{},{})", ids.main, ids.status, ids.debug),
            ]
        );
        assert_eq!(plugin.bound_roles(), vec![Role::Watcher]);
        assert!(plugin.channel("alerts").is_some());
        let debug = format!("{plugin:?}");
        assert!(debug.starts_with("LoadedPlugin { name: \"weather\""));
        assert!(debug.contains("roles: [Watcher]"));
        assert_eq!(loader.loaded_count(), 1);

        let notices = f.api.messages_in(&f.bot.channels().debug.id);
        assert!(notices.contains(&"Loaded plugin: weather".to_string()));
        assert!(notices
            .iter()
            .any(|m| m.starts_with("Loading configuration file 'config/weather.toml'")));
    }

    #[tokio::test]
    async fn test_missing_set_channels_skips_plugin() {
        let f = fixture().await;
        let called = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&called);
        let module = StaticModule::new("nochan").export(
            "OnPost",
            EntryPoint::event(move |_, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            }),
        );
        let mut loader = loader(ModuleCatalog::new().with_module("nochan", module));

        let err = loader
            .load(PluginDescriptor::new("nochan").watcher("OnPost"), &f.bot, &f.directory)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LoadError::MissingEntryPoint { symbol: SET_CHANNELS, .. }
        ));
        assert_eq!(loader.loaded_count(), 0);
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_declared_config_requires_load_config() {
        let f = fixture().await;
        let module = StaticModule::new("p").export("SetChannels", EntryPoint::set_channels(|_, _, _| {}));
        let mut loader = loader(ModuleCatalog::new().with_module("p", module));

        let err = loader
            .load(PluginDescriptor::new("p").config_file("p.toml"), &f.bot, &f.directory)
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::MissingEntryPoint { symbol: LOAD_CONFIG, .. }));
    }

    #[tokio::test]
    async fn test_failing_load_config_skips_plugin() {
        let f = fixture().await;
        let module = StaticModule::new("p")
            .export("SetChannels", EntryPoint::set_channels(|_, _, _| {}))
            .export("LoadConfig", EntryPoint::load_config(|_| Err("bad toml".into())));
        let mut loader = loader(ModuleCatalog::new().with_module("p", module));

        let err = loader
            .load(PluginDescriptor::new("p").config_file("p.toml"), &f.bot, &f.directory)
            .await
            .unwrap_err();
        match err {
            LoadError::Config { reason, .. } => assert_eq!(reason, "bad toml"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_mandatory_shape_mismatch() {
        let f = fixture().await;
        let module = StaticModule::new("p").export("SetChannels", EntryPoint::load_config(|_| Ok(())));
        let mut loader = loader(ModuleCatalog::new().with_module("p", module));

        let err = loader
            .load(PluginDescriptor::new("p"), &f.bot, &f.directory)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LoadError::ShapeMismatch {
                expected: EntryShape::SetChannels,
                found: EntryShape::LoadConfig,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_panicking_set_channels_skips_plugin() {
        let f = fixture().await;
        let module = StaticModule::new("p")
            .export("SetChannels", EntryPoint::set_channels(|_, _, _| panic!("no channels")));
        let mut loader = loader(ModuleCatalog::new().with_module("p", module));

        let err = loader
            .load(PluginDescriptor::new("p"), &f.bot, &f.directory)
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Panicked { symbol: SET_CHANNELS, .. }));
    }

    #[tokio::test]
    async fn test_bad_optional_role_only_skips_that_role() {
        let f = fixture().await;
        let calls = Arc::new(Mutex::new(Vec::new()));
        let catalog = ModuleCatalog::new().with_module("p", recording_module("p", calls));
        let mut loader = loader(catalog);

        let desc = PluginDescriptor::new("p")
            .watcher("Missing")
            .mention_handler("Help")
            .help_handler("Help");
        let plugin = loader.load(desc, &f.bot, &f.directory).await.unwrap();

        assert_eq!(plugin.bound_roles(), vec![Role::HelpHandler]);
        assert_eq!(plugin.bind_errors.len(), 2);
        assert!(plugin.bind_errors.iter().any(|e| matches!(
            e,
            BindError::MissingEntryPoint { role: Role::Watcher, .. }
        )));
        assert!(plugin.bind_errors.iter().any(|e| matches!(
            e,
            BindError::ShapeMismatch {
                role: Role::MentionHandler,
                expected: EntryShape::Event,
                found: EntryShape::Help,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_unopenable_module_and_duplicates() {
        let f = fixture().await;
        let calls = Arc::new(Mutex::new(Vec::new()));
        let catalog = ModuleCatalog::new().with_module("ok", recording_module("ok", calls));
        let mut loader = loader(catalog);

        let err = loader
            .load(PluginDescriptor::new("broken"), &f.bot, &f.directory)
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Open { .. }));

        loader.load(PluginDescriptor::new("ok"), &f.bot, &f.directory).await.unwrap();
        let err = loader
            .load(PluginDescriptor::new("ok"), &f.bot, &f.directory)
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Duplicate(ref n) if n == "ok"));
    }

    #[tokio::test]
    async fn test_unresolvable_plugin_channel_is_not_fatal() {
        let f = fixture().await;
        f.api.fail_channel_creation("forbidden");
        let calls = Arc::new(Mutex::new(Vec::new()));
        let catalog = ModuleCatalog::new().with_module("p", recording_module("p", calls));
        let mut loader = loader(catalog);

        let desc = PluginDescriptor::new("p").channels(["forbidden", "alerts"]);
        let plugin = loader.load(desc, &f.bot, &f.directory).await.unwrap();
        assert_eq!(plugin.channels.len(), 1);
        assert!(plugin.channel("forbidden").is_none());
        assert!(plugin.channel("alerts").is_some());
    }
}
