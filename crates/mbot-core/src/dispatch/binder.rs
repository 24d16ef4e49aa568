//! Binds loaded plugins to their event sources.
//!
//! Binding is two-phase. [`RoleBinder::bind`] runs once per loaded plugin
//! during the load phase: HTTP routes are registered, help entry points are
//! collected and stream roles are queued. [`RoleBinder::activate`] then
//! freezes the help registry and starts one task per stream role, each on a
//! subscription of its own.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::isolate::CallGuard;
use super::stream::{StreamRole, run_help_desk};
use crate::context::BotContext;
use crate::error::{BindError, TransportError};
use crate::help::HelpRegistry;
use crate::http::HttpRouter;
use crate::plugin::{BoundRole, EventFn, LoadedPlugin, Role};
use crate::source::EventSource;

struct PendingStream {
    plugin: String,
    role: Role,
    bound: BoundRole<EventFn>,
}

/// Result of [`RoleBinder::activate`].
#[derive(Debug)]
pub struct Activation {
    /// The frozen help registry shared by all mention roles.
    pub help: Arc<HelpRegistry>,
    /// Stream roles now running, as `(plugin, role)`.
    pub started: Vec<(String, Role)>,
    /// Stream roles whose subscription could not be opened.
    pub failed: Vec<(String, Role, TransportError)>,
}

impl Activation {
    /// Returns `true` if `plugin`'s `role` is running.
    pub fn is_running(&self, plugin: &str, role: Role) -> bool {
        self.started.iter().any(|(p, r)| p == plugin && *r == role)
    }
}

/// Collects role bindings while plugins load.
pub struct RoleBinder {
    bot: BotContext,
    guard: CallGuard,
    http: Arc<HttpRouter>,
    help: HelpRegistry,
    pending: Vec<PendingStream>,
}

impl RoleBinder {
    pub fn new(bot: BotContext, guard: CallGuard, http: Arc<HttpRouter>) -> Self {
        Self {
            bot,
            guard,
            http,
            help: HelpRegistry::new(guard),
            pending: Vec::new(),
        }
    }

    /// Binds every role `plugin` has an entry point for and reports the
    /// plugin as initialized.
    ///
    /// Returns the bound roles and the refused bindings. A Handler counts as
    /// bound when at least one of its patterns was accepted by the router;
    /// a refused pattern does not affect the plugin's other roles.
    pub async fn bind(&mut self, plugin: &LoadedPlugin) -> (Vec<Role>, Vec<BindError>) {
        let name = plugin.name();
        let mut roles = Vec::new();
        let mut errors = Vec::new();

        if let Some(handler) = &plugin.handler {
            let mut routed = 0;
            for pattern in &plugin.descriptor.path_patterns {
                self.bot
                    .notify_debug(&format!("Setting up routing for {pattern}"))
                    .await;
                match self
                    .http
                    .bind(name, &handler.symbol, pattern, Arc::clone(&handler.entry))
                {
                    Ok(()) => routed += 1,
                    Err(source) => {
                        let err = BindError::Http {
                            plugin: name.to_string(),
                            source,
                        };
                        warn!(plugin = %name, pattern = %pattern, error = %err, "Route skipped");
                        errors.push(err);
                    }
                }
            }
            if routed > 0 {
                roles.push(Role::Handler);
            }
        }

        if let Some(watcher) = &plugin.watcher {
            self.queue(name, Role::Watcher, watcher);
            roles.push(Role::Watcher);
        }

        if let Some(mention) = &plugin.mention {
            self.queue(name, Role::MentionHandler, mention);
            roles.push(Role::MentionHandler);
        }

        if let Some(help) = &plugin.help
            && self.help.register(plugin.descriptor.short_name(), help.clone())
        {
            roles.push(Role::HelpHandler);
        }

        if roles.is_empty() {
            info!(plugin = %name, "Plugin is inert, no role bound");
        }
        self.bot
            .notify_debug(&format!("Done initializing plugin: {name}"))
            .await;
        (roles, errors)
    }

    fn queue(&mut self, plugin: &str, role: Role, bound: &BoundRole<EventFn>) {
        self.pending.push(PendingStream {
            plugin: plugin.to_string(),
            role,
            bound: bound.clone(),
        });
    }

    /// The help registry as populated so far.
    pub fn help(&self) -> &HelpRegistry {
        &self.help
    }

    /// Number of stream roles waiting for activation.
    pub fn pending_streams(&self) -> usize {
        self.pending.len()
    }

    /// Freezes the help registry and starts every queued stream role.
    ///
    /// Each role gets its own subscription from `source`. A role whose
    /// subscription fails is reported and left inactive.
    ///
    /// Help requests are answered exactly once per event: by the first
    /// MentionHandler role that starts, or, when none does and help entry
    /// points exist, by a help desk on a subscription of its own.
    pub async fn activate(
        self,
        source: &dyn EventSource,
        tasks: &mut JoinSet<()>,
        cancel: &CancellationToken,
    ) -> Activation {
        let help = Arc::new(self.help);
        let mut started = Vec::new();
        let mut failed = Vec::new();
        let mut help_owned = false;

        for pending in self.pending {
            let subscription = match source.subscribe().await {
                Ok(subscription) => subscription,
                Err(e) => {
                    error!(plugin = %pending.plugin, role = %pending.role, error = %e, "Subscription failed, role inactive");
                    failed.push((pending.plugin, pending.role, e));
                    continue;
                }
            };

            let role = match pending.role {
                Role::MentionHandler => StreamRole::mention(
                    pending.plugin.clone(),
                    pending.bound,
                    self.bot.clone(),
                    self.guard,
                    (!help_owned).then(|| Arc::clone(&help)),
                ),
                _ => StreamRole::watcher(
                    pending.plugin.clone(),
                    pending.bound,
                    self.bot.clone(),
                    self.guard,
                ),
            };

            help_owned |= role.answers_help();
            let cancel = cancel.child_token();
            tasks.spawn(async move {
                role.run(subscription, cancel).await;
            });
            started.push((pending.plugin, pending.role));
        }

        if !help_owned && !help.is_empty() {
            match source.subscribe().await {
                Ok(subscription) => {
                    tasks.spawn(run_help_desk(
                        Arc::clone(&help),
                        self.bot.clone(),
                        subscription,
                        cancel.child_token(),
                    ));
                }
                Err(e) => error!(error = %e, "Subscription failed, help requests go unanswered"),
            }
        }

        info!(
            streams = started.len(),
            failed = failed.len(),
            help = help.len(),
            "Dispatch activated"
        );
        Activation {
            help,
            started,
            failed,
        }
    }
}

impl std::fmt::Debug for RoleBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleBinder")
            .field("help", &self.help)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}
