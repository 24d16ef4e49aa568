//! Help registry.
//!
//! Populated while plugins load, then frozen behind an `Arc` before any
//! stream role starts, so lookups after startup need no locking.

use std::collections::HashMap;

use tracing::{debug, error, warn};

use crate::context::BotContext;
use crate::dispatch::{CallGuard, CallOutcome, CallSite};
use crate::plugin::{BoundRole, HelpFn};

/// Which help reply a request produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelpOutcome {
    /// The named plugin's help entry point was invoked.
    Plugin(String),
    /// The generated default reply was sent.
    Default,
}

/// Plugin name → help entry point.
pub struct HelpRegistry {
    entries: HashMap<String, BoundRole<HelpFn>>,
    guard: CallGuard,
}

impl HelpRegistry {
    pub fn new(guard: CallGuard) -> Self {
        Self {
            entries: HashMap::new(),
            guard,
        }
    }

    /// Registers `plugin`'s help entry point. Returns `false` if the plugin
    /// already has one.
    pub fn register(&mut self, plugin: impl Into<String>, role: BoundRole<HelpFn>) -> bool {
        let plugin = plugin.into();
        if self.entries.contains_key(&plugin) {
            warn!(plugin = %plugin, "Help entry point already registered");
            return false;
        }
        debug!(plugin = %plugin, symbol = %role.symbol, "Help entry point registered");
        self.entries.insert(plugin, role);
        true
    }

    pub fn contains(&self, plugin: &str) -> bool {
        self.entries.contains_key(plugin)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered plugin names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Answers a help request from `user_id`.
    ///
    /// If `text` contains the name of a registered plugin, that plugin's help
    /// entry point is invoked and nothing else happens. When several names
    /// match, which one wins is unspecified. Otherwise the default reply is
    /// sent to the user as a direct message.
    pub async fn dispatch_help(&self, bot: &BotContext, user_id: &str, text: &str) -> HelpOutcome {
        let matched = self
            .entries
            .iter()
            .find(|(name, _)| text.contains(name.as_str()));

        if let Some((name, role)) = matched {
            let site = CallSite::new(name, "help_handler", &role.symbol);
            let entry = &role.entry;
            let outcome = self
                .guard
                .run(site, || entry(user_id.to_string(), text.to_string(), bot.clone()))
                .await;
            if let CallOutcome::Completed(Err(e)) = outcome {
                error!(plugin = %name, symbol = %role.symbol, error = %e, "Help entry point failed");
            }
            return HelpOutcome::Plugin(name.clone());
        }

        let reply = self.default_reply(bot);
        if let Err(e) = bot.send_direct(user_id, &reply).await {
            warn!(user_id = %user_id, error = %e, "Failed to send default help reply");
        }
        HelpOutcome::Default
    }

    /// The generated reply listing every plugin with help.
    pub fn default_reply(&self, bot: &BotContext) -> String {
        let mut reply = format!(
            "{} version {}\n\nPlugins with help:\n",
            bot.name(),
            bot.version()
        );
        for name in self.names() {
            reply.push_str(name);
            reply.push('\n');
        }
        reply
    }
}

impl std::fmt::Debug for HelpRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HelpRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::plugin::EntryPoint;
    use crate::testing::MockApi;

    type Calls = Arc<Mutex<Vec<(String, String)>>>;

    fn help_role(calls: &Calls) -> BoundRole<HelpFn> {
        let calls = Arc::clone(calls);
        let entry = EntryPoint::help(move |user_id, message, _bot| {
            calls.lock().push((user_id, message));
            async { Ok(()) }
        });
        match entry {
            EntryPoint::Help(entry) => BoundRole {
                symbol: "Help".to_string(),
                entry,
            },
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_matching_plugin_gets_the_request() {
        let api = Arc::new(MockApi::new());
        let bot = api.bot_context().await;
        let calls = Calls::default();

        let mut registry = HelpRegistry::new(CallGuard::default());
        assert!(registry.register("faq", help_role(&calls)));
        assert!(registry.register("weather", help_role(&Calls::default())));

        let outcome = registry.dispatch_help(&bot, "u1", "faq help me").await;
        assert_eq!(outcome, HelpOutcome::Plugin("faq".to_string()));
        assert_eq!(
            *calls.lock(),
            vec![("u1".to_string(), "faq help me".to_string())]
        );
        assert!(api.direct_messages_to("u1").is_empty());
    }

    #[tokio::test]
    async fn test_default_reply_lists_plugins() {
        let api = Arc::new(MockApi::new());
        let bot = api.bot_context().await;
        let calls = Calls::default();

        let mut registry = HelpRegistry::new(CallGuard::default());
        registry.register("weather", help_role(&calls));
        registry.register("faq", help_role(&calls));

        let outcome = registry.dispatch_help(&bot, "u1", "help please").await;
        assert_eq!(outcome, HelpOutcome::Default);
        assert!(calls.lock().is_empty());

        let sent = api.direct_messages_to("u1");
        assert_eq!(
            sent,
            vec![format!(
                "mbot version {}\n\nPlugins with help:\nfaq\nweather\n",
                crate::VERSION
            )]
        );
    }

    #[tokio::test]
    async fn test_failing_help_still_counts_as_plugin_reply() {
        let api = Arc::new(MockApi::new());
        let bot = api.bot_context().await;

        let mut registry = HelpRegistry::new(CallGuard::default());
        let failing = match EntryPoint::help(|_, _, _| async { Err("broken".into()) }) {
            EntryPoint::Help(entry) => BoundRole {
                symbol: "Help".to_string(),
                entry,
            },
            _ => unreachable!(),
        };
        registry.register("faq", failing);

        let outcome = registry.dispatch_help(&bot, "u1", "faq help").await;
        assert_eq!(outcome, HelpOutcome::Plugin("faq".to_string()));
        assert!(api.direct_messages_to("u1").is_empty());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = HelpRegistry::new(CallGuard::default());
        assert!(registry.register("faq", help_role(&Calls::default())));
        assert!(!registry.register("faq", help_role(&Calls::default())));
        assert_eq!(registry.len(), 1);
    }
}
