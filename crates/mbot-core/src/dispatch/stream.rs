//! Watcher and MentionHandler roles.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::isolate::{CallGuard, CallOutcome, CallSite};
use crate::context::BotContext;
use crate::error::DecodeError;
use crate::help::HelpRegistry;
use crate::model::{Post, WebSocketEvent};
use crate::plugin::{BoundRole, EventFn, Role};
use crate::source::Subscription;

/// Word that routes a mention to the help dispatcher.
const HELP_KEYWORD: &str = "help";

/// What happened to one event for one role.
#[derive(Debug)]
pub enum Delivery {
    /// The entry point was invoked and returned `Ok`.
    Delivered,
    /// Not a `posted` event.
    Skipped,
    /// A payload field could not be decoded; nothing was invoked.
    Dropped(DecodeError),
    /// The bot is not among the mentioned users.
    NotMentioned,
    /// The entry point returned an error, panicked or timed out.
    Failed,
}

/// One activated stream role of one plugin.
///
/// Owns its subscription while running; events are decoded and the entry
/// point is awaited inline, so a slow plugin only delays its own stream.
pub struct StreamRole {
    plugin: String,
    role: Role,
    symbol: String,
    entry: EventFn,
    bot: BotContext,
    guard: CallGuard,
    help: Option<Arc<HelpRegistry>>,
}

impl StreamRole {
    /// A Watcher: every posted event is forwarded.
    pub fn watcher(
        plugin: impl Into<String>,
        bound: BoundRole<EventFn>,
        bot: BotContext,
        guard: CallGuard,
    ) -> Self {
        Self {
            plugin: plugin.into(),
            role: Role::Watcher,
            symbol: bound.symbol,
            entry: bound.entry,
            bot,
            guard,
            help: None,
        }
    }

    /// A MentionHandler: only posted events mentioning the bot are
    /// forwarded. With `help`, mentions containing "help" are answered
    /// first; only one role per process may carry the registry.
    pub fn mention(
        plugin: impl Into<String>,
        bound: BoundRole<EventFn>,
        bot: BotContext,
        guard: CallGuard,
        help: Option<Arc<HelpRegistry>>,
    ) -> Self {
        Self {
            plugin: plugin.into(),
            role: Role::MentionHandler,
            symbol: bound.symbol,
            entry: bound.entry,
            bot,
            guard,
            help,
        }
    }

    /// Whether this role answers help requests.
    pub fn answers_help(&self) -> bool {
        self.help.is_some()
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Routes one event to this role.
    pub async fn dispatch(&self, event: Arc<WebSocketEvent>) -> Delivery {
        if !event.is_posted() {
            trace!(plugin = %self.plugin, role = %self.role, event = %event.event, "Event skipped");
            return Delivery::Skipped;
        }

        if self.role == Role::MentionHandler {
            match event.mentions(self.bot.user_id()) {
                Ok(true) => {}
                Ok(false) => return Delivery::NotMentioned,
                Err(e) => return self.drop_event(&event, e),
            }
        }

        let post = match event.decode_post() {
            Ok(post) => post,
            Err(e) => return self.drop_event(&event, e),
        };

        if let Some(help) = &self.help
            && post.message.contains(HELP_KEYWORD)
        {
            let outcome = help
                .dispatch_help(&self.bot, &post.user_id, &post.message)
                .await;
            debug!(plugin = %self.plugin, outcome = ?outcome, "Help request answered");
        }

        self.invoke(event, post).await
    }

    async fn invoke(&self, event: Arc<WebSocketEvent>, post: Post) -> Delivery {
        let role = self.role.to_string();
        let site = CallSite::new(&self.plugin, &role, &self.symbol);
        let outcome = self
            .guard
            .run(site, || (self.entry)(event, post, self.bot.clone()))
            .await;

        match outcome {
            CallOutcome::Completed(Ok(())) => Delivery::Delivered,
            CallOutcome::Completed(Err(e)) => {
                error!(
                    plugin = %self.plugin,
                    role = %self.role,
                    symbol = %self.symbol,
                    error = %e,
                    "Entry point failed"
                );
                Delivery::Failed
            }
            CallOutcome::Panicked(_) | CallOutcome::TimedOut(_) => Delivery::Failed,
        }
    }

    fn drop_event(&self, event: &WebSocketEvent, e: DecodeError) -> Delivery {
        match &e {
            // Most posts mention nobody; not worth more than a debug line.
            DecodeError::MissingField(_) => {
                debug!(plugin = %self.plugin, role = %self.role, seq = event.seq, error = %e, "Event dropped")
            }
            DecodeError::Malformed { .. } => {
                warn!(plugin = %self.plugin, role = %self.role, seq = event.seq, error = %e, "Event dropped")
            }
        }
        Delivery::Dropped(e)
    }

    /// Consumes `subscription` until it ends or `cancel` fires. Returns the
    /// number of successful deliveries.
    pub async fn run(self, mut subscription: Subscription, cancel: CancellationToken) -> u64 {
        info!(plugin = %self.plugin, role = %self.role, symbol = %self.symbol, "Stream role started");
        let mut delivered = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    subscription.close();
                    info!(plugin = %self.plugin, role = %self.role, delivered, "Stream role stopped");
                    break;
                }
                next = subscription.next() => match next {
                    Some(event) => {
                        if let Delivery::Delivered = self.dispatch(event).await {
                            delivered += 1;
                        }
                    }
                    None => {
                        warn!(plugin = %self.plugin, role = %self.role, delivered, "Event stream ended");
                        break;
                    }
                },
            }
        }

        delivered
    }
}

/// Answers help requests on its own subscription.
///
/// Used when plugins registered help entry points but no MentionHandler
/// role is active to carry the registry.
pub async fn run_help_desk(
    help: Arc<HelpRegistry>,
    bot: BotContext,
    mut subscription: Subscription,
    cancel: CancellationToken,
) {
    info!(plugins = help.len(), "Help desk started");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                subscription.close();
                break;
            }
            next = subscription.next() => {
                let Some(event) = next else {
                    warn!("Help desk event stream ended");
                    break;
                };
                if !event.is_posted() || !matches!(event.mentions(bot.user_id()), Ok(true)) {
                    continue;
                }
                match event.decode_post() {
                    Ok(post) if post.message.contains(HELP_KEYWORD) => {
                        help.dispatch_help(&bot, &post.user_id, &post.message).await;
                    }
                    Ok(_) => {}
                    Err(e) => debug!(seq = event.seq, error = %e, "Help request dropped"),
                }
            }
        }
    }
}

impl std::fmt::Debug for StreamRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRole")
            .field("plugin", &self.plugin)
            .field("role", &self.role)
            .field("symbol", &self.symbol)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::plugin::EntryPoint;
    use crate::source::{BroadcastEventSource, EventSource};
    use crate::testing::MockApi;

    type Seen = Arc<Mutex<Vec<String>>>;

    fn bound(entry: EntryPoint) -> BoundRole<EventFn> {
        match entry {
            EntryPoint::Event(entry) => BoundRole {
                symbol: "OnPost".to_string(),
                entry,
            },
            _ => unreachable!(),
        }
    }

    fn recording(seen: &Seen) -> BoundRole<EventFn> {
        let seen = Arc::clone(seen);
        bound(EntryPoint::event(move |_event, post, _bot| {
            seen.lock().push(post.message);
            async { Ok(()) }
        }))
    }

    fn posted(message: &str, mentions: Option<&[&str]>) -> Arc<WebSocketEvent> {
        let post = json!({"id": "p1", "user_id": "u1", "channel_id": "c1", "message": message});
        let mut event = WebSocketEvent::new("posted").with_data("post", post.to_string());
        if let Some(ids) = mentions {
            event = event.with_data("mentions", json!(ids).to_string());
        }
        Arc::new(event)
    }

    #[tokio::test]
    async fn test_watcher_forwards_decoded_post() {
        let api = Arc::new(MockApi::new());
        let bot = api.bot_context().await;
        let seen = Seen::default();
        let role = StreamRole::watcher("weather", recording(&seen), bot, CallGuard::default());

        assert!(matches!(role.dispatch(posted("sunny?", None)).await, Delivery::Delivered));
        assert!(matches!(
            role.dispatch(Arc::new(WebSocketEvent::new("typing"))).await,
            Delivery::Skipped
        ));
        assert!(matches!(
            role.dispatch(Arc::new(WebSocketEvent::new("posted").with_data("post", "{oops"))).await,
            Delivery::Dropped(DecodeError::Malformed { .. })
        ));
        assert_eq!(*seen.lock(), vec!["sunny?".to_string()]);
    }

    #[tokio::test]
    async fn test_mention_requires_bot_id() {
        let api = Arc::new(MockApi::new());
        let bot = api.bot_context().await;
        let seen = Seen::default();
        let help = Arc::new(HelpRegistry::new(CallGuard::default()));
        let role = StreamRole::mention("faq", recording(&seen), bot, CallGuard::default(), Some(help));

        let others: &[&str] = &["someone"];
        let us: &[&str] = &["someone", MockApi::BOT_ID];

        assert!(matches!(role.dispatch(posted("hi", Some(others))).await, Delivery::NotMentioned));
        assert!(matches!(
            role.dispatch(posted("hi", None)).await,
            Delivery::Dropped(DecodeError::MissingField("mentions"))
        ));
        assert!(matches!(role.dispatch(posted("hi bot", Some(us))).await, Delivery::Delivered));
        assert_eq!(*seen.lock(), vec!["hi bot".to_string()]);
    }

    #[tokio::test]
    async fn test_mention_with_help_sends_default_reply_and_forwards() {
        let api = Arc::new(MockApi::new());
        let bot = api.bot_context().await;
        let seen = Seen::default();
        let help = Arc::new(HelpRegistry::new(CallGuard::default()));
        let role = StreamRole::mention("faq", recording(&seen), bot, CallGuard::default(), Some(help));

        let us: &[&str] = &[MockApi::BOT_ID];
        assert!(matches!(role.dispatch(posted("help!", Some(us))).await, Delivery::Delivered));
        assert_eq!(*seen.lock(), vec!["help!".to_string()]);
        assert_eq!(api.direct_messages_to("u1").len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_watcher_keeps_consuming() {
        let api = Arc::new(MockApi::new());
        let bot = api.bot_context().await;
        let seen = Seen::default();
        let recorder = Arc::clone(&seen);
        let flaky = bound(EntryPoint::event(move |_event, post, _bot| {
            if post.message == "crash" {
                panic!("watcher bug");
            }
            recorder.lock().push(post.message);
            async { Ok(()) }
        }));

        let source = BroadcastEventSource::new();
        let subscription = source.subscribe().await.unwrap();
        let role = StreamRole::watcher("flaky", flaky, bot, CallGuard::default());
        let task = tokio::spawn(role.run(subscription, CancellationToken::new()));

        for message in ["one", "crash", "two"] {
            let event = Arc::try_unwrap(posted(message, None)).unwrap();
            source.publish(event);
        }
        source.disconnect_all();

        assert_eq!(task.await.unwrap(), 2);
        assert_eq!(*seen.lock(), vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn test_help_desk_answers_only_help_mentions() {
        let api = Arc::new(MockApi::new());
        let bot = api.bot_context().await;
        let help = Arc::new(HelpRegistry::new(CallGuard::default()));
        let source = BroadcastEventSource::new();
        let subscription = source.subscribe().await.unwrap();
        let task = tokio::spawn(run_help_desk(help, bot, subscription, CancellationToken::new()));

        let us: &[&str] = &[MockApi::BOT_ID];
        let others: &[&str] = &["someone"];
        for event in [
            posted("help please", Some(us)),
            posted("hello", Some(us)),
            posted("help please", Some(others)),
        ] {
            source.publish(Arc::try_unwrap(event).unwrap());
        }
        source.disconnect_all();
        task.await.unwrap();

        let dms = api.direct_messages_to("u1");
        assert_eq!(dms.len(), 1);
        assert!(dms[0].starts_with("mbot version "));
    }

    #[tokio::test]
    async fn test_cancel_closes_subscription() {
        let api = Arc::new(MockApi::new());
        let bot = api.bot_context().await;
        let source = BroadcastEventSource::new();
        let subscription = source.subscribe().await.unwrap();
        let role = StreamRole::watcher("w", recording(&Seen::default()), bot, CallGuard::default());

        let cancel = CancellationToken::new();
        let task = tokio::spawn(role.run(subscription, cancel.clone()));
        cancel.cancel();

        assert_eq!(task.await.unwrap(), 0);
        assert_eq!(source.subscriber_count(), 0);
    }
}
