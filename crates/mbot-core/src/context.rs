//! Explicit bot state handed to every component that talks to the server.

use std::sync::Arc;

use tracing::warn;

use crate::api::RemoteApi;
use crate::error::ApiResult;
use crate::model::{Channel, ChannelIds, NewPost, Post, Team, User};

/// The fixed bootstrap channels.
#[derive(Debug, Clone)]
pub struct FixedChannels {
    /// Log/debug channel; milestones and plugin failures are mirrored here.
    pub debug: Arc<Channel>,
    pub main: Arc<Channel>,
    pub status: Arc<Channel>,
}

impl FixedChannels {
    /// Ids in the order `SetChannels` expects them.
    pub fn ids(&self) -> ChannelIds {
        ChannelIds {
            main: self.main.id.clone(),
            status: self.status.id.clone(),
            debug: self.debug.id.clone(),
        }
    }
}

struct Inner {
    api: Arc<dyn RemoteApi>,
    user: User,
    team: Team,
    name: String,
    version: String,
    channels: FixedChannels,
}

/// Handle to the authenticated bot.
///
/// Built once after bootstrap and cloned into loaders, roles and entry-point
/// calls. Cloning is cheap.
#[derive(Clone)]
pub struct BotContext {
    inner: Arc<Inner>,
}

impl BotContext {
    /// Creates the context from bootstrap results.
    pub fn new(
        api: Arc<dyn RemoteApi>,
        user: User,
        team: Team,
        name: impl Into<String>,
        channels: FixedChannels,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                user,
                team,
                name: name.into(),
                version: crate::VERSION.to_string(),
                channels,
            }),
        }
    }

    pub fn api(&self) -> &Arc<dyn RemoteApi> {
        &self.inner.api
    }

    /// The bot's own account.
    pub fn user(&self) -> &User {
        &self.inner.user
    }

    /// The bot's own user id; mentions are matched against it.
    pub fn user_id(&self) -> &str {
        &self.inner.user.id
    }

    pub fn team(&self) -> &Team {
        &self.inner.team
    }

    /// Display name of the bot.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn version(&self) -> &str {
        &self.inner.version
    }

    pub fn channels(&self) -> &FixedChannels {
        &self.inner.channels
    }

    /// Posts `message` to a channel.
    pub async fn send_to_channel(&self, channel_id: &str, message: &str) -> ApiResult<Post> {
        self.inner
            .api
            .create_post(&NewPost::new(channel_id, message))
            .await
    }

    /// Replies to `post` in its thread.
    pub async fn reply(&self, post: &Post, message: &str) -> ApiResult<Post> {
        let reply = NewPost::new(&post.channel_id, message).in_thread(post.thread_root());
        self.inner.api.create_post(&reply).await
    }

    /// Sends a direct message to `user_id`.
    pub async fn send_direct(&self, user_id: &str, message: &str) -> ApiResult<Post> {
        let channel = self
            .inner
            .api
            .direct_channel(self.user_id(), user_id)
            .await?;
        self.send_to_channel(&channel.id, message).await
    }

    /// Mirrors `message` to the debug channel. Failures are only logged.
    pub async fn notify_debug(&self, message: &str) {
        let channel_id = &self.inner.channels.debug.id;
        if let Err(e) = self.send_to_channel(channel_id, message).await {
            warn!(error = %e, "Failed to send message to debug channel");
        }
    }
}

impl std::fmt::Debug for BotContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotContext")
            .field("user_id", &self.inner.user.id)
            .field("team", &self.inner.team.name)
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}
