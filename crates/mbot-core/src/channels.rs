//! Channel membership manager.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::RemoteApi;
use crate::error::ChannelError;
use crate::model::Channel;

/// Memoized name → channel resolution for one team.
///
/// The first `resolve` of a name looks the channel up, creates it if it does
/// not exist and joins the bot to it. Later calls return the cached channel,
/// so every plugin naming the same channel shares one `Arc<Channel>`.
pub struct ChannelDirectory {
    api: Arc<dyn RemoteApi>,
    team_id: String,
    user_id: String,
    // Held across the remote calls so concurrent first resolves of one name
    // create the channel at most once.
    cache: Mutex<HashMap<String, Arc<Channel>>>,
}

impl ChannelDirectory {
    pub fn new(
        api: Arc<dyn RemoteApi>,
        team_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            api,
            team_id: team_id.into(),
            user_id: user_id.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves `name` to a channel the bot is a member of.
    pub async fn resolve(&self, name: &str) -> Result<Arc<Channel>, ChannelError> {
        let mut cache = self.cache.lock().await;
        if let Some(channel) = cache.get(name) {
            return Ok(Arc::clone(channel));
        }

        let channel = Arc::new(self.lookup_or_create(name).await?);

        if let Err(e) = self.api.add_channel_member(&channel.id, &self.user_id).await {
            warn!(channel = %name, error = %e, "Failed to join channel");
        }

        info!(channel = %name, channel_id = %channel.id, "Channel resolved");
        cache.insert(name.to_string(), Arc::clone(&channel));
        Ok(channel)
    }

    /// Returns the channel if it was resolved before.
    pub async fn cached(&self, name: &str) -> Option<Arc<Channel>> {
        self.cache.lock().await.get(name).cloned()
    }

    async fn lookup_or_create(&self, name: &str) -> Result<Channel, ChannelError> {
        if let Some(channel) = self.lookup(name).await? {
            return Ok(channel);
        }

        debug!(channel = %name, "Channel not found, creating it");
        let created = self.api.create_channel(&self.team_id, name, name).await;

        // Someone else may have created it meanwhile; the second lookup is
        // authoritative either way.
        match (self.lookup(name).await?, created) {
            (Some(channel), _) => Ok(channel),
            (None, Err(source)) => Err(ChannelError::Create {
                name: name.to_string(),
                source,
            }),
            (None, Ok(_)) => Err(ChannelError::Vanished(name.to_string())),
        }
    }

    async fn lookup(&self, name: &str) -> Result<Option<Channel>, ChannelError> {
        self.api
            .channel_by_name(&self.team_id, name)
            .await
            .map_err(|source| ChannelError::Lookup {
                name: name.to_string(),
                source,
            })
    }
}

impl std::fmt::Debug for ChannelDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelDirectory")
            .field("team_id", &self.team_id)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}
