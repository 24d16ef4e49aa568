//! Remote messaging primitives.
//!
//! [`RemoteApi`] is the narrow interface the host needs from the messaging
//! server. `mbot-transport` implements it over the Mattermost REST API; the
//! `testing` module provides an in-memory implementation.

use async_trait::async_trait;

use crate::error::ApiResult;
use crate::model::{Channel, NewPost, Post, Team, User};

/// Interface to the remote messaging server.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Checks that the server is up.
    async fn ping(&self) -> ApiResult<()>;

    /// Logs in and stores the session token for subsequent calls.
    async fn login(&self, login_id: &str, password: &str) -> ApiResult<User>;

    /// Session token obtained by [`login`](RemoteApi::login).
    fn auth_token(&self) -> Option<String>;

    /// Updates profile fields of an existing user.
    async fn update_user(&self, user: &User) -> ApiResult<User>;

    /// Looks up a team by its name.
    async fn team_by_name(&self, name: &str) -> ApiResult<Team>;

    /// Looks up a channel by name. `Ok(None)` when it does not exist.
    async fn channel_by_name(&self, team_id: &str, name: &str) -> ApiResult<Option<Channel>>;

    /// Creates an open channel.
    async fn create_channel(&self, team_id: &str, name: &str, display_name: &str)
    -> ApiResult<Channel>;

    /// Adds a user to a channel. Adding an existing member is not an error.
    async fn add_channel_member(&self, channel_id: &str, user_id: &str) -> ApiResult<()>;

    /// Creates a post.
    async fn create_post(&self, post: &NewPost) -> ApiResult<Post>;

    /// Returns the direct-message channel between two users, creating it
    /// if needed.
    async fn direct_channel(&self, user_a: &str, user_b: &str) -> ApiResult<Channel>;
}
