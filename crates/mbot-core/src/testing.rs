//! Test doubles for the collaborator seams.
//!
//! Enabled for this crate's own tests and, through the `testing` feature,
//! for downstream crates.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::api::RemoteApi;
use crate::context::{BotContext, FixedChannels};
use crate::error::{ApiError, ApiResult};
use crate::model::{Channel, ChannelType, NewPost, Post, Team, User};

#[derive(Default)]
struct State {
    channels: HashMap<String, Channel>,
    created: Vec<String>,
    members: HashSet<(String, String)>,
    posts: Vec<Post>,
    failing_creates: HashSet<String>,
    token: Option<String>,
    user: Option<User>,
    profile_updates: usize,
    unreachable: bool,
    reject_login: bool,
    next_id: u64,
}

impl State {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }
}

/// In-memory [`RemoteApi`] for one team.
///
/// Records channel creations, memberships and posts so tests can assert on
/// the side effects of the host.
#[derive(Default)]
pub struct MockApi {
    state: Mutex<State>,
}

impl MockApi {
    pub const TEAM_ID: &'static str = "team-1";
    pub const TEAM_NAME: &'static str = "ops";
    pub const BOT_ID: &'static str = "bot-user";
    pub const BOT_NAME: &'static str = "mbot";

    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an existing channel without recording a creation.
    pub fn add_channel(&self, name: &str) -> Channel {
        let mut state = self.state.lock();
        let channel = Channel {
            id: state.id("ch-"),
            team_id: Self::TEAM_ID.to_string(),
            name: name.to_string(),
            display_name: name.to_string(),
            channel_type: ChannelType::Open,
        };
        state.channels.insert(name.to_string(), channel.clone());
        channel
    }

    /// Makes creating the named channel fail.
    pub fn fail_channel_creation(&self, name: &str) {
        self.state.lock().failing_creates.insert(name.to_string());
    }

    /// Makes `ping` fail.
    pub fn set_unreachable(&self) {
        self.state.lock().unreachable = true;
    }

    /// Makes `login` fail.
    pub fn reject_login(&self) {
        self.state.lock().reject_login = true;
    }

    /// Names of channels created through the API, in order.
    pub fn created_channels(&self) -> Vec<String> {
        self.state.lock().created.clone()
    }

    pub fn is_member(&self, channel_id: &str, user_id: &str) -> bool {
        self.state
            .lock()
            .members
            .contains(&(channel_id.to_string(), user_id.to_string()))
    }

    pub fn channel(&self, name: &str) -> Option<Channel> {
        self.state.lock().channels.get(name).cloned()
    }

    /// All posts created so far.
    pub fn posts(&self) -> Vec<Post> {
        self.state.lock().posts.clone()
    }

    /// Messages posted to one channel, in order.
    pub fn messages_in(&self, channel_id: &str) -> Vec<String> {
        self.state
            .lock()
            .posts
            .iter()
            .filter(|p| p.channel_id == channel_id)
            .map(|p| p.message.clone())
            .collect()
    }

    /// Direct messages the bot sent to `user_id`.
    pub fn direct_messages_to(&self, user_id: &str) -> Vec<String> {
        self.messages_in(&direct_channel_id(Self::BOT_ID, user_id))
    }

    /// Number of profile updates performed.
    pub fn profile_updates(&self) -> usize {
        self.state.lock().profile_updates
    }

    /// Builds a bot context with the fixed channels `bot-debug`,
    /// `town-square` and `bot-status`.
    pub async fn bot_context(self: &Arc<Self>) -> BotContext {
        let channels = FixedChannels {
            debug: Arc::new(self.add_channel("bot-debug")),
            main: Arc::new(self.add_channel("town-square")),
            status: Arc::new(self.add_channel("bot-status")),
        };
        BotContext::new(
            Arc::clone(self) as Arc<dyn RemoteApi>,
            bot_user(),
            team(),
            Self::BOT_NAME,
            channels,
        )
    }

    /// A post as the server would deliver it.
    pub fn post(channel_id: &str, user_id: &str, message: &str) -> Post {
        Post {
            id: format!("post-{user_id}-{}", message.len()),
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
            message: message.to_string(),
            ..Default::default()
        }
    }
}

fn bot_user() -> User {
    User {
        id: MockApi::BOT_ID.to_string(),
        username: MockApi::BOT_NAME.to_string(),
        ..Default::default()
    }
}

fn team() -> Team {
    Team {
        id: MockApi::TEAM_ID.to_string(),
        name: MockApi::TEAM_NAME.to_string(),
        display_name: "Ops".to_string(),
    }
}

fn direct_channel_id(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("{first}__{second}")
}

#[async_trait]
impl RemoteApi for MockApi {
    async fn ping(&self) -> ApiResult<()> {
        if self.state.lock().unreachable {
            return Err(ApiError::Request {
                endpoint: "/system/ping".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn login(&self, login_id: &str, _password: &str) -> ApiResult<User> {
        let mut state = self.state.lock();
        if state.reject_login {
            return Err(ApiError::Status {
                endpoint: "/users/login".to_string(),
                status: 401,
                message: "invalid credentials".to_string(),
            });
        }
        state.token = Some(format!("token-{login_id}"));
        let user = state.user.get_or_insert_with(bot_user).clone();
        Ok(user)
    }

    fn auth_token(&self) -> Option<String> {
        self.state.lock().token.clone()
    }

    async fn update_user(&self, user: &User) -> ApiResult<User> {
        let mut state = self.state.lock();
        state.profile_updates += 1;
        state.user = Some(user.clone());
        Ok(user.clone())
    }

    async fn team_by_name(&self, name: &str) -> ApiResult<Team> {
        if name == Self::TEAM_NAME {
            Ok(team())
        } else {
            Err(ApiError::NotFound(format!("team {name}")))
        }
    }

    async fn channel_by_name(&self, _team_id: &str, name: &str) -> ApiResult<Option<Channel>> {
        Ok(self.state.lock().channels.get(name).cloned())
    }

    async fn create_channel(
        &self,
        team_id: &str,
        name: &str,
        display_name: &str,
    ) -> ApiResult<Channel> {
        let mut state = self.state.lock();
        if state.failing_creates.contains(name) {
            return Err(ApiError::Status {
                endpoint: "/channels".to_string(),
                status: 403,
                message: "permission denied".to_string(),
            });
        }
        let channel = Channel {
            id: state.id("ch-"),
            team_id: team_id.to_string(),
            name: name.to_string(),
            display_name: display_name.to_string(),
            channel_type: ChannelType::Open,
        };
        state.created.push(name.to_string());
        state.channels.insert(name.to_string(), channel.clone());
        Ok(channel)
    }

    async fn add_channel_member(&self, channel_id: &str, user_id: &str) -> ApiResult<()> {
        self.state
            .lock()
            .members
            .insert((channel_id.to_string(), user_id.to_string()));
        Ok(())
    }

    async fn create_post(&self, post: &NewPost) -> ApiResult<Post> {
        let mut state = self.state.lock();
        let created = Post {
            id: state.id("post-"),
            user_id: Self::BOT_ID.to_string(),
            channel_id: post.channel_id.clone(),
            root_id: post.root_id.clone(),
            message: post.message.clone(),
            ..Default::default()
        };
        state.posts.push(created.clone());
        Ok(created)
    }

    async fn direct_channel(&self, user_a: &str, user_b: &str) -> ApiResult<Channel> {
        let id = direct_channel_id(user_a, user_b);
        Ok(Channel {
            id: id.clone(),
            team_id: String::new(),
            name: id.clone(),
            display_name: id,
            channel_type: ChannelType::Direct,
        })
    }
}
