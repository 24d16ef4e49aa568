//! # mbot Core
//!
//! The plugin capability framework of the mbot chat host.
//!
//! The host authenticates against a Mattermost-compatible server, joins a
//! fixed set of channels and then wires independently built modules into
//! zero or more dispatch roles. This crate holds everything between the
//! remote server and the modules:
//!
//! - **Model**: websocket events, posts, channels, users and teams ([`model`]).
//! - **Collaborator seams**: the remote API ([`RemoteApi`]) and the event
//!   stream ([`EventSource`]); concrete implementations live in
//!   `mbot-transport`.
//! - **Plugin framework**: descriptors, module handles, typed entry points
//!   and the [`Loader`] ([`plugin`]).
//! - **Channel membership**: memoized name → channel resolution
//!   ([`ChannelDirectory`]).
//! - **Dispatch**: per-role event routing with fault isolation
//!   ([`dispatch`]), the [`HelpRegistry`] and the shared [`HttpRouter`].
//!
//! ## Flow
//!
//! ```text
//! ┌──────────┐   ┌────────────────┐   ┌────────────┐   ┌──────────────┐
//! │  Loader  │──▶│ ChannelDirectory│──▶│ RoleBinder │──▶│ EventSource  │
//! └──────────┘   └────────────────┘   └────────────┘   │ (per role)   │
//!                                       │       │      └──────┬───────┘
//!                                       ▼       ▼             ▼
//!                               HttpRouter  HelpRegistry  StreamRole
//! ```

pub mod api;
pub mod channels;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod help;
pub mod http;
pub mod model;
pub mod plugin;
pub mod source;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use api::RemoteApi;
pub use channels::ChannelDirectory;
pub use context::{BotContext, FixedChannels};
pub use dispatch::{Activation, CallGuard, CallOutcome, Delivery, RoleBinder, StreamRole};
pub use error::{
    ApiError, ApiResult, BindError, BoxError, ChannelError, DecodeError, HttpBindError, LoadError,
    LoadResult, TransportError, TransportResult,
};
pub use help::{HelpOutcome, HelpRegistry};
pub use http::HttpRouter;
pub use model::{Channel, ChannelIds, ChannelType, NewPost, Post, Team, User, WebSocketEvent};
pub use plugin::{
    EntryPoint, EntryShape, LoadedPlugin, Loader, Module, ModuleCatalog, ModuleDescriptor,
    ModuleHandle, ModuleSource, PluginDescriptor, Role, StaticModule,
};
pub use source::{BroadcastEventSource, EventSink, EventSource, Subscription};

// Used by `register_module!` at call sites.
#[doc(hidden)]
pub use linkme;

// HTTP entry points take and return axum types.
pub use axum;

/// Version of the host, reported in the default help reply.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for module authors.
pub mod prelude {
    pub use super::context::BotContext;
    pub use super::error::BoxError;
    pub use super::model::{ChannelIds, Post, WebSocketEvent};
    pub use super::plugin::{EntryPoint, StaticModule};
    pub use super::register_module;
    pub use axum::extract::Request;
    pub use axum::response::{IntoResponse, Response};
}
