//! # mbot Transport
//!
//! Concrete collaborators for the seams defined in `mbot-core`.
//!
//! ## Features
//!
//! - `http-client` *(default)*: [`MattermostClient`], a [`RemoteApi`]
//!   over the Mattermost REST API v4
//! - `ws-client` *(default)*: [`WsEventSource`], an [`EventSource`] over the
//!   Mattermost websocket
//! - `full`: both
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  mbot-runtime       │  (startup, dispatch activation)
//! ├─────────────────────┤
//! │  mbot-core          │  (RemoteApi / EventSource traits)
//! ├─────────────────────┤
//! │  mbot-transport     │  <- This crate (implementations)
//! ├─────────────────────┤
//! │  Network (HTTP/WS)  │
//! └─────────────────────┘
//! ```
//!
//! [`RemoteApi`]: mbot_core::RemoteApi
//! [`EventSource`]: mbot_core::EventSource

#[cfg(feature = "http-client")]
pub mod http;

#[cfg(feature = "ws-client")]
pub mod websocket;

#[cfg(feature = "http-client")]
pub use http::MattermostClient;

#[cfg(feature = "ws-client")]
pub use websocket::WsEventSource;

/// Path of API v4 below the server URL.
pub const API_PATH: &str = "/api/v4";
