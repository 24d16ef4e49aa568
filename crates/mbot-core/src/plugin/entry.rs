//! Typed entry points.
//!
//! Modules export entry points by name. Instead of an untyped symbol that is
//! force-cast at call time, every export is an [`EntryPoint`] variant whose
//! payload already has the right signature; the loader compares the variant
//! with the shape a role needs exactly once, when the role is bound.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use axum::extract::Request;
use axum::response::Response;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::context::BotContext;
use crate::error::BoxError;
use crate::model::{Post, WebSocketEvent};

/// `SetChannels(main, status, debug)`.
pub type SetChannelsFn = Arc<dyn Fn(&str, &str, &str) + Send + Sync>;

/// `LoadConfig(path)`.
pub type LoadConfigFn = Arc<dyn Fn(&Path) -> Result<(), BoxError> + Send + Sync>;

/// HTTP handler bound to one or more path patterns.
pub type HttpFn = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// Watcher and MentionHandler: `(event, decoded post, bot)`.
pub type EventFn = Arc<
    dyn Fn(Arc<WebSocketEvent>, Post, BotContext) -> BoxFuture<'static, Result<(), BoxError>>
        + Send
        + Sync,
>;

/// HelpHandler: `(user_id, message, bot)`.
pub type HelpFn = Arc<
    dyn Fn(String, String, BotContext) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync,
>;

/// Shape (signature class) of an entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryShape {
    SetChannels,
    LoadConfig,
    Http,
    Event,
    Help,
}

impl fmt::Display for EntryShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SetChannels => "set-channels",
            Self::LoadConfig => "load-config",
            Self::Http => "http",
            Self::Event => "event",
            Self::Help => "help",
        })
    }
}

/// A named export of a module.
#[derive(Clone)]
pub enum EntryPoint {
    SetChannels(SetChannelsFn),
    LoadConfig(LoadConfigFn),
    Http(HttpFn),
    Event(EventFn),
    Help(HelpFn),
}

impl EntryPoint {
    pub fn set_channels<F>(f: F) -> Self
    where
        F: Fn(&str, &str, &str) + Send + Sync + 'static,
    {
        Self::SetChannels(Arc::new(f))
    }

    pub fn load_config<F>(f: F) -> Self
    where
        F: Fn(&Path) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::LoadConfig(Arc::new(f))
    }

    pub fn http<F, Fut>(f: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self::Http(Arc::new(move |req| f(req).boxed()))
    }

    pub fn event<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<WebSocketEvent>, Post, BotContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self::Event(Arc::new(move |event, post, bot| f(event, post, bot).boxed()))
    }

    pub fn help<F, Fut>(f: F) -> Self
    where
        F: Fn(String, String, BotContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self::Help(Arc::new(move |user_id, message, bot| {
            f(user_id, message, bot).boxed()
        }))
    }

    pub fn shape(&self) -> EntryShape {
        match self {
            Self::SetChannels(_) => EntryShape::SetChannels,
            Self::LoadConfig(_) => EntryShape::LoadConfig,
            Self::Http(_) => EntryShape::Http,
            Self::Event(_) => EntryShape::Event,
            Self::Help(_) => EntryShape::Help,
        }
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryPoint::{}", self.shape())
    }
}
