//! Websocket event stream.

mod client;

pub use client::WsEventSource;
