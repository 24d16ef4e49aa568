//! REST API client.

mod client;

pub use client::MattermostClient;
