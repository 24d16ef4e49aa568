//! Runtime error types.

use thiserror::Error;

use mbot_core::{ApiError, ChannelError, TransportError};

pub use crate::config::ConfigError;

/// Fatal startup failures.
///
/// Anything that goes wrong with a single plugin is not fatal and never
/// surfaces here.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The server did not answer the initial ping.
    #[error("Server is not reachable: {0}")]
    ServerUnreachable(#[source] ApiError),

    /// Logging in as the bot user failed.
    #[error("Failed to log in as '{user}': {source}")]
    Login {
        user: String,
        #[source]
        source: ApiError,
    },

    /// The configured team does not exist or is not visible.
    #[error("Failed to find team '{team}': {source}")]
    Team {
        team: String,
        #[source]
        source: ApiError,
    },

    /// A fixed channel could not be resolved.
    #[error("Failed to set up {role} channel: {source}")]
    FixedChannel {
        /// `log`, `main` or `status`.
        role: &'static str,
        #[source]
        source: ChannelError,
    },

    /// A collaborator was neither injected nor enabled by a cargo feature.
    #[error("No {0} available; enable the matching transport feature or inject one")]
    MissingCollaborator(&'static str),

    /// The HTTP listener could not be started.
    #[error("HTTP listener failed: {0}")]
    Transport(#[from] TransportError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
