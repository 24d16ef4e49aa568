//! Error taxonomy of the host.
//!
//! Each class of failure has its own type so callers can tell how far the
//! damage reaches:
//!
//! | Type | Scope |
//! |------|-------|
//! | [`ApiError`] | A single remote call. Fatal only during bootstrap. |
//! | [`TransportError`] | The event stream of one subscription. |
//! | [`LoadError`] | One plugin; the plugin is skipped. |
//! | [`BindError`] | One role of one plugin; the plugin stays active. |
//! | [`DecodeError`] | One event for one role; the event is dropped. |

use thiserror::Error;

use crate::plugin::{EntryShape, Role};

/// Boxed error returned by plugin entry points.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Remote API Errors
// =============================================================================

/// Errors returned by the remote messaging server or while talking to it.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The request never produced a response.
    #[error("request to {endpoint} failed: {reason}")]
    Request {
        /// Endpoint path, relative to the API root.
        endpoint: String,
        /// Reason for failure.
        reason: String,
    },

    /// The server answered with a non-success status.
    #[error("{endpoint} returned {status}: {message}")]
    Status {
        /// Endpoint path, relative to the API root.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Server-provided message, if any.
        message: String,
    },

    /// The requested object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A call requiring a session was made before login.
    #[error("not logged in")]
    NotAuthenticated,

    /// Failed to serialize a request or deserialize a response.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors of the event stream transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The URL that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// Connection closed.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// No session token is available for the subscription handshake.
    #[error("no session token available")]
    MissingToken,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Plugin Errors
// =============================================================================

/// A plugin could not be loaded. The plugin is skipped entirely.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The module reference could not be resolved to a handle.
    #[error("module '{module}' could not be opened: {reason}")]
    Open {
        /// Module reference as configured.
        module: String,
        /// Reason for failure.
        reason: String,
    },

    /// A mandatory entry point is not exported.
    #[error("module '{module}' does not export mandatory entry point '{symbol}'")]
    MissingEntryPoint {
        /// Module name.
        module: String,
        /// Symbol that was looked up.
        symbol: &'static str,
    },

    /// A mandatory entry point has the wrong shape.
    #[error("entry point '{symbol}' of module '{module}' is a {found} entry point, expected {expected}")]
    ShapeMismatch {
        /// Module name.
        module: String,
        /// Symbol that was looked up.
        symbol: &'static str,
        /// Shape required for the symbol.
        expected: EntryShape,
        /// Shape actually exported.
        found: EntryShape,
    },

    /// `LoadConfig` rejected the configuration file.
    #[error("module '{module}' failed to load config '{path}': {reason}")]
    Config {
        /// Module name.
        module: String,
        /// Configuration file path.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// A mandatory entry point panicked.
    #[error("entry point '{symbol}' of module '{module}' panicked: {message}")]
    Panicked {
        /// Module name.
        module: String,
        /// Entry point that panicked.
        symbol: &'static str,
        /// Panic payload, if printable.
        message: String,
    },

    /// A plugin with the same name is already loaded.
    #[error("plugin '{0}' is already loaded")]
    Duplicate(String),
}

/// An optional role could not be bound. Only that role is skipped.
#[derive(Debug, Error)]
pub enum BindError {
    /// The configured entry point is not exported.
    #[error("plugin '{plugin}' has no entry point '{symbol}' for role {role}")]
    MissingEntryPoint {
        /// Plugin name.
        plugin: String,
        /// Role being bound.
        role: Role,
        /// Configured symbol.
        symbol: String,
    },

    /// The configured entry point has the wrong shape for the role.
    #[error("entry point '{symbol}' of plugin '{plugin}' is a {found} entry point, role {role} needs {expected}")]
    ShapeMismatch {
        /// Plugin name.
        plugin: String,
        /// Role being bound.
        role: Role,
        /// Configured symbol.
        symbol: String,
        /// Shape required by the role.
        expected: EntryShape,
        /// Shape actually exported.
        found: EntryShape,
    },

    /// The HTTP router refused a path pattern.
    #[error("plugin '{plugin}': {source}")]
    Http {
        /// Plugin name.
        plugin: String,
        /// Router error.
        #[source]
        source: HttpBindError,
    },
}

/// Errors raised by the shared HTTP router.
#[derive(Debug, Clone, Error)]
pub enum HttpBindError {
    /// The pattern is not a valid path pattern.
    #[error("invalid path pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// Offending pattern.
        pattern: String,
        /// Reason for rejection.
        reason: String,
    },

    /// Another plugin already owns the pattern.
    #[error("path pattern '{pattern}' is already bound by plugin '{owner}'")]
    Duplicate {
        /// Offending pattern.
        pattern: String,
        /// Plugin that bound it first.
        owner: String,
    },

    /// Routes cannot change once the listener runs.
    #[error("router is already serving, cannot bind '{0}'")]
    AlreadyServing(String),
}

/// A payload field of an event could not be decoded.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The field is absent from the payload.
    #[error("payload field '{0}' is missing")]
    MissingField(&'static str),

    /// The field is present but malformed.
    #[error("payload field '{field}' is malformed: {reason}")]
    Malformed {
        /// Field name.
        field: &'static str,
        /// Reason for failure.
        reason: String,
    },
}

/// A channel could not be resolved by name.
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    /// Looking up the channel failed.
    #[error("lookup of channel '{name}' failed: {source}")]
    Lookup {
        /// Channel name.
        name: String,
        /// Underlying API error.
        #[source]
        source: ApiError,
    },

    /// The channel did not exist and could not be created.
    #[error("channel '{name}' could not be created: {source}")]
    Create {
        /// Channel name.
        name: String,
        /// Underlying API error.
        #[source]
        source: ApiError,
    },

    /// The channel was created but is still not found by name.
    #[error("channel '{0}' not found after creation")]
    Vanished(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for remote API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type for event stream operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for plugin loading.
pub type LoadResult<T> = Result<T, LoadError>;
