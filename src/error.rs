//! Error types for the relay.

use crate::records::MonitoredTable;
use crate::session::ConnectionState;

/// Top-level error type for the relay daemon.
///
/// Per-table query failures ([`QueryError`]) and per-message send failures
/// ([`SendError`]) are recovered where they happen and never reach this
/// level. Transport failures are `anyhow::Error` values returned by
/// [`crate::session::Transport`] and end up as one of those two.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error. Fatal at startup.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The health endpoint could not be bound.
    #[error("cannot bind health endpoint on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Group discovery over the messaging bridge failed.
    #[error("group discovery failed: {0}")]
    Discovery(String),

    /// Session credential persistence error.
    #[error("credential store error: {0}")]
    Credentials(String),
}

/// Invalid or missing configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required setting was not provided.
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    /// A setting was provided but could not be used.
    #[error("invalid value for `{key}`: {reason}")]
    Invalid {
        /// Setting name.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The config file could not be read or parsed.
    #[error("cannot load config file: {0}")]
    File(String),
}

/// A failed query against one monitored table.
#[derive(Debug, Clone, thiserror::Error)]
#[error("query on `{table}` failed: {message}")]
pub struct QueryError {
    pub table: MonitoredTable,
    pub message: String,
}

impl QueryError {
    pub fn new(table: MonitoredTable, message: impl Into<String>) -> Self {
        Self {
            table,
            message: message.into(),
        }
    }
}

/// Outbound send failure. Always recoverable: the message is dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The session is not in the `Connected` state.
    #[error("session not connected (state: {0})")]
    NotConnected(ConnectionState),

    /// The transport accepted the session but failed to deliver.
    #[error("transport rejected message: {0}")]
    Transport(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, RelayError>;
