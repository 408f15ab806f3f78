//! Error types for the connector.
//!
//! # Design
//! Every failure that crosses the connector boundary is a `ProcessingError`.
//! Configuration problems found while building a connector are reported as
//! `ConfigError` directly, since no request exists yet. Transport failures
//! keep their own `TransportError` so callers can still tell a native
//! timeout from a broken connection through `source()`.

use std::io;
use std::time::Duration;

/// Invalid connector or request configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A property holds a value of the wrong shape (e.g. a non-numeric timeout).
    #[error("invalid value for property `{key}`: {value}")]
    InvalidValue { key: String, value: String },

    /// The proxy URI cannot be parsed into a host and a port.
    #[error("invalid proxy URI `{uri}`: {reason}")]
    InvalidProxy { uri: String, reason: String },
}

/// Failure reported by a `Transport` while performing the exchange.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The transport's own per-request or connect deadline elapsed.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The request could not be turned into a valid wire request.
    #[error("invalid request: {0}")]
    Request(String),

    #[error("{0}")]
    Other(String),
}

/// The single error type surfaced by `Connector::send` and `send_async`.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("invalid connector configuration: {0}")]
    Config(#[from] ConfigError),

    /// The entity writer failed while streaming the request body.
    #[error("The sending process failed with I/O error, {source}")]
    WriteFailed {
        #[source]
        source: io::Error,
    },

    /// The transport failed to perform the exchange.
    #[error("The async sending process failed with error, {0}")]
    Transport(#[source] TransportError),

    /// The calling thread was interrupted while waiting for the response.
    #[error("The sending process was interrupted")]
    Interrupted,

    /// No response became available within the configured read timeout.
    #[error("No response received within the read timeout of {0:?}")]
    Timeout(Duration),

    /// A body pipe could not be connected.
    #[error("The input stream cannot be connected to the output stream, {0}")]
    PipeConnect(String),

    #[error("The sending process was cancelled")]
    Cancelled,

    /// A worker task ended without producing a result (panic or shutdown).
    #[error("worker task failed: {0}")]
    Worker(String),
}

impl ProcessingError {
    /// Wrap an entity writer failure.
    pub fn write_failed(source: io::Error) -> Self {
        Self::WriteFailed { source }
    }

    /// True for both the connector's read-timeout bound and a transport-native timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            ProcessingError::Timeout(_) | ProcessingError::Transport(TransportError::Timeout(_)) => {
                true
            }
            ProcessingError::Transport(TransportError::Io(err)) => {
                err.kind() == io::ErrorKind::TimedOut
            }
            _ => false,
        }
    }
}

impl From<TransportError> for ProcessingError {
    fn from(err: TransportError) -> Self {
        ProcessingError::Transport(err)
    }
}
