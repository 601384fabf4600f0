//! Error types for control operations

use thiserror::Error;

/// Errors that can occur during control operations
#[derive(Debug, Error)]
pub enum ControlError {
    /// I/O error communicating over the command socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The command endpoint could not be bound
    #[error("Cannot listen on {endpoint}: {source}")]
    Bind {
        endpoint: String,
        source: std::io::Error,
    },

    /// The daemon could not be reached
    #[error("Cannot connect to log reader process at {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },

    /// The listen address is not `unix:PATH` or `HOST:PORT`
    #[error("Invalid listen address: {0}")]
    InvalidEndpoint(String),

    /// Socket file mode outside `000`..=`777`
    #[error("Invalid socket mode: {0}")]
    InvalidMode(String),

    /// Socket owner could not be resolved
    #[error("Invalid socket owner: {0}")]
    InvalidOwner(String),

    /// The command word is not recognised
    #[error("unknown command \"{0}\"")]
    UnknownCommand(String),

    /// Connection closed before a command arrived
    #[error("Connection closed")]
    ConnectionClosed,

    /// Request timeout
    #[error("Request timeout")]
    Timeout,
}

/// Result type for control operations
pub type Result<T> = std::result::Result<T, ControlError>;
