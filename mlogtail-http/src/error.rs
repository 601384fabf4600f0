//! HTTP server error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    /// Failed to bind to the specified address
    #[error("Failed to bind HTTP server to {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    /// The server stopped with an I/O error
    #[error("HTTP server error: {0}")]
    Server(String),
}
