//! Pieces shared by every mlogtail crate: the logging macros and the
//! shutdown signal broadcast between the daemon's tasks.

pub mod logging;

pub use tracing;

/// Lifecycle notifications sent over the daemon's broadcast channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Stop accepting work and release bound resources
    Shutdown,
}
