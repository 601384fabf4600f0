//! Error types for the log source

use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TailError {
    /// The configured log could not be opened at startup
    #[error("Cannot open log file {}: {source}", path.display())]
    SourceUnavailable { path: PathBuf, source: io::Error },

    /// Historical replay was requested for a source that cannot be re-read
    #[error("Cannot initialize counters from standard input")]
    ReplayUnsupported,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, TailError>;
