//! Error types for counter lookups

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatsError {
    /// The name is not one of the fixed counter names
    #[error("Unknown counter: {0}")]
    UnknownCounter(String),

    /// The requested log format has no rule table
    #[error("Unsupported log type: {0}")]
    UnsupportedFormat(String),

    /// A rule pattern failed to compile
    #[error("Invalid rule {rule}: {reason}")]
    InvalidRule { rule: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, StatsError>;
