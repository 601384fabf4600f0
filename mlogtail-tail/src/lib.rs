//! Following the mail log and feeding the counters
//!
//! [`TailSource`] yields the lines appended to the log file, surviving
//! truncation and replacement of the file, or reads standard input until EOF.
//! [`Aggregator`] classifies each line and applies the result to the shared
//! [`mlogtail_stats::CounterStore`].

pub mod aggregator;
pub mod error;
pub mod source;

pub use aggregator::Aggregator;
pub use error::{Result, TailError};
pub use source::{STDIN_PATH, TailConfig, TailSource};
