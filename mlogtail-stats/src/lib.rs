//! Delivery counters and the rules that feed them
//!
//! The [`CounterStore`] holds one `u64` per [`CounterName`] behind a single
//! lock. The [`Classifier`] turns one mail log line into at most one
//! [`Outcome`], which the store applies atomically.

pub mod classifier;
pub mod counter;
pub mod error;
pub mod store;

pub use classifier::{Classifier, LogFormat, Outcome, Rule};
pub use counter::CounterName;
pub use error::{Result, StatsError};
pub use store::{CounterStore, Snapshot};
