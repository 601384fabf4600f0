//! Follows a mail log and keeps running delivery counters
//!
//! The same binary is the daemon (`mlogtail tail`), the client talking to it
//! (`mlogtail stats`, `mlogtail delivered`, ...) and a one-shot file parser
//! (`mlogtail -f /var/log/mail.log`).

pub mod cli;
pub mod config;
pub mod controller;

pub use cli::{Cli, Mode};
pub use config::Config;
pub use controller::{Daemon, parse_once, query};
