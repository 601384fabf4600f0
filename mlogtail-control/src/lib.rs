//! Command socket for a running mlogtail daemon
//!
//! The protocol is deliberately tiny: a client connects, writes one command
//! word (`stats`, `stats_reset`, `reset` or a counter name), reads the text
//! reply and the server closes the connection. The socket is either a Unix
//! domain socket (`unix:/path`) or a TCP address.

pub mod client;
pub mod endpoint;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod server;

pub use client::ControlClient;
pub use endpoint::{Endpoint, SocketOptions};
pub use error::{ControlError, Result};
pub use protocol::{Command, Reply};
pub use queue::{FixedQueue, Mailq, QueueProbe};
pub use server::{CommandHandler, ControlServer, CounterHandler};

/// Default command socket
pub const DEFAULT_LISTEN: &str = "unix:/var/run/mlogtail.sock";
