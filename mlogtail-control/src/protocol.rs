//! Command words and text replies
//!
//! A request is the bare command word, without framing or terminator. A reply
//! is plain text and always fits in [`MAX_REPLY_SIZE`] bytes.

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use mlogtail_stats::{CounterName, Snapshot};

use crate::ControlError;

/// Longest command the server reads
pub const MAX_REQUEST_SIZE: usize = 256;

/// Largest reply a client reads
pub const MAX_REPLY_SIZE: usize = 2048;

/// Name of the extra line appended to `stats` replies
pub const QUEUE_SIZE: &str = "queue-size";

/// A request understood by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// All counters plus the mail queue size
    Stats,
    /// All counters plus queue size, then zero the counters
    StatsReset,
    /// Zero the counters
    Reset,
    /// One counter's value
    Counter(CounterName),
}

impl Command {
    /// The non-counter command words
    pub const WORDS: [&'static str; 3] = ["stats", "stats_reset", "reset"];
}

impl FromStr for Command {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "stats" => Ok(Self::Stats),
            "stats_reset" => Ok(Self::StatsReset),
            "reset" => Ok(Self::Reset),
            other => other
                .parse::<CounterName>()
                .map(Self::Counter)
                .map_err(|_| ControlError::UnknownCommand(other.to_string())),
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stats => f.write_str("stats"),
            Self::StatsReset => f.write_str("stats_reset"),
            Self::Reset => f.write_str("reset"),
            Self::Counter(name) => f.write_str(name.as_str()),
        }
    }
}

/// The server's answer to one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Stats { snapshot: Snapshot, queue_size: u64 },
    Value(u64),
    Ok,
    Error(String),
}

impl Reply {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self, Self::Error(_))
    }
}

impl Display for Reply {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stats {
                snapshot,
                queue_size,
            } => {
                write!(f, "{snapshot}")?;
                writeln!(f, "{QUEUE_SIZE:<16}{queue_size}")
            }
            Self::Value(value) => writeln!(f, "{value}"),
            Self::Ok => writeln!(f, "OK"),
            Self::Error(message) => writeln!(f, "ERROR: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use mlogtail_stats::CounterStore;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!("stats".parse::<Command>().unwrap(), Command::Stats);
        assert_eq!("stats_reset".parse::<Command>().unwrap(), Command::StatsReset);
        assert_eq!("reset".parse::<Command>().unwrap(), Command::Reset);
        assert_eq!(
            "bytes-delivered".parse::<Command>().unwrap(),
            Command::Counter(CounterName::BytesDelivered)
        );
    }

    #[test]
    fn test_parse_tolerates_trailing_newline() {
        assert_eq!("stats\n".parse::<Command>().unwrap(), Command::Stats);
        assert_eq!(
            " held\r\n".parse::<Command>().unwrap(),
            Command::Counter(CounterName::Held)
        );
    }

    #[test]
    fn test_parse_unknown_command() {
        let err = "tail".parse::<Command>().unwrap_err();
        assert!(matches!(err, ControlError::UnknownCommand(ref c) if c == "tail"));
        assert_eq!(err.to_string(), "unknown command \"tail\"");
    }

    #[test]
    fn test_command_display_round_trips() {
        for word in Command::WORDS
            .into_iter()
            .chain(CounterName::ALL.map(CounterName::as_str))
        {
            assert_eq!(word.parse::<Command>().unwrap().to_string(), word);
        }
    }

    #[test]
    fn test_stats_reply_format() {
        let store = CounterStore::new();
        store.increment(CounterName::BytesReceived, 1000);
        store.increment(CounterName::Received, 1);

        let reply = Reply::Stats {
            snapshot: store.snapshot(),
            queue_size: 3,
        };

        assert_eq!(
            reply.to_string(),
            "bytes-received  1000\n\
             bytes-delivered 0\n\
             received        1\n\
             delivered       0\n\
             forwarded       0\n\
             deferred        0\n\
             bounced         0\n\
             rejected        0\n\
             held            0\n\
             discarded       0\n\
             queue-size      3\n"
        );
        assert!(reply.to_string().len() < MAX_REPLY_SIZE);
    }

    #[test]
    fn test_short_replies() {
        assert_eq!(Reply::Value(42).to_string(), "42\n");
        assert_eq!(Reply::Ok.to_string(), "OK\n");
        assert_eq!(Reply::error("nope").to_string(), "ERROR: nope\n");
        assert!(!Reply::error("nope").is_success());
        assert!(Reply::Ok.is_success());
    }

    #[test]
    fn test_largest_reply_fits() {
        let store = CounterStore::new();
        for name in CounterName::ALL {
            store.increment(name, u64::MAX);
        }
        let reply = Reply::Stats {
            snapshot: store.snapshot(),
            queue_size: u64::MAX,
        };
        assert!(reply.to_string().len() <= MAX_REPLY_SIZE);
    }
}
