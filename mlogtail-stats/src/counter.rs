use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use crate::StatsError;

/// The closed set of counters kept by the daemon.
///
/// The declaration order is the wire order used by every `stats` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CounterName {
    BytesReceived,
    BytesDelivered,
    Received,
    Delivered,
    Forwarded,
    Deferred,
    Bounced,
    Rejected,
    Held,
    Discarded,
}

impl CounterName {
    pub const COUNT: usize = 10;

    pub const ALL: [Self; Self::COUNT] = [
        Self::BytesReceived,
        Self::BytesDelivered,
        Self::Received,
        Self::Delivered,
        Self::Forwarded,
        Self::Deferred,
        Self::Bounced,
        Self::Rejected,
        Self::Held,
        Self::Discarded,
    ];

    /// The name as it appears on the command socket
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BytesReceived => "bytes-received",
            Self::BytesDelivered => "bytes-delivered",
            Self::Received => "received",
            Self::Delivered => "delivered",
            Self::Forwarded => "forwarded",
            Self::Deferred => "deferred",
            Self::Bounced => "bounced",
            Self::Rejected => "rejected",
            Self::Held => "held",
            Self::Discarded => "discarded",
        }
    }

    /// Slot of this counter in the store's backing array
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// All wire names joined with `|`, for usage messages
    #[must_use]
    pub fn names() -> String {
        Self::ALL.map(Self::as_str).join("|")
    }
}

impl Display for CounterName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CounterName {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| StatsError::UnknownCounter(s.to_string()))
    }
}
