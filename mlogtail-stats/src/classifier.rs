//! Mail log line classification
//!
//! Every Postfix log line carries a syslog prefix, the emitting service
//! (`postfix/qmgr[1234]:`) and a free text payload. The classifier splits the
//! line into subsystem and payload, then walks an ordered rule table; the first
//! rule whose subsystem and pattern both match decides the outcome.

use std::{fmt::Display, str::FromStr};

use regex::Regex;
use serde::Deserialize;

use crate::{CounterName, Result, StatsError};

/// Matches the service tag in both traditional and RFC 3339 syslog lines, e.g.
/// `Oct 19 10:00:00 mx postfix/smtpd[42]: ...` or
/// `2026-10-19T10:00:00.000+00:00 mx postfix-out/submission/smtpd[42]: ...`.
const HEADER: &str = r"^.*?\bpostfix(?:-[\w.-]+)?/(?P<service>[\w./-]+)\[\d+\]:\s+(?P<payload>.*?)\s*$";

const SIZE: &str = r"\bsize=(\d+)";

/// Which mail transfer agent wrote the log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Postfix,
}

impl FromStr for LogFormat {
    type Err = StatsError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postfix" => Ok(Self::Postfix),
            _ => Err(StatsError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postfix => f.write_str("postfix"),
        }
    }
}

/// The counters one log line contributes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub counter: CounterName,
    pub size: Option<(CounterName, u64)>,
}

impl Outcome {
    #[must_use]
    pub const fn new(counter: CounterName) -> Self {
        Self {
            counter,
            size: None,
        }
    }

    /// `(counter, delta)` pairs to add to the store
    pub fn deltas(&self) -> impl Iterator<Item = (CounterName, u64)> {
        std::iter::once((self.counter, 1)).chain(self.size)
    }
}

/// One entry of the rule table
#[derive(Debug)]
pub struct Rule {
    pub name: &'static str,
    /// Only lines from this service (last path segment) are considered
    pub subsystem: Option<&'static str>,
    pub pattern: Regex,
    pub counter: CounterName,
    /// Where a `size=N` found in the payload is added, if anywhere
    pub size_into: Option<CounterName>,
}

impl Rule {
    fn new(
        name: &'static str,
        subsystem: Option<&'static str>,
        pattern: &str,
        counter: CounterName,
        size_into: Option<CounterName>,
    ) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| StatsError::InvalidRule {
            rule: name,
            reason: e.to_string(),
        })?;

        Ok(Self {
            name,
            subsystem,
            pattern,
            counter,
            size_into,
        })
    }

    #[must_use]
    pub fn matches(&self, subsystem: &str, payload: &str) -> bool {
        self.subsystem.is_none_or(|s| s == subsystem) && self.pattern.is_match(payload)
    }
}

/// Ordered, immutable rule table for one log format
#[derive(Debug)]
pub struct Classifier {
    header: Regex,
    size: Regex,
    rules: Vec<Rule>,
}

impl Classifier {
    /// Build the rule table for `format`
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::InvalidRule`] if a pattern does not compile.
    pub fn new(format: LogFormat) -> Result<Self> {
        let rules = match format {
            LogFormat::Postfix => postfix_rules()?,
        };

        let compile = |rule: &'static str, pattern: &str| {
            Regex::new(pattern).map_err(|e| StatsError::InvalidRule {
                rule,
                reason: e.to_string(),
            })
        };

        Ok(Self {
            header: compile("header", HEADER)?,
            size: compile("size", SIZE)?,
            rules,
        })
    }

    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Split a line into its service name and payload
    ///
    /// Multi-level service names such as `submission/smtpd` are reduced to
    /// their final segment.
    #[must_use]
    pub fn split<'l>(&self, line: &'l str) -> Option<(&'l str, &'l str)> {
        let captures = self.header.captures(line)?;
        let service = captures.name("service")?.as_str();
        let payload = captures.name("payload")?.as_str();
        let subsystem = service.rsplit('/').next().unwrap_or(service);

        Some((subsystem, payload))
    }

    /// The first rule matching `line`, if any
    #[must_use]
    pub fn rule_for(&self, line: &str) -> Option<&Rule> {
        let (subsystem, payload) = self.split(line)?;
        self.rules
            .iter()
            .find(|rule| rule.matches(subsystem, payload))
    }

    /// Classify one log line; lines that match no rule yield `None`
    #[must_use]
    pub fn classify(&self, line: &str) -> Option<Outcome> {
        let (subsystem, payload) = self.split(line)?;
        let rule = self
            .rules
            .iter()
            .find(|rule| rule.matches(subsystem, payload))?;

        let size = rule.size_into.and_then(|target| {
            self.size
                .captures(payload)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .map(|bytes| (target, bytes))
        });

        Some(Outcome {
            counter: rule.counter,
            size,
        })
    }
}

fn postfix_rules() -> Result<Vec<Rule>> {
    use CounterName::{
        Bounced, BytesDelivered, BytesReceived, Deferred, Delivered, Discarded, Forwarded, Held,
        Received, Rejected,
    };

    Ok(vec![
        // qmgr logs the envelope sender and size when it takes the message
        // into the active queue. It logs the same line again each time a
        // deferred message is retried, and each of those is counted too.
        Rule::new(
            "received",
            Some("qmgr"),
            r"^[0-9A-Za-z]+: from=<[^>]*>, size=\d+",
            Received,
            Some(BytesReceived),
        )?,
        // local(8) handing the message on through an alias or .forward file;
        // must precede the generic sent rule
        Rule::new(
            "forwarded",
            None,
            r"\bstatus=sent \(.*\bforwarded as\b",
            Forwarded,
            None,
        )?,
        Rule::new(
            "delivered",
            None,
            r"\bstatus=sent\b",
            Delivered,
            Some(BytesDelivered),
        )?,
        Rule::new("deferred", None, r"\bstatus=deferred\b", Deferred, None)?,
        Rule::new(
            "bounced",
            None,
            r"\bstatus=(?:bounced|expired)\b",
            Bounced,
            None,
        )?,
        // smtpd/postscreen/cleanup/milter rejects, before or after NOQUEUE
        Rule::new("rejected", None, r"\breject:", Rejected, None)?,
        Rule::new("held", None, r"\bhold:", Held, None)?,
        Rule::new("discarded", None, r"\bdiscard:", Discarded, None)?,
    ])
}
