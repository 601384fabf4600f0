//! Mail queue size probes

use async_trait::async_trait;
use tracing::debug;

/// Default queue listing program
pub const MAILQ: &str = "mailq";

/// Source of the current mail queue length
#[async_trait]
pub trait QueueProbe: Send + Sync {
    /// Number of queued messages; `0` when the queue cannot be inspected
    async fn queue_size(&self) -> u64;
}

/// Runs `mailq` and counts the queue entries in its output
#[derive(Debug, Clone)]
pub struct Mailq {
    program: String,
}

impl Mailq {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for Mailq {
    fn default() -> Self {
        Self::new(MAILQ)
    }
}

#[async_trait]
impl QueueProbe for Mailq {
    async fn queue_size(&self) -> u64 {
        let output = match tokio::process::Command::new(&self.program)
            .stdin(std::process::Stdio::null())
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                debug!("Cannot run {}: {e}", self.program);
                return 0;
            }
        };

        if !output.status.success() {
            debug!("{} exited with {}", self.program, output.status);
            return 0;
        }

        count_queue_ids(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Lines starting with a hex queue id, one per queued message
#[must_use]
pub fn count_queue_ids(listing: &str) -> u64 {
    listing
        .lines()
        .filter(|line| {
            line.bytes()
                .next()
                .is_some_and(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
        })
        .count() as u64
}

/// A queue probe that always reports the same size
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixedQueue(pub u64);

#[async_trait]
impl QueueProbe for FixedQueue {
    async fn queue_size(&self) -> u64 {
        self.0
    }
}
