use std::sync::Arc;

use mlogtail_common::{incoming, internal};
use mlogtail_stats::{Classifier, CounterStore, Outcome};
use tokio::{
    fs::File,
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader},
};

use crate::{Result, TailError, TailSource};

/// Sole writer of the counter store: classifies lines and applies the outcomes
#[derive(Debug, Clone)]
pub struct Aggregator {
    store: Arc<CounterStore>,
    classifier: Arc<Classifier>,
}

impl Aggregator {
    #[must_use]
    pub const fn new(store: Arc<CounterStore>, classifier: Arc<Classifier>) -> Self {
        Self { store, classifier }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<CounterStore> {
        &self.store
    }

    /// Classify one line and count it; unmatched lines are a no-op
    pub fn ingest(&self, line: &str) -> Option<Outcome> {
        let outcome = self.classifier.classify(line)?;
        incoming!("{} <- {line}", outcome.counter);
        self.store.apply(&outcome);
        Some(outcome)
    }

    /// Count every line of `reader`, returning how many lines were read
    ///
    /// # Errors
    ///
    /// Returns the first read error; lines before it stay counted.
    pub async fn ingest_reader<R: AsyncBufRead + Unpin>(&self, mut reader: R) -> Result<u64> {
        let mut lines = 0;
        let mut buffer = Vec::new();

        while reader.read_until(b'\n', &mut buffer).await? > 0 {
            self.ingest(&String::from_utf8_lossy(&buffer));
            buffer.clear();
            lines += 1;
        }

        Ok(lines)
    }

    /// Seed the counters with the part of the file written before live
    /// following started
    ///
    /// Reads `source`'s file from offset zero up to its replay bound, so no
    /// line is counted both here and by [`Aggregator::run`]. Progress is logged
    /// every `progress_every` lines.
    ///
    /// # Errors
    ///
    /// [`TailError::ReplayUnsupported`] for standard input, otherwise any error
    /// opening or reading the file.
    pub async fn replay(&self, source: &TailSource, progress_every: u64) -> Result<u64> {
        let (Some(path), Some(bound)) = (source.path(), source.replay_bound()) else {
            return Err(TailError::ReplayUnsupported);
        };

        internal!(
            level = INFO,
            "Initializing counters from log file {}...",
            path.display()
        );

        let file = File::open(path)
            .await
            .map_err(|source| TailError::SourceUnavailable {
                path: path.to_path_buf(),
                source,
            })?;
        let mut reader = BufReader::with_capacity(64 * 1024, file.take(bound));

        let mut lines: u64 = 0;
        let mut buffer = Vec::new();
        while reader.read_until(b'\n', &mut buffer).await? > 0 {
            self.ingest(&String::from_utf8_lossy(&buffer));
            buffer.clear();
            lines += 1;

            if progress_every > 0 && lines % progress_every == 0 {
                internal!(level = INFO, "Processed {lines} lines...");
            }
        }

        internal!(
            level = INFO,
            "Initialization complete: processed {lines} lines"
        );

        Ok(lines)
    }

    /// Pull lines from `source` until it is exhausted
    ///
    /// A followed file is never exhausted, so for files this only returns on
    /// error.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails in a way it cannot recover from.
    pub async fn run(&self, mut source: TailSource) -> Result<u64> {
        let mut lines = 0;

        while let Some(line) = source.next_line().await? {
            self.ingest(&line);
            lines += 1;
        }

        internal!(level = INFO, "Log source exhausted after {lines} lines");

        Ok(lines)
    }
}
