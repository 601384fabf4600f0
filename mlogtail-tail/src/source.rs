//! Log sources: a followed file, or standard input

use std::{
    io::{ErrorKind, SeekFrom},
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
    time::Duration,
};

use mlogtail_common::internal;
use serde::Deserialize;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader, Stdin},
};

use crate::{Result, TailError};

/// Path that selects standard input instead of a file
pub const STDIN_PATH: &str = "-";

/// Tuning knobs for following the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TailConfig {
    /// How long to wait at end of file before looking for new data
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Report replay progress every this many lines
    pub progress_every: u64,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            progress_every: 10_000,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Identity of the file behind a path; a change means the file was replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Identity {
    dev: u64,
    ino: u64,
}

impl Identity {
    fn of(metadata: &std::fs::Metadata) -> Self {
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }
}

/// What the path looks like after we hit end of file
#[derive(Debug)]
enum Rotation {
    /// Same file, no shorter than what we consumed: just wait
    Unchanged,
    /// Same file, cut below our offset (copytruncate)
    Truncated,
    /// Another file now lives at the path
    Replaced(File, Identity),
    /// Nothing at the path; the logger has not recreated it yet
    Missing,
}

/// Split a complete line off the buffer, dropping the terminator
fn take_line(buffer: &mut Vec<u8>) -> String {
    let mut bytes = std::mem::take(buffer);
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
    }
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Offset just past the last newline before `end`, or 0 if there is none
#[allow(clippy::cast_possible_truncation)]
async fn last_line_start(file: &mut File, end: u64) -> std::io::Result<u64> {
    const CHUNK: u64 = 4096;

    let mut chunk = vec![0u8; CHUNK as usize];
    let mut upper = end;
    while upper > 0 {
        let lower = upper.saturating_sub(CHUNK);
        let chunk = &mut chunk[..(upper - lower) as usize];
        file.seek(SeekFrom::Start(lower)).await?;
        file.read_exact(chunk).await?;
        if let Some(at) = chunk.iter().rposition(|b| *b == b'\n') {
            return Ok(lower + at as u64 + 1);
        }
        upper = lower;
    }

    Ok(0)
}

/// A file followed across truncation and replacement
#[derive(Debug)]
pub struct FileTail {
    path: PathBuf,
    reader: BufReader<File>,
    identity: Identity,
    /// Bytes consumed from the current file
    offset: u64,
    /// Where live following began in the first file
    replay_bound: u64,
    /// Bytes of a line whose newline has not been written yet
    partial: Vec<u8>,
    /// Set while the path is missing, so the gap is reported once
    in_gap: bool,
    /// File found at the path, switched to once the current one is drained
    next_file: Option<(File, Identity)>,
    poll_interval: Duration,
}

impl FileTail {
    /// Open `path` and position at its current end
    ///
    /// An unterminated last line is left for the live tail, so following
    /// starts at the beginning of that line.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::SourceUnavailable`] if the file cannot be opened
    /// or inspected.
    pub async fn open(path: impl Into<PathBuf>, config: TailConfig) -> Result<Self> {
        let path = path.into();
        let unavailable = |source| TailError::SourceUnavailable {
            path: path.clone(),
            source,
        };

        let mut file = File::open(&path).await.map_err(unavailable)?;
        let metadata = file.metadata().await.map_err(unavailable)?;
        let start = last_line_start(&mut file, metadata.len())
            .await
            .map_err(unavailable)?;

        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(start))
            .await
            .map_err(unavailable)?;

        internal!(
            level = DEBUG,
            "Following {} from offset {start}",
            path.display()
        );

        Ok(Self {
            path,
            reader,
            identity: Identity::of(&metadata),
            offset: start,
            replay_bound: start,
            partial: Vec::new(),
            in_gap: false,
            next_file: None,
            poll_interval: config.poll_interval,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset at which live following started; replay stops here
    #[must_use]
    pub const fn replay_bound(&self) -> u64 {
        self.replay_bound
    }

    /// Wait for and return the next complete line
    ///
    /// This never reports end of input: at end of file it polls the path for
    /// growth, truncation or replacement. A replaced file is read to its end
    /// before switching, and a line left unterminated in it is returned before
    /// the first line of the new file. While the path is missing the old file
    /// keeps being read.
    ///
    /// # Errors
    ///
    /// Only seeking back to the start of a truncated file can fail.
    pub async fn next_line(&mut self) -> Result<String> {
        loop {
            match self.reader.read_until(b'\n', &mut self.partial).await {
                Ok(0) => {}
                Ok(n) => {
                    self.offset += n as u64;
                    if self.partial.last() == Some(&b'\n') {
                        return Ok(take_line(&mut self.partial));
                    }
                    continue;
                }
                Err(e) => {
                    internal!(
                        level = WARN,
                        "Error reading {}: {e}",
                        self.path.display()
                    );
                }
            }

            if let Some((file, identity)) = self.next_file.take() {
                internal!(
                    level = INFO,
                    "{} was replaced, reopening",
                    self.path.display()
                );
                self.reader = BufReader::new(file);
                self.identity = identity;
                self.offset = 0;
                if !self.partial.is_empty() {
                    return Ok(take_line(&mut self.partial));
                }
                continue;
            }

            match self.check_rotation().await {
                Rotation::Unchanged | Rotation::Missing => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                Rotation::Truncated => {
                    internal!(
                        level = INFO,
                        "{} was truncated, reading from the start",
                        self.path.display()
                    );
                    self.reader.seek(SeekFrom::Start(0)).await?;
                    self.offset = 0;
                    if !self.partial.is_empty() {
                        return Ok(take_line(&mut self.partial));
                    }
                }
                // Lines may have landed in the old file since the last read
                Rotation::Replaced(file, identity) => {
                    self.next_file = Some((file, identity));
                }
            }
        }
    }

    async fn check_rotation(&mut self) -> Rotation {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                if !self.in_gap {
                    self.in_gap = true;
                    if e.kind() == ErrorKind::NotFound {
                        internal!(
                            level = DEBUG,
                            "{} disappeared, waiting for it to come back",
                            self.path.display()
                        );
                    } else {
                        internal!(
                            level = WARN,
                            "Cannot stat {}: {e}",
                            self.path.display()
                        );
                    }
                }
                return Rotation::Missing;
            }
        };

        let identity = Identity::of(&metadata);
        if identity == self.identity {
            self.in_gap = false;
            return if metadata.len() < self.offset {
                Rotation::Truncated
            } else {
                Rotation::Unchanged
            };
        }

        match File::open(&self.path).await {
            Ok(file) => {
                self.in_gap = false;
                // Identity of the handle actually opened, in case the path
                // moved again between stat and open
                let identity = match file.metadata().await {
                    Ok(metadata) => Identity::of(&metadata),
                    Err(_) => identity,
                };
                Rotation::Replaced(file, identity)
            }
            Err(e) => {
                if !self.in_gap {
                    self.in_gap = true;
                    internal!(
                        level = WARN,
                        "Cannot reopen {}: {e}",
                        self.path.display()
                    );
                }
                Rotation::Missing
            }
        }
    }
}

/// Standard input, read once until EOF
#[derive(Debug)]
pub struct StdinTail {
    reader: BufReader<Stdin>,
    buffer: Vec<u8>,
}

impl StdinTail {
    #[must_use]
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            buffer: Vec::new(),
        }
    }

    /// The next line, or `None` once input is exhausted
    ///
    /// # Errors
    ///
    /// Returns an error if reading standard input fails.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        let n = self.reader.read_until(b'\n', &mut self.buffer).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(take_line(&mut self.buffer)))
    }
}

impl Default for StdinTail {
    fn default() -> Self {
        Self::new()
    }
}

/// Where log lines come from
#[derive(Debug)]
pub enum TailSource {
    File(FileTail),
    Stdin(StdinTail),
}

impl TailSource {
    /// Open the log at `path`; [`STDIN_PATH`] selects standard input
    ///
    /// # Errors
    ///
    /// Returns [`TailError::SourceUnavailable`] if the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>, config: TailConfig) -> Result<Self> {
        let path = path.as_ref();
        if path == Path::new(STDIN_PATH) {
            return Ok(Self::Stdin(StdinTail::new()));
        }

        FileTail::open(path, config).await.map(Self::File)
    }

    /// The next line; `None` only when standard input is exhausted
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails in a way that cannot be
    /// recovered by reopening the file.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        match self {
            Self::File(file) => file.next_line().await.map(Some),
            Self::Stdin(stdin) => stdin.next_line().await,
        }
    }

    /// The file path, if this source is a file
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(file) => Some(file.path()),
            Self::Stdin(_) => None,
        }
    }

    /// Offset replay should stop at; `None` for standard input
    #[must_use]
    pub const fn replay_bound(&self) -> Option<u64> {
        match self {
            Self::File(file) => Some(file.replay_bound()),
            Self::Stdin(_) => None,
        }
    }
}
