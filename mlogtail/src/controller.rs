use std::{path::Path, sync::Arc};

use anyhow::Context;
use futures_util::future::join_all;
use mlogtail_common::{Signal, internal};
use mlogtail_control::{
    Command, ControlClient, ControlError, ControlServer, CounterHandler, Mailq, QueueProbe,
};
use mlogtail_http::{HttpServer, HttpState};
use mlogtail_stats::{Classifier, CounterStore, LogFormat, Snapshot};
use mlogtail_tail::{Aggregator, STDIN_PATH, TailSource};
use tokio::{
    fs::File,
    io::BufReader,
    signal::unix::{self, SignalKind, signal},
    sync::broadcast,
    task::JoinHandle,
};

use crate::config::Config;

/// The long running tail process
pub struct Daemon {
    config: Config,
    queue: Arc<dyn QueueProbe>,
    shutdown: broadcast::Sender<Signal>,
}

impl Daemon {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let queue: Arc<dyn QueueProbe> = Arc::new(Mailq::new(config.mailq.clone()));
        let (shutdown, _) = broadcast::channel(16);
        Self {
            config,
            queue,
            shutdown,
        }
    }

    /// Use a different mail queue probe
    #[must_use]
    pub fn with_queue(mut self, queue: Arc<dyn QueueProbe>) -> Self {
        self.queue = queue;
        self
    }

    /// Sending [`Signal::Shutdown`] here stops the daemon like SIGTERM does
    #[must_use]
    pub fn shutdown_sender(&self) -> broadcast::Sender<Signal> {
        self.shutdown.clone()
    }

    /// Run until SIGINT, SIGTERM or a shutdown signal
    ///
    /// # Errors
    ///
    /// Fails if the command socket, the HTTP server or the log source cannot
    /// be set up, or if following the log fails later on.
    pub async fn run(self) -> anyhow::Result<()> {
        let mut stop = self.shutdown.subscribe();
        let mut terminate = signal(SignalKind::terminate())?;

        internal!(
            level = INFO,
            "mlogtail {} starting, following {}",
            env!("CARGO_PKG_VERSION"),
            self.config.file.display()
        );

        let classifier = Arc::new(Classifier::new(self.config.log_type)?);
        let store = Arc::new(CounterStore::new());

        let endpoint = self.config.endpoint()?;
        let handler = Arc::new(CounterHandler::new(
            Arc::clone(&store),
            Arc::clone(&self.queue),
        ));
        let control = ControlServer::bind(&endpoint, &self.config.socket_options(), handler)
            .await
            .context("Cannot start the command server")?;

        let http = match &self.config.http {
            Some(config) => Some(
                HttpServer::bind(
                    config,
                    HttpState::new(Arc::clone(&store), Arc::clone(&self.queue)),
                )
                .await?,
            ),
            None => None,
        };

        let source = TailSource::open(&self.config.file, self.config.tail)
            .await
            .context("Cannot open the mail log")?;

        let mut servers: Vec<JoinHandle<()>> =
            vec![tokio::spawn(control.serve(self.shutdown.subscribe()))];
        if let Some(http) = http {
            let receiver = self.shutdown.subscribe();
            servers.push(tokio::spawn(async move {
                if let Err(e) = http.serve(receiver).await {
                    internal!(level = ERROR, "{e}");
                }
            }));
        }

        let aggregator = Aggregator::new(store, classifier);
        let init_from_file = self.config.init_from_file;
        let progress_every = self.config.tail.progress_every;
        let follow = async move {
            if init_from_file
                && let Err(e) = aggregator.replay(&source, progress_every).await
            {
                internal!(level = WARN, "Cannot initialize counters from log file: {e}");
            }

            internal!(level = INFO, "Tailing started");
            aggregator.run(source).await
        };

        let result = tokio::select! {
            r = follow => match r {
                Ok(_) => {
                    wait_for_shutdown(&mut stop, &mut terminate).await;
                    Ok(())
                }
                Err(e) => Err(anyhow::Error::from(e).context("Following the mail log failed")),
            },
            () = wait_for_shutdown(&mut stop, &mut terminate) => Ok(()),
        };

        internal!(level = INFO, "Shutting down...");
        let _ = self.shutdown.send(Signal::Shutdown);

        for joined in join_all(servers).await {
            if let Err(e) = joined {
                internal!(level = ERROR, "Server task failed: {e}");
            }
        }

        result
    }
}

async fn wait_for_shutdown(
    stop: &mut broadcast::Receiver<Signal>,
    terminate: &mut unix::Signal,
) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "Interrupt received, shutting down");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate signal received, shutting down");
        }
        sig = stop.recv() => {
            tracing::debug!("Received {sig:?}");
        }
    }
}

/// Ask a running daemon and return its reply
///
/// # Errors
///
/// Returns [`ControlError::Connect`] if no daemon is listening.
pub async fn query(config: &Config, command: Command) -> Result<String, ControlError> {
    ControlClient::new(config.endpoint()?)
        .send(&command.to_string())
        .await
}

/// Count a whole file, or standard input, once
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub async fn parse_once(path: &Path, format: LogFormat) -> anyhow::Result<Snapshot> {
    let aggregator = Aggregator::new(
        Arc::new(CounterStore::new()),
        Arc::new(Classifier::new(format)?),
    );

    let lines = if path == Path::new(STDIN_PATH) {
        aggregator
            .ingest_reader(BufReader::new(tokio::io::stdin()))
            .await?
    } else {
        let file = File::open(path)
            .await
            .with_context(|| format!("Cannot open {}", path.display()))?;
        aggregator
            .ingest_reader(BufReader::with_capacity(64 * 1024, file))
            .await
            .with_context(|| format!("Cannot read {}", path.display()))?
    };

    internal!(level = DEBUG, "Parsed {lines} lines");

    Ok(aggregator.store().snapshot())
}
