//! Command socket server

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use mlogtail_common::{Signal, incoming, outgoing};
use mlogtail_stats::CounterStore;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpListener, TcpStream, UnixListener, UnixStream},
    sync::broadcast,
};
use tracing::{debug, error, info, trace, warn};

use crate::{
    Command, ControlError, Endpoint, QueueProbe, Reply, Result, SocketOptions,
    endpoint::apply_options, protocol::MAX_REQUEST_SIZE,
};

/// How long a client may take to send its command or accept the reply
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Turns a command word into a reply
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle one trimmed command; never fails, errors become [`Reply::Error`]
    async fn handle(&self, command: &str) -> Reply;
}

/// The daemon's handler: answers from the shared counter store
pub struct CounterHandler {
    store: Arc<CounterStore>,
    queue: Arc<dyn QueueProbe>,
}

impl CounterHandler {
    pub fn new(store: Arc<CounterStore>, queue: Arc<dyn QueueProbe>) -> Self {
        Self { store, queue }
    }
}

#[async_trait]
impl CommandHandler for CounterHandler {
    async fn handle(&self, command: &str) -> Reply {
        match command.parse::<Command>() {
            Ok(Command::Stats) => {
                let snapshot = self.store.snapshot();
                Reply::Stats {
                    snapshot,
                    queue_size: self.queue.queue_size().await,
                }
            }
            Ok(Command::StatsReset) => {
                // Drain first so no increment lands between reading and zeroing;
                // the queue probe may be slow and runs outside the store lock.
                let snapshot = self.store.reset_all();
                Reply::Stats {
                    snapshot,
                    queue_size: self.queue.queue_size().await,
                }
            }
            Ok(Command::Reset) => {
                self.store.reset_all();
                Reply::Ok
            }
            Ok(Command::Counter(name)) => Reply::Value(self.store.value(name)),
            Err(e) => Reply::error(e.to_string()),
        }
    }
}

/// Unlinks a Unix socket file when the listener goes away
#[derive(Debug)]
struct SocketFileGuard {
    path: PathBuf,
}

impl Drop for SocketFileGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed socket file: {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Cannot remove socket file {}: {e}", self.path.display()),
        }
    }
}

enum Listener {
    Unix {
        listener: UnixListener,
        _guard: SocketFileGuard,
    },
    Tcp(TcpListener),
}

enum Connection {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Listener {
    async fn accept(&self) -> std::io::Result<Connection> {
        match self {
            Self::Unix { listener, .. } => {
                listener.accept().await.map(|(s, _)| Connection::Unix(s))
            }
            Self::Tcp(listener) => listener.accept().await.map(|(s, peer)| {
                trace!("Accepted command connection from {peer}");
                Connection::Tcp(s)
            }),
        }
    }
}

/// Accepts command connections and answers each with one reply
pub struct ControlServer {
    endpoint: Endpoint,
    listener: Listener,
    handler: Arc<dyn CommandHandler>,
}

impl ControlServer {
    /// Bind the command endpoint
    ///
    /// A leftover Unix socket file that nobody answers on is removed first;
    /// one that still accepts connections means another daemon is running.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Bind`] if the endpoint cannot be bound or is in
    /// use by a running instance.
    pub async fn bind(
        endpoint: &Endpoint,
        options: &SocketOptions,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<Self> {
        let bind_error = |source| ControlError::Bind {
            endpoint: endpoint.to_string(),
            source,
        };

        let (listener, bound) = match endpoint {
            Endpoint::Unix(path) => {
                remove_stale_socket(path).await.map_err(bind_error)?;
                let listener = UnixListener::bind(path).map_err(bind_error)?;
                let guard = SocketFileGuard { path: path.clone() };
                apply_options(path, options);
                (
                    Listener::Unix {
                        listener,
                        _guard: guard,
                    },
                    endpoint.clone(),
                )
            }
            Endpoint::Tcp(address) => {
                let listener = TcpListener::bind(address.as_str())
                    .await
                    .map_err(bind_error)?;
                let local = listener.local_addr().map_err(bind_error)?;
                (Listener::Tcp(listener), Endpoint::Tcp(local.to_string()))
            }
        };

        info!("Command socket listening on {bound}");

        Ok(Self {
            endpoint: bound,
            listener,
            handler,
        })
    }

    /// The bound endpoint; for TCP this carries the actual port
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Serve connections until a shutdown signal arrives
    ///
    /// The Unix socket file is removed when this returns.
    pub async fn serve(self, mut shutdown: broadcast::Receiver<Signal>) {
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok(connection) => {
                            let handler = Arc::clone(&self.handler);
                            tokio::spawn(async move {
                                let result = match connection {
                                    Connection::Unix(stream) => handle_connection(stream, handler).await,
                                    Connection::Tcp(stream) => handle_connection(stream, handler).await,
                                };
                                match result {
                                    Ok(()) => {}
                                    Err(ControlError::ConnectionClosed) => {
                                        debug!("Client disconnected without a command");
                                    }
                                    Err(e) => warn!("Error handling command connection: {e}"),
                                }
                            });
                        }
                        Err(e) => error!("Error accepting command connection: {e}"),
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown) => info!("Command server shutting down"),
                        Err(e) => error!("Command server shutdown channel error: {e}"),
                    }
                    break;
                }
            }
        }
    }
}

async fn remove_stale_socket(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        return Ok(());
    }

    if UnixStream::connect(path).await.is_ok() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            "socket already in use by a running instance",
        ));
    }

    info!("Removing stale socket file: {}", path.display());
    tokio::fs::remove_file(path).await
}

/// Read one command, write one reply, close
async fn handle_connection<S>(mut stream: S, handler: Arc<dyn CommandHandler>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; MAX_REQUEST_SIZE];
    let read = tokio::time::timeout(REQUEST_TIMEOUT, stream.read(&mut buf))
        .await
        .map_err(|_| ControlError::Timeout)??;
    if read == 0 {
        return Err(ControlError::ConnectionClosed);
    }

    let command = String::from_utf8_lossy(&buf[..read]);
    let command = command.trim();
    incoming!("Received command: {command:?}");

    let reply = handler.handle(command).await;
    if !reply.is_success() {
        debug!("Rejected command {command:?}");
    }

    let reply = reply.to_string();
    outgoing!("Sending reply: {reply:?}");

    tokio::time::timeout(REQUEST_TIMEOUT, stream.write_all(reply.as_bytes()))
        .await
        .map_err(|_| ControlError::Timeout)??;
    let _ = stream.shutdown().await;

    Ok(())
}
