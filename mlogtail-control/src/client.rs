//! Client for the command socket

use std::time::Duration;

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpStream, UnixStream},
};
use tracing::debug;

use crate::{ControlError, Endpoint, Result, protocol::MAX_REPLY_SIZE};

/// Sends one command per connection and returns the raw reply text
#[derive(Debug, Clone)]
pub struct ControlClient {
    endpoint: Endpoint,
    timeout: Duration,
}

impl ControlClient {
    #[must_use]
    pub const fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            timeout: Duration::from_secs(10),
        }
    }

    /// Set the timeout for the whole exchange
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Send `command` and return the reply, at most 2048 bytes of it
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Connect`] if the daemon cannot be reached,
    /// [`ControlError::Timeout`] if it does not answer in time.
    pub async fn send(&self, command: &str) -> Result<String> {
        tokio::time::timeout(self.timeout, self.exchange(command))
            .await
            .map_err(|_| ControlError::Timeout)?
    }

    async fn exchange(&self, command: &str) -> Result<String> {
        debug!("Connecting to command socket: {}", self.endpoint);
        let connect_error = |source| ControlError::Connect {
            endpoint: self.endpoint.to_string(),
            source,
        };

        match &self.endpoint {
            Endpoint::Unix(path) => {
                let stream = UnixStream::connect(path).await.map_err(connect_error)?;
                round_trip(stream, command).await
            }
            Endpoint::Tcp(address) => {
                let stream = TcpStream::connect(address.as_str())
                    .await
                    .map_err(connect_error)?;
                round_trip(stream, command).await
            }
        }
    }
}

async fn round_trip<S>(mut stream: S, command: &str) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(command.as_bytes()).await?;
    stream.shutdown().await?;

    let mut reply = Vec::with_capacity(256);
    stream
        .take(MAX_REPLY_SIZE as u64)
        .read_to_end(&mut reply)
        .await?;

    Ok(String::from_utf8_lossy(&reply).into_owned())
}
