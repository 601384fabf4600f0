//! HTTP server configuration

use std::time::Duration;

use serde::Deserialize;

/// Where and how the HTTP view is served
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpConfig {
    /// Address to bind, e.g. `127.0.0.1:8080` or `[::]:8080`
    pub listen_address: String,

    /// Upper bound on handling one request, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    5
}

impl HttpConfig {
    #[must_use]
    pub fn new(listen_address: impl Into<String>) -> Self {
        Self {
            listen_address: listen_address.into(),
            timeout_secs: default_timeout_secs(),
        }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
