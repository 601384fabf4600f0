//! Daemon configuration: a RON file overridden by command line flags

use std::path::{Path, PathBuf};

use anyhow::Context;
use mlogtail_common::internal;
use mlogtail_control::{DEFAULT_LISTEN, Endpoint, SocketOptions, endpoint::parse_mode};
use mlogtail_http::HttpConfig;
use mlogtail_stats::LogFormat;
use mlogtail_tail::TailConfig;
use serde::Deserialize;

use crate::cli::Cli;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "MLOGTAIL_CONFIG";

const DEFAULT_LOG: &str = "/var/log/mail.log";
const DEFAULT_MODE: &str = "666";

/// Everything the daemon and the client need to know
///
/// ```ron
/// (
///     file: "/var/log/maillog",
///     listen: "unix:/run/mlogtail.sock",
///     owner: Some("root:adm"),
///     mode: "660",
///     http: Some((listen_address: "127.0.0.1:8080")),
///     init_from_file: true,
///     tail: (poll_interval: 500),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Mail log path, `-` for standard input
    pub file: PathBuf,
    /// Command socket
    pub listen: String,
    /// Socket file `OWNER[:GROUP]`
    pub owner: Option<String>,
    /// Socket file permissions as octal digits
    pub mode: String,
    pub log_type: LogFormat,
    /// JSON view over HTTP; off unless set
    pub http: Option<HttpConfig>,
    /// Count the existing file contents before following
    pub init_from_file: bool,
    /// Program listing the mail queue
    pub mailq: String,
    pub tail: TailConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            file: PathBuf::from(DEFAULT_LOG),
            listen: DEFAULT_LISTEN.to_string(),
            owner: None,
            mode: DEFAULT_MODE.to_string(),
            log_type: LogFormat::default(),
            http: None,
            init_from_file: false,
            mailq: mlogtail_control::queue::MAILQ.to_string(),
            tail: TailConfig::default(),
        }
    }
}

impl Config {
    /// Load the configuration file, or the defaults if there is none
    ///
    /// An explicit `path` must exist. Otherwise the file is looked up in this
    /// order:
    /// 1. `MLOGTAIL_CONFIG` environment variable
    /// 2. `./mlogtail.config.ron`
    /// 3. `/etc/mlogtail/mlogtail.config.ron`
    ///
    /// # Errors
    ///
    /// Returns an error if a named file is missing, unreadable or not valid
    /// RON.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match find_config_file()? {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };

        Self::from_file(&path)
    }

    /// Parse one RON configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config = ron::from_str(&content)
            .with_context(|| format!("Invalid config in {}", path.display()))?;

        internal!(level = DEBUG, "Loaded configuration from {}", path.display());

        Ok(config)
    }

    /// Flags given on the command line win over the file
    pub fn merge_cli(&mut self, cli: &Cli) {
        if let Some(file) = &cli.file {
            self.file.clone_from(file);
        }
        if let Some(listen) = &cli.listen {
            self.listen.clone_from(listen);
        }
        if let Some(owner) = &cli.owner {
            self.owner = Some(owner.clone());
        }
        if let Some(mode) = &cli.socket_mode {
            self.mode.clone_from(mode);
        }
        if let Some(log_type) = cli.log_type {
            self.log_type = log_type;
        }
        if let Some(address) = &cli.http {
            match &mut self.http {
                Some(http) => http.listen_address.clone_from(address),
                None => self.http = Some(HttpConfig::new(address.clone())),
            }
        }
        self.init_from_file |= cli.init_from_file;
    }

    /// The command socket address
    ///
    /// # Errors
    ///
    /// Returns an error if `listen` is neither `unix:PATH` nor `HOST:PORT`.
    pub fn endpoint(&self) -> mlogtail_control::Result<Endpoint> {
        self.listen.parse()
    }

    /// Socket file options; an invalid mode falls back to `666`
    pub fn socket_options(&self) -> SocketOptions {
        let mode = parse_mode(&self.mode).unwrap_or_else(|e| {
            internal!(
                level = WARN,
                "{e}: file mode cannot be greater than 777, it is set to {DEFAULT_MODE}"
            );
            SocketOptions::default().mode
        });

        SocketOptions {
            mode,
            owner: self.owner.clone(),
        }
    }
}

fn find_config_file() -> anyhow::Result<Option<PathBuf>> {
    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(Some(path));
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    Ok([
        PathBuf::from("./mlogtail.config.ron"),
        PathBuf::from("/etc/mlogtail/mlogtail.config.ron"),
    ]
    .into_iter()
    .find(|path| path.exists()))
}
