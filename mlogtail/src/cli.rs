//! Command line interface

use std::path::PathBuf;

use clap::Parser;
use mlogtail_control::Command;
use mlogtail_stats::{CounterName, LogFormat};

/// Follow a mail log and count deliveries
#[derive(Parser, Debug)]
#[command(name = "mlogtail")]
#[command(about = "Mail log tailing counters", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Mail log file path; `-` reads from standard input [default: /var/log/mail.log]
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Command socket: unix:PATH, IPv4:PORT or [IPv6]:PORT [default: unix:/var/run/mlogtail.sock]
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Socket file OWNER[:GROUP]
    #[arg(short, long)]
    pub owner: Option<String>,

    /// Socket file permissions in octal [default: 666]
    #[arg(short = 'p', long = "mode", value_name = "MODE")]
    pub socket_mode: Option<String>,

    /// Mail log type; only `postfix` for now
    #[arg(short = 't', long)]
    pub log_type: Option<LogFormat>,

    /// Also serve the counters as JSON over HTTP at this address
    #[arg(long, value_name = "ADDR")]
    pub http: Option<String>,

    /// Count the existing log contents on startup, then keep following
    #[arg(long)]
    pub init_from_file: bool,

    /// Configuration file (RON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// tail, stats, stats_reset, reset or a counter name; with `-f` only
    /// `tail` reaches the daemon, anything else parses the file once
    pub command: Option<String>,
}

/// What this invocation should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Follow the log and serve commands
    Daemon,
    /// Ask a running daemon
    Client(Command),
    /// Count the whole file once and print the totals
    Parse,
    /// Nothing to do; print help
    Usage,
}

impl Cli {
    /// Decide the mode from the positional command and the flags given
    ///
    /// An explicit `-f` turns any client command into a one-shot parse of
    /// that file; the command word is still checked.
    ///
    /// # Errors
    ///
    /// Returns a message listing the accepted words if the command is unknown.
    pub fn mode(&self) -> Result<Mode, String> {
        match self.command.as_deref() {
            Some("tail") => Ok(Mode::Daemon),
            Some(word) => {
                let command = word.parse::<Command>().map_err(|_| {
                    format!(
                        "Command can be one of \"tail|{}|{}\"",
                        Command::WORDS.join("|"),
                        CounterName::names()
                    )
                })?;
                Ok(if self.file.is_some() {
                    Mode::Parse
                } else {
                    Mode::Client(command)
                })
            }
            None if self.file.is_some() => Ok(Mode::Parse),
            None => Ok(Mode::Usage),
        }
    }
}
