#[cfg(not(unix))]
compile_error!("Only unix is currently supported");

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use mlogtail::{Cli, Config, Daemon, Mode, parse_once, query};
use mlogtail_common::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mode = match cli.mode() {
        Ok(mode) => mode,
        Err(message) => {
            println!("{message}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut config = Config::load(cli.config.as_deref())?;
    config.merge_cli(&cli);

    match mode {
        Mode::Daemon => {
            Daemon::new(config).run().await?;
            Ok(ExitCode::SUCCESS)
        }
        Mode::Client(command) => match query(&config, command).await {
            Ok(reply) => {
                print!("{reply}");
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("{e}");
                Ok(ExitCode::FAILURE)
            }
        },
        Mode::Parse => {
            let snapshot = parse_once(&config.file, config.log_type).await?;
            print!("{snapshot}");
            Ok(ExitCode::SUCCESS)
        }
        Mode::Usage => {
            Cli::command().print_help()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
