//! mediaferry CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::Level;

use mediaferry_client::cli::{Cli, Command, ConfigAction};
use mediaferry_client::commands;
use mediaferry_client::config::ClientConfig;
use mediaferry_client::error::{ClientError, ClientResult};
use mediaferry_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match load_config(&cli) {
        Ok(config) => {
            if let Err(e) = init_tracing(tracing_config(&cli.command, config.debug)) {
                eprintln!("warning: logging disabled: {}", e);
            }
            run(cli.command, config).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Loads the config file, then applies command-line overrides.
fn load_config(cli: &Cli) -> ClientResult<ClientConfig> {
    let mut config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path),
        None => ClientConfig::load(),
    }
    .map_err(ClientError::Config)?;

    if let Some(ref host) = cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(timeout) = cli.timeout {
        config.client.timeout = timeout;
    }
    config.debug |= cli.debug;

    Ok(config)
}

fn tracing_config(command: &Command, debug: bool) -> TracingConfig {
    match command {
        Command::Server(args) => {
            let config = if args.json_logs {
                TracingConfig::daemon()
            } else {
                TracingConfig::default().with_level(Level::INFO)
            };
            if debug {
                config.with_level(Level::DEBUG)
            } else {
                config
            }
        }
        _ if debug => TracingConfig::cli_debug(),
        _ => TracingConfig::default(),
    }
}

async fn run(command: Command, config: ClientConfig) -> ClientResult<()> {
    match command {
        Command::Ping { message } => commands::ping::run(&config, &message).await,
        Command::Upload(args) => commands::upload::run(&config, args).await,
        Command::Server(args) => commands::server::run(&config, args).await,
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Path => commands::config::path(),
        },
    }
}
