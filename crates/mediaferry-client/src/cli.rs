//! Command-line interface definition.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use mediaferry_protocol::{DEFAULT_PING_MESSAGE, Operation};

/// mediaferry - Upload media for processing and fetch the result
#[derive(Debug, Parser)]
#[command(name = "mediaferry")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "MEDIAFERRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    // --- Connection flags ---
    /// Server host
    #[arg(long, env = "MEDIAFERRY_HOST")]
    pub host: Option<String>,

    /// Server port
    #[arg(long, env = "MEDIAFERRY_PORT")]
    pub port: Option<u16>,

    /// Network timeout in seconds (0 waits forever)
    #[arg(long)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check that the server answers
    Ping {
        /// Message carried by the ping
        #[arg(long, short, default_value = DEFAULT_PING_MESSAGE)]
        message: String,
    },

    /// Upload a file and save the processed result
    Upload(UploadArgs),

    /// Run the server in the foreground
    Server(ServerArgs),

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments of the `upload` command.
#[derive(Debug, clap::Args)]
pub struct UploadArgs {
    /// Media file to upload
    pub file: PathBuf,

    /// Processing operation (compress, resize, aspect, convert, trim)
    #[arg(long, short, value_parser = parse_operation)]
    pub operation: Operation,

    /// Operation parameter as key=value (can be repeated)
    #[arg(long = "param", short = 'p', value_parser = parse_param, action = clap::ArgAction::Append)]
    pub params: Vec<(String, String)>,

    /// Directory processed files are saved to
    #[arg(long)]
    pub response_dir: Option<PathBuf>,
}

/// Arguments of the `server` command.
#[derive(Debug, clap::Args)]
pub struct ServerArgs {
    /// Address to listen on
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Directory uploads are written to
    #[arg(long)]
    pub upload_dir: Option<PathBuf>,

    /// Number of concurrent media processing jobs
    #[arg(long)]
    pub workers: Option<usize>,

    /// Log as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Show configuration file path
    Path,
}

fn parse_operation(value: &str) -> Result<Operation, String> {
    value.parse().map_err(|e| format!("{}", e))
}

fn parse_param(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, val)) if !key.is_empty() => Ok((key.to_string(), val.to_string())),
        _ => Err(format!("expected key=value, got {:?}", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_upload_with_params() {
        let cli = Cli::try_parse_from([
            "mediaferry",
            "--port",
            "9000",
            "upload",
            "clip.mp4",
            "--operation",
            "trim",
            "-p",
            "type=gif",
            "--param",
            "start_time=00:00:01",
        ])
        .unwrap();

        assert_eq!(cli.port, Some(9000));
        let Command::Upload(args) = cli.command else {
            panic!("expected upload command");
        };
        assert_eq!(args.file, PathBuf::from("clip.mp4"));
        assert_eq!(args.operation, Operation::Trim);
        assert_eq!(
            args.params,
            vec![
                ("type".to_string(), "gif".to_string()),
                ("start_time".to_string(), "00:00:01".to_string()),
            ]
        );
    }

    #[test]
    fn ping_message_defaults() {
        let cli = Cli::try_parse_from(["mediaferry", "ping"]).unwrap();
        match cli.command {
            Command::Ping { message } => assert_eq!(message, "connection_start"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_operation() {
        let result = Cli::try_parse_from(["mediaferry", "upload", "a.mp4", "-o", "sharpen"]);
        assert!(result.is_err());
    }

    #[test]
    fn param_requires_key_and_equals() {
        assert!(parse_param("crf=23").is_ok());
        assert_eq!(
            parse_param("size=").unwrap(),
            ("size".to_string(), String::new())
        );
        assert!(parse_param("crf").is_err());
        assert!(parse_param("=3").is_err());
    }
}
