//! Client error types.

use std::fmt;
use std::path::PathBuf;

use mediaferry_protocol::ProtocolError;
use mediaferry_server::ServerError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// IO error.
    Io(std::io::Error),
    /// Connection to server failed or was lost.
    Connection(String),
    /// Protocol/framing error.
    Protocol(String),
    /// Request timed out.
    Timeout(String),
    /// The file has no known media type.
    UnsupportedMedia(PathBuf),
    /// Arguments that cannot form a request.
    InvalidInput(String),
    /// The embedded server failed.
    Server(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Connection(msg) => write!(f, "connection error: {}", msg),
            Self::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Self::Timeout(msg) => write!(f, "timeout: {}", msg),
            Self::UnsupportedMedia(path) => {
                write!(f, "unsupported media file: {}", path.display())
            }
            Self::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            Self::Server(msg) => write!(f, "server error: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Timeout { operation } => Self::Timeout(operation.to_string()),
            err if err.is_transport() => Self::Connection(err.to_string()),
            err => Self::Protocol(err.to_string()),
        }
    }
}

impl From<ServerError> for ClientError {
    fn from(err: ServerError) -> Self {
        Self::Server(err.to_string())
    }
}
