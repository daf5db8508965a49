//! Server error types.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use mediaferry_protocol::{InstructionError, ProtocolError};

use crate::processor::ProcessingError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error (socket, file, etc.).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error (framing, encoding, transport).
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The listen address could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The upload directory could not be created.
    #[error("Upload directory {path} is unusable: {source}")]
    UploadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Shutdown requested.
    #[error("Server shutdown requested")]
    Shutdown,
}

/// Why a decoded request could not be satisfied.
///
/// Every variant is answered with the generic error response; the detail
/// only reaches the logs.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The record did not form a valid instruction.
    #[error(transparent)]
    Instruction(#[from] InstructionError),

    /// Reading or writing a transient file failed.
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The media processor did not produce an output.
    #[error(transparent)]
    Processing(#[from] ProcessingError),
}

impl DispatchError {
    /// Wraps an IO error with the file it concerned.
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}
