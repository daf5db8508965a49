//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while framing, parsing or moving MMP frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Header was not exactly [`HEADER_LEN`](crate::HEADER_LEN) bytes.
    #[error("malformed header: expected 8 bytes, got {len}")]
    MalformedHeader { len: usize },

    /// A segment does not fit in its header field.
    #[error("{field} size {size} exceeds the maximum of {max}")]
    SizeLimitExceeded {
        field: &'static str,
        size: u64,
        max: u64,
    },

    /// Body length disagrees with the sizes declared in the header.
    #[error("body size mismatch: header declares {expected} bytes, got {actual}")]
    BodySizeMismatch { expected: u64, actual: u64 },

    /// The JSON segment could not be parsed into a record.
    #[error("malformed instruction record: {0}")]
    MalformedInstructionRecord(#[from] serde_json::Error),

    /// The media type segment is not valid UTF-8.
    #[error("media type is not valid UTF-8")]
    InvalidMediaType,

    /// A frame must always name a media type.
    #[error("media type is empty")]
    EmptyMediaType,

    /// The declared body is larger than this endpoint accepts.
    #[error("body too large: {size} bytes (max: {max})")]
    BodyTooLarge { size: u64, max: u64 },

    /// The peer closed the stream before the expected bytes arrived.
    #[error("connection closed: expected {expected} bytes, got {received}")]
    ConnectionClosed { expected: u64, received: u64 },

    /// Reading from or writing to the stream failed.
    #[error("connection error: {0}")]
    ConnectionError(#[from] std::io::Error),

    /// An I/O deadline elapsed.
    #[error("timeout during {operation}")]
    Timeout { operation: &'static str },
}

impl ProtocolError {
    /// True for errors caused by the stream rather than the bytes on it.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed { .. } | Self::ConnectionError(_) | Self::Timeout { .. }
        )
    }
}
