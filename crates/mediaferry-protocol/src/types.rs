//! Instruction and response records carried in the JSON segment.
//!
//! On the wire both records are loose JSON objects. [`InstructionRecord`]
//! mirrors that looseness (every field optional) so a request with a missing
//! field still decodes and can be answered with an error response; the
//! dispatcher then narrows it into the closed [`Instruction`] enum.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::Frame;

/// Operation-specific parameters, passed through to the media processor.
pub type Parameters = BTreeMap<String, String>;

/// Request frame as it travels on the wire.
pub type Request = Frame<InstructionRecord>;

/// Response frame as it travels on the wire.
pub type Response = Frame<ResponseRecord>;

/// Action tag for liveness checks.
pub const ACTION_PING: &str = "ping";

/// Action tag for upload-and-process requests.
pub const ACTION_UPLOAD: &str = "upload";

/// Message the client sends with a ping unless told otherwise.
pub const DEFAULT_PING_MESSAGE: &str = "connection_start";

/// JSON segment of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionRecord {
    /// `"ping"` or `"upload"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Free text sent with a ping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Name the uploaded file is stored under on the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    /// Processing to apply to an upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,

    /// Operation parameters, opaque to the protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
}

/// Media operations a server can be asked to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Re-encode to a smaller file.
    Compress,
    /// Change the resolution.
    Resize,
    /// Change the aspect ratio.
    Aspect,
    /// Extract the audio track.
    Convert,
    /// Cut a time range into a GIF or WebM clip.
    Trim,
}

impl Operation {
    /// Every operation, in menu order.
    pub const ALL: [Operation; 5] = [
        Self::Compress,
        Self::Resize,
        Self::Aspect,
        Self::Convert,
        Self::Trim,
    ];

    /// Wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compress => "compress",
            Self::Resize => "resize",
            Self::Aspect => "aspect",
            Self::Convert => "convert",
            Self::Trim => "trim",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = InstructionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| InstructionError::UnknownOperation(s.to_string()))
    }
}

/// Why an instruction record could not be turned into an [`Instruction`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstructionError {
    #[error("instruction has no action")]
    MissingAction,

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("upload has no file_name")]
    MissingFileName,

    #[error("file_name is not a plain file name: {0:?}")]
    InvalidFileName(String),

    #[error("upload has no operation")]
    MissingOperation,

    #[error("unknown operation: {0}")]
    UnknownOperation(String),
}

/// A validated upload request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadInstruction {
    /// Plain file name (no directories).
    pub file_name: String,
    /// Requested processing.
    pub operation: Operation,
    /// Parameters for the processor.
    pub parameters: Parameters,
}

/// A validated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Liveness check.
    Ping { message: String },
    /// Upload a file and process it.
    Upload(UploadInstruction),
}

impl Instruction {
    /// Creates a ping instruction.
    pub fn ping(message: impl Into<String>) -> Self {
        Self::Ping {
            message: message.into(),
        }
    }

    /// Creates an upload instruction.
    pub fn upload(file_name: impl Into<String>, operation: Operation, parameters: Parameters) -> Self {
        Self::Upload(UploadInstruction {
            file_name: file_name.into(),
            operation,
            parameters,
        })
    }
}

impl TryFrom<InstructionRecord> for Instruction {
    type Error = InstructionError;

    fn try_from(record: InstructionRecord) -> Result<Self, Self::Error> {
        let action = record.action.ok_or(InstructionError::MissingAction)?;

        match action.as_str() {
            ACTION_PING => Ok(Self::Ping {
                message: record.message.unwrap_or_default(),
            }),
            ACTION_UPLOAD => {
                let file_name = record.file_name.ok_or(InstructionError::MissingFileName)?;
                if !is_plain_file_name(&file_name) {
                    return Err(InstructionError::InvalidFileName(file_name));
                }
                let operation = record
                    .operation
                    .ok_or(InstructionError::MissingOperation)?
                    .parse()?;

                Ok(Self::Upload(UploadInstruction {
                    file_name,
                    operation,
                    parameters: record.parameters.unwrap_or_default(),
                }))
            }
            _ => Err(InstructionError::UnknownAction(action)),
        }
    }
}

impl From<Instruction> for InstructionRecord {
    fn from(instruction: Instruction) -> Self {
        match instruction {
            Instruction::Ping { message } => Self {
                action: Some(ACTION_PING.to_string()),
                message: Some(message),
                ..Default::default()
            },
            Instruction::Upload(upload) => Self {
                action: Some(ACTION_UPLOAD.to_string()),
                file_name: Some(upload.file_name),
                operation: Some(upload.operation.as_str().to_string()),
                parameters: Some(upload.parameters),
                ..Default::default()
            },
        }
    }
}

/// True if `name` is exactly one normal path component.
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(part)), None) if part == name
    )
}

/// Outcome of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// JSON segment of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    /// Whether the request was satisfied.
    pub status: Status,
    /// Echo of the handled operation, success only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

impl Frame<InstructionRecord> {
    /// Builds a request frame for `instruction`.
    ///
    /// Pings travel as `text/plain` without payload; uploads carry the file.
    pub fn from_instruction(
        instruction: Instruction,
        media_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Frame::new(instruction.into(), media_type, payload)
    }

    /// Builds a ping request.
    pub fn ping(message: impl Into<String>) -> Self {
        Frame::text(Instruction::ping(message).into())
    }
}

impl Frame<ResponseRecord> {
    /// Success response without payload.
    pub fn success(operation: impl Into<String>) -> Self {
        Frame::text(ResponseRecord {
            status: Status::Success,
            operation: Some(operation.into()),
        })
    }

    /// Success response carrying a produced file.
    pub fn success_with(
        operation: impl Into<String>,
        media_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Frame::new(
            ResponseRecord {
                status: Status::Success,
                operation: Some(operation.into()),
            },
            media_type,
            payload,
        )
    }

    /// The one error shape: `{status: "error"}`, `text/plain`, no payload.
    pub fn error() -> Self {
        Frame::text(ResponseRecord {
            status: Status::Error,
            operation: None,
        })
    }

    /// Returns true for success responses.
    pub fn is_success(&self) -> bool {
        self.record.status == Status::Success
    }

    /// Echoed operation, if any.
    pub fn operation(&self) -> Option<&str> {
        self.record.operation.as_deref()
    }
}
