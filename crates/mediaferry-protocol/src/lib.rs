//! MMP framing, instruction/response records and stream transport for mediaferry.
//!
//! # Protocol Overview
//!
//! One TCP connection carries exactly one exchange: the client sends a
//! request frame, the server answers with a response frame and closes.
//! Each frame is an 8-byte header followed by a body:
//!
//! - 2 bytes: JSON record size (u16, big-endian)
//! - 1 byte: media type size (u8)
//! - 5 bytes: payload size (u40, big-endian)
//! - body: JSON record, media type, payload, in that order
//!
//! # Example
//!
//! ```rust
//! use mediaferry_protocol::{Request, decode_body, decode_header, encode_frame};
//!
//! let (header, body) = encode_frame(&Request::ping("connection_start")).unwrap();
//! let header = decode_header(&header).unwrap();
//! let request: Request = decode_body(&body, &header).unwrap();
//! assert_eq!(request.record.action.as_deref(), Some("ping"));
//! ```

mod codec;
mod error;
mod transport;
mod types;

pub use codec::{
    Frame, HEADER_LEN, Header, MAX_JSON_SIZE, MAX_MEDIA_TYPE_SIZE, MAX_PAYLOAD_SIZE, decode_body,
    decode_body_owned, decode_header, encode_body, encode_frame, encode_header,
};
pub use error::{ProtocolError, ProtocolResult};
pub use transport::{DEFAULT_MAX_BODY_SIZE, Transport};
pub use types::{
    ACTION_PING, ACTION_UPLOAD, DEFAULT_PING_MESSAGE, Instruction, InstructionError,
    InstructionRecord, Operation, Parameters, Request, Response, ResponseRecord, Status,
    UploadInstruction,
};
