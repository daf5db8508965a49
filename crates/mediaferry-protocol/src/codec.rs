//! MMP header and body codec.
//!
//! Every frame is a fixed 8-byte big-endian header followed by a body made
//! of three runs whose lengths the header declares:
//!
//! ```text
//! +---------------+-----------------+------------------+
//! | json_size (2) | media_size (1)  | payload_size (5) |   header
//! +---------------+-----------------+------------------+
//! | JSON record   | media type      | payload          |   body
//! +---------------+-----------------+------------------+
//! ```
//!
//! The functions here are pure: they never touch a stream and keep no state,
//! so they are safe to call on arbitrary, truncated or hostile input.

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{ProtocolError, ProtocolResult};

/// Length of the fixed header.
pub const HEADER_LEN: usize = 8;

/// Largest JSON segment a header can describe (2-byte field).
pub const MAX_JSON_SIZE: u64 = u16::MAX as u64;

/// Largest media type segment a header can describe (1-byte field).
pub const MAX_MEDIA_TYPE_SIZE: u64 = u8::MAX as u64;

/// Largest payload a header can describe (5-byte field).
pub const MAX_PAYLOAD_SIZE: u64 = (1 << 40) - 1;

/// Decoded MMP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Length of the JSON record segment.
    pub json_size: u16,
    /// Length of the media type segment.
    pub media_type_size: u8,
    /// Length of the payload segment, at most [`MAX_PAYLOAD_SIZE`].
    pub payload_size: u64,
}

impl Header {
    /// Builds a header, rejecting sizes that overflow their field.
    pub fn new(json_size: u64, media_type_size: u64, payload_size: u64) -> ProtocolResult<Self> {
        check_limit("json", json_size, MAX_JSON_SIZE)?;
        check_limit("media type", media_type_size, MAX_MEDIA_TYPE_SIZE)?;
        check_limit("payload", payload_size, MAX_PAYLOAD_SIZE)?;

        Ok(Self {
            json_size: json_size as u16,
            media_type_size: media_type_size as u8,
            payload_size,
        })
    }

    /// Total body length this header announces.
    pub fn body_len(&self) -> u64 {
        u64::from(self.json_size) + u64::from(self.media_type_size) + self.payload_size
    }

    /// Packs the header into its wire form.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..2].copy_from_slice(&self.json_size.to_be_bytes());
        out[2] = self.media_type_size;
        // low five bytes of the big-endian u64
        out[3..8].copy_from_slice(&self.payload_size.to_be_bytes()[3..8]);
        out
    }
}

fn check_limit(field: &'static str, size: u64, max: u64) -> ProtocolResult<()> {
    if size > max {
        return Err(ProtocolError::SizeLimitExceeded { field, size, max });
    }
    Ok(())
}

/// A decoded (or to-be-encoded) frame: record, media type and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<T> {
    /// The JSON segment.
    pub record: T,
    /// The media type segment.
    pub media_type: String,
    /// The raw payload.
    pub payload: Vec<u8>,
}

impl<T> Frame<T> {
    /// Creates a frame.
    pub fn new(record: T, media_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            record,
            media_type: media_type.into(),
            payload,
        }
    }

    /// Creates a `text/plain` frame without payload.
    pub fn text(record: T) -> Self {
        Self::new(record, mediaferry_core::TEXT_PLAIN, Vec::new())
    }
}

/// Encodes the three segment sizes into an 8-byte header.
///
/// # Example
///
/// ```rust
/// use mediaferry_protocol::{decode_header, encode_header};
///
/// let bytes = encode_header(17, 9, 1024).unwrap();
/// let header = decode_header(&bytes).unwrap();
/// assert_eq!(header.body_len(), 17 + 9 + 1024);
/// ```
pub fn encode_header(
    json_size: u64,
    media_type_size: u64,
    payload_size: u64,
) -> ProtocolResult<[u8; HEADER_LEN]> {
    Header::new(json_size, media_type_size, payload_size).map(|header| header.to_bytes())
}

/// Decodes an 8-byte header.
pub fn decode_header(bytes: &[u8]) -> ProtocolResult<Header> {
    let bytes: &[u8; HEADER_LEN] = bytes
        .try_into()
        .map_err(|_| ProtocolError::MalformedHeader { len: bytes.len() })?;

    let mut payload = [0u8; 8];
    payload[3..8].copy_from_slice(&bytes[3..8]);

    Ok(Header {
        json_size: u16::from_be_bytes([bytes[0], bytes[1]]),
        media_type_size: bytes[2],
        payload_size: u64::from_be_bytes(payload),
    })
}

/// Serializes `record` and concatenates it with the media type and payload.
///
/// Segment order is part of the wire contract: JSON, media type, payload.
pub fn encode_body<T: Serialize>(
    record: &T,
    media_type: &str,
    payload: &[u8],
) -> ProtocolResult<Vec<u8>> {
    if media_type.is_empty() {
        return Err(ProtocolError::EmptyMediaType);
    }

    let json = serde_json::to_vec(record)?;
    check_limit("json", json.len() as u64, MAX_JSON_SIZE)?;
    check_limit("media type", media_type.len() as u64, MAX_MEDIA_TYPE_SIZE)?;
    check_limit("payload", payload.len() as u64, MAX_PAYLOAD_SIZE)?;

    let mut body = Vec::with_capacity(json.len() + media_type.len() + payload.len());
    body.extend_from_slice(&json);
    body.extend_from_slice(media_type.as_bytes());
    body.extend_from_slice(payload);
    Ok(body)
}

/// Splits a body into its three runs using the sizes from `header`.
///
/// The JSON run is parsed into `T`, the media type run must be UTF-8 and the
/// payload is returned unchanged.
pub fn decode_body<T: DeserializeOwned>(bytes: &[u8], header: &Header) -> ProtocolResult<Frame<T>> {
    let expected = header.body_len();
    let actual = bytes.len() as u64;
    if actual != expected {
        return Err(ProtocolError::BodySizeMismatch { expected, actual });
    }

    let json_end = usize::from(header.json_size);
    let media_end = json_end + usize::from(header.media_type_size);

    let record = serde_json::from_slice(&bytes[..json_end])?;
    let media_type = std::str::from_utf8(&bytes[json_end..media_end])
        .map_err(|_| ProtocolError::InvalidMediaType)?
        .to_string();
    let payload = bytes[media_end..].to_vec();

    Ok(Frame {
        record,
        media_type,
        payload,
    })
}

/// Like [`decode_body`] but takes ownership of the body, so the payload is
/// split off in place instead of copied.
pub fn decode_body_owned<T: DeserializeOwned>(
    mut bytes: Vec<u8>,
    header: &Header,
) -> ProtocolResult<Frame<T>> {
    let expected = header.body_len();
    let actual = bytes.len() as u64;
    if actual != expected {
        return Err(ProtocolError::BodySizeMismatch { expected, actual });
    }

    let json_end = usize::from(header.json_size);
    let media_end = json_end + usize::from(header.media_type_size);
    let payload = bytes.split_off(media_end);

    let record = serde_json::from_slice(&bytes[..json_end])?;
    let media_type = std::str::from_utf8(&bytes[json_end..])
        .map_err(|_| ProtocolError::InvalidMediaType)?
        .to_string();

    Ok(Frame {
        record,
        media_type,
        payload,
    })
}

/// Encodes a whole frame into its header and body.
///
/// The record is serialized once; the JSON size is recovered from the body.
pub fn encode_frame<T: Serialize>(frame: &Frame<T>) -> ProtocolResult<([u8; HEADER_LEN], Vec<u8>)> {
    let body = encode_body(&frame.record, &frame.media_type, &frame.payload)?;
    let media_type_size = frame.media_type.len() as u64;
    let payload_size = frame.payload.len() as u64;
    let json_size = body.len() as u64 - media_type_size - payload_size;

    let header = encode_header(json_size, media_type_size, payload_size)?;
    Ok((header, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::{Value, json};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    #[test]
    fn header_roundtrip_at_boundaries() {
        let cases = [
            (0, 0, 0),
            (1, 1, 1),
            (MAX_JSON_SIZE, MAX_MEDIA_TYPE_SIZE, MAX_PAYLOAD_SIZE),
            (256, 10, 1 << 32),
            (65_534, 254, MAX_PAYLOAD_SIZE - 1),
        ];

        for (json, media, payload) in cases {
            let bytes = encode_header(json, media, payload).unwrap();
            let header = decode_header(&bytes).unwrap();
            assert_eq!(u64::from(header.json_size), json);
            assert_eq!(u64::from(header.media_type_size), media);
            assert_eq!(header.payload_size, payload);
        }
    }

    #[test]
    fn header_layout_is_big_endian() {
        let bytes = encode_header(0x0102, 0x03, 0x04_0506_0708).unwrap();
        assert_eq!(bytes, [1, 2, 3, 4, 5, 6, 7, 8]);

        let bytes = encode_header(10, 10, 0).unwrap();
        assert_eq!(bytes, [0, 10, 10, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn header_rejects_oversized_fields() {
        assert!(matches!(
            encode_header(MAX_JSON_SIZE + 1, 0, 0),
            Err(ProtocolError::SizeLimitExceeded { field: "json", .. })
        ));
        assert!(matches!(
            encode_header(0, MAX_MEDIA_TYPE_SIZE + 1, 0),
            Err(ProtocolError::SizeLimitExceeded {
                field: "media type",
                ..
            })
        ));
        assert!(matches!(
            encode_header(0, 0, MAX_PAYLOAD_SIZE + 1),
            Err(ProtocolError::SizeLimitExceeded {
                field: "payload",
                ..
            })
        ));
    }

    #[test]
    fn decode_header_requires_exactly_eight_bytes() {
        let garbage = [0xffu8; 16];
        for len in (0..=16).filter(|len| *len != HEADER_LEN) {
            assert!(matches!(
                decode_header(&garbage[..len]),
                Err(ProtocolError::MalformedHeader { len: l }) if l == len
            ));
        }

        let header = decode_header(&garbage[..HEADER_LEN]).unwrap();
        assert_eq!(header.json_size, u16::MAX);
        assert_eq!(header.media_type_size, u8::MAX);
        assert_eq!(header.payload_size, MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn body_roundtrip() {
        let record = Note {
            text: "héllo".to_string(),
        };
        let payload = vec![0u8, 1, 2, 255, 254];
        let body = encode_body(&record, "video/mp4", &payload).unwrap();

        let json_len = serde_json::to_vec(&record).unwrap().len() as u64;
        let header = Header::new(json_len, 9, payload.len() as u64).unwrap();
        let frame: Frame<Note> = decode_body(&body, &header).unwrap();

        assert_eq!(frame.record, record);
        assert_eq!(frame.media_type, "video/mp4");
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn body_segments_are_ordered() {
        let body = encode_body(&json!({"a": 1}), "t/x", b"PAY").unwrap();
        assert_eq!(body, br#"{"a":1}t/xPAY"#);
    }

    #[test]
    fn body_with_empty_payload() {
        let (header, body) = encode_frame(&Frame::text(json!({"action": "ping"}))).unwrap();
        let header = decode_header(&header).unwrap();
        assert_eq!(header.payload_size, 0);
        assert_eq!(header.media_type_size, 10);

        let frame: Frame<Value> = decode_body(&body, &header).unwrap();
        assert_eq!(frame.record["action"], "ping");
        assert_eq!(frame.media_type, "text/plain");
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn encode_body_rejects_empty_media_type() {
        assert!(matches!(
            encode_body(&json!({}), "", b""),
            Err(ProtocolError::EmptyMediaType)
        ));
    }

    #[test]
    fn encode_body_rejects_large_json() {
        let record = Note {
            text: "x".repeat(MAX_JSON_SIZE as usize),
        };
        assert!(matches!(
            encode_body(&record, "text/plain", b""),
            Err(ProtocolError::SizeLimitExceeded { field: "json", .. })
        ));
    }

    #[test]
    fn encode_body_rejects_long_media_type() {
        let media_type = "a".repeat(256);
        assert!(matches!(
            encode_body(&json!({}), &media_type, b""),
            Err(ProtocolError::SizeLimitExceeded {
                field: "media type",
                ..
            })
        ));
    }

    #[test]
    fn decode_body_rejects_length_mismatch() {
        let header = Header::new(2, 3, 4).unwrap();
        for len in [0usize, 8, 10, 100] {
            let bytes = vec![b' '; len];
            let result: ProtocolResult<Frame<Value>> = decode_body(&bytes, &header);
            assert!(matches!(
                result,
                Err(ProtocolError::BodySizeMismatch { expected: 9, .. })
            ));
        }
    }

    #[test]
    fn decode_body_rejects_bad_json() {
        let header = Header::new(3, 1, 0).unwrap();
        let result: ProtocolResult<Frame<Value>> = decode_body(b"{{{x", &header);
        assert!(matches!(
            result,
            Err(ProtocolError::MalformedInstructionRecord(_))
        ));
    }

    #[test]
    fn decode_body_rejects_non_utf8_media_type() {
        let header = Header::new(2, 2, 0).unwrap();
        let result: ProtocolResult<Frame<Value>> = decode_body(&[b'{', b'}', 0xc3, 0x28], &header);
        assert!(matches!(result, Err(ProtocolError::InvalidMediaType)));
    }

    #[test]
    fn decoding_garbage_never_panics() {
        let mut seed = 0x2545_f491_u32;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };

        for _ in 0..500 {
            let len = (next() % 64) as usize;
            let bytes: Vec<u8> = (0..len).map(|_| next() as u8).collect();

            let _ = decode_header(&bytes);
            let header = Header::new(
                u64::from(next() % 16),
                u64::from(next() % 16),
                u64::from(next() % 16),
            )
            .unwrap();
            let _: ProtocolResult<Frame<Value>> = decode_body(&bytes, &header);
        }
    }

    #[test]
    fn owned_and_borrowed_decoding_agree() {
        let frame = Frame::new(json!({"action": "upload"}), "video/mov", b"MOVDATA".to_vec());
        let (header, body) = encode_frame(&frame).unwrap();
        let header = decode_header(&header).unwrap();

        let borrowed: Frame<Value> = decode_body(&body, &header).unwrap();
        let owned: Frame<Value> = decode_body_owned(body, &header).unwrap();
        assert_eq!(borrowed, owned);

        let result: ProtocolResult<Frame<Value>> = decode_body_owned(vec![0; 3], &header);
        assert!(matches!(result, Err(ProtocolError::BodySizeMismatch { .. })));
    }

    #[test]
    fn encode_frame_header_matches_body() {
        let frame = Frame::new(json!({"status": "success"}), "audio/mp3", vec![7; 300]);
        let (header, body) = encode_frame(&frame).unwrap();
        let header = decode_header(&header).unwrap();

        assert_eq!(header.body_len(), body.len() as u64);
        let decoded: Frame<Value> = decode_body(&body, &header).unwrap();
        assert_eq!(decoded, frame);
    }
}
