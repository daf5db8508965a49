//! Frame exchange over a duplex byte stream.
//!
//! [`Transport`] owns one stream for the lifetime of one exchange. Reads are
//! all-or-nothing: a short read is an error, never a partial result. Writes
//! send the header and the body each with a single write-all-and-flush, so a
//! frame is never interleaved with another writer's bytes.

use std::future::Future;
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::{Frame, HEADER_LEN, Header, decode_body_owned, decode_header, encode_frame};
use crate::error::{ProtocolError, ProtocolResult};

/// Largest body accepted unless configured otherwise (4 GiB).
pub const DEFAULT_MAX_BODY_SIZE: u64 = 4 * 1024 * 1024 * 1024;

/// Upper bound on the buffer reserved before any body byte arrives.
const INITIAL_READ_CAPACITY: u64 = 64 * 1024;

/// A duplex stream speaking MMP.
#[derive(Debug)]
pub struct Transport<S> {
    stream: S,
    timeout: Option<Duration>,
    max_body_size: u64,
}

impl<S> Transport<S> {
    /// Wraps a stream with no deadline and the default body ceiling.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            timeout: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Builder: apply `timeout` to every individual read and write.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builder: refuse frames whose declared body exceeds `max` bytes.
    pub fn with_max_body_size(mut self, max: u64) -> Self {
        self.max_body_size = max;
        self
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Transport<S> {
    /// Reads exactly `n` bytes.
    ///
    /// Fails with [`ProtocolError::ConnectionClosed`] if the peer closes early.
    /// The buffer grows with the data actually received, so a lying length
    /// cannot force a large allocation up front.
    pub async fn receive_exact(&mut self, n: u64) -> ProtocolResult<Vec<u8>> {
        let timeout = self.timeout;
        let mut buf = Vec::with_capacity(n.min(INITIAL_READ_CAPACITY) as usize);
        let received = deadline(
            timeout,
            "receive",
            (&mut self.stream).take(n).read_to_end(&mut buf),
        )
        .await? as u64;

        if received < n {
            return Err(ProtocolError::ConnectionClosed {
                expected: n,
                received,
            });
        }
        Ok(buf)
    }

    /// Writes every byte and flushes.
    pub async fn send_all(&mut self, bytes: &[u8]) -> ProtocolResult<()> {
        let timeout = self.timeout;
        let stream = &mut self.stream;
        deadline(timeout, "send", async move {
            stream.write_all(bytes).await?;
            stream.flush().await
        })
        .await
    }

    /// Receives and decodes a header, enforcing the body ceiling.
    pub async fn read_header(&mut self) -> ProtocolResult<Header> {
        let header_bytes = self.receive_exact(HEADER_LEN as u64).await?;
        let header = decode_header(&header_bytes)?;

        let body_len = header.body_len();
        if body_len > self.max_body_size {
            return Err(ProtocolError::BodyTooLarge {
                size: body_len,
                max: self.max_body_size,
            });
        }
        Ok(header)
    }

    /// Receives one frame: header, then the body it announces.
    pub async fn read_frame<T: DeserializeOwned>(&mut self) -> ProtocolResult<Frame<T>> {
        let header = self.read_header().await?;
        let body = self.receive_exact(header.body_len()).await?;
        decode_body_owned(body, &header)
    }

    /// Sends one frame: header first, body second.
    pub async fn write_frame<T: Serialize>(&mut self, frame: &Frame<T>) -> ProtocolResult<()> {
        let (header, body) = encode_frame(frame)?;
        self.send_all(&header).await?;
        self.send_all(&body).await
    }

    /// Shuts down the write half, signalling end of stream to the peer.
    pub async fn shutdown(&mut self) -> ProtocolResult<()> {
        let timeout = self.timeout;
        deadline(timeout, "shutdown", self.stream.shutdown()).await
    }
}

async fn deadline<F, T>(
    timeout: Option<Duration>,
    operation: &'static str,
    fut: F,
) -> ProtocolResult<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ProtocolError::Timeout { operation })?
            .map_err(ProtocolError::from),
        None => fut.await.map_err(ProtocolError::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_header;
    use crate::types::{InstructionRecord, Request, Response, ResponseRecord};
    use tokio::io::duplex;

    #[tokio::test]
    async fn receive_exact_collects_split_writes() {
        let (mut peer, stream) = duplex(64);
        let mut transport = Transport::new(stream);

        let writer = async {
            peer.write_all(b"abc").await.unwrap();
            peer.write_all(b"defgh").await.unwrap();
        };
        let (_, received) = tokio::join!(writer, transport.receive_exact(8));
        assert_eq!(received.unwrap(), b"abcdefgh");
    }

    #[tokio::test]
    async fn receive_exact_fails_on_short_read() {
        let (mut peer, stream) = duplex(64);
        let mut transport = Transport::new(stream);

        peer.write_all(b"abc").await.unwrap();
        drop(peer);

        let result = transport.receive_exact(8).await;
        assert!(matches!(
            result,
            Err(ProtocolError::ConnectionClosed {
                expected: 8,
                received: 3
            })
        ));
    }

    #[tokio::test]
    async fn frame_roundtrip_larger_than_pipe() {
        let (client, server) = duplex(1024);
        let mut client = Transport::new(client);
        let mut server = Transport::new(server);

        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let response = Response::success_with("compress", "video/mp4", payload.clone());

        let (sent, received) = tokio::join!(
            server.write_frame(&response),
            client.read_frame::<ResponseRecord>()
        );
        sent.unwrap();
        let received = received.unwrap();

        assert!(received.is_success());
        assert_eq!(received.media_type, "video/mp4");
        assert_eq!(received.payload, payload);
    }

    #[tokio::test]
    async fn request_frame_over_transport() {
        let (client, server) = duplex(4096);
        let mut client = Transport::new(client);
        let mut server = Transport::new(server);

        client.write_frame(&Request::ping("hello")).await.unwrap();
        let request = server.read_frame::<InstructionRecord>().await.unwrap();

        assert_eq!(request.record.action.as_deref(), Some("ping"));
        assert_eq!(request.record.message.as_deref(), Some("hello"));
        assert_eq!(request.media_type, "text/plain");
    }

    #[tokio::test]
    async fn oversized_body_is_refused_before_reading() {
        let (mut peer, stream) = duplex(64);
        let mut transport = Transport::new(stream).with_max_body_size(10);

        peer.write_all(&encode_header(2, 10, 100).unwrap())
            .await
            .unwrap();

        let result = transport.read_frame::<InstructionRecord>().await;
        assert!(matches!(
            result,
            Err(ProtocolError::BodyTooLarge { size: 112, max: 10 })
        ));
    }

    #[tokio::test]
    async fn truncated_body_is_connection_closed() {
        let (mut peer, stream) = duplex(64);
        let mut transport = Transport::new(stream);

        peer.write_all(&encode_header(2, 10, 0).unwrap()).await.unwrap();
        peer.write_all(b"{}text/").await.unwrap();
        drop(peer);

        let result = transport.read_frame::<InstructionRecord>().await;
        assert!(matches!(
            result,
            Err(ProtocolError::ConnectionClosed {
                expected: 12,
                received: 7
            })
        ));
    }

    #[tokio::test]
    async fn read_times_out() {
        let (_peer, stream) = duplex(64);
        let mut transport = Transport::new(stream).with_timeout(Some(Duration::from_millis(20)));

        let result = transport.read_frame::<InstructionRecord>().await;
        assert!(matches!(
            result,
            Err(ProtocolError::Timeout {
                operation: "receive"
            })
        ));
    }

    #[tokio::test]
    async fn send_to_closed_peer_is_connection_error() {
        let (peer, stream) = duplex(64);
        drop(peer);
        let mut transport = Transport::new(stream);

        let result = transport.send_all(b"hello").await;
        assert!(matches!(result, Err(ProtocolError::ConnectionError(_))));
    }

    #[tokio::test]
    async fn invalid_frame_is_not_sent() {
        let (mut peer, stream) = duplex(64);
        let mut transport = Transport::new(stream);

        let frame = Response::success("ping");
        let frame = crate::Frame {
            media_type: String::new(),
            ..frame
        };
        assert!(matches!(
            transport.write_frame(&frame).await,
            Err(ProtocolError::EmptyMediaType)
        ));

        drop(transport);
        let mut rest = Vec::new();
        peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }
}
