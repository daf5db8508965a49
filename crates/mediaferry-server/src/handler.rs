//! Request dispatch and the per-connection session driver.
//!
//! [`RequestHandler::serve`] runs one exchange on a stream: read a request,
//! dispatch it, send exactly one response, remove every transient file and
//! close. Dispatch failures never escape as errors; they become the generic
//! error response.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::{future::Future, pin::Pin};

use chrono::Local;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{Span, debug, info, warn};

use mediaferry_core::precise_timestamp;
use mediaferry_protocol::{
    ACTION_PING, Frame, Instruction, ProtocolResult, Request, Response, Status, Transport,
    UploadInstruction, decode_body_owned,
};

use crate::artifacts::TransientArtifacts;
use crate::config::ServerConfig;
use crate::error::{DispatchError, ServerError, ServerResult};
use crate::processor::{MediaProcessor, OutputFormat, ProcessingJob};
use crate::session::{Session, SessionState};
use crate::socket::Connection;
use crate::worker::WorkerPool;

/// Turns requests into responses.
///
/// Holds no per-connection state; one handler serves every session.
#[derive(Debug, Clone)]
pub struct RequestHandler {
    upload_dir: PathBuf,
    workers: WorkerPool,
}

impl RequestHandler {
    /// Creates a handler storing uploads in `upload_dir`.
    pub fn new(upload_dir: impl Into<PathBuf>, workers: WorkerPool) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            workers,
        }
    }

    /// Creates a handler from the server configuration.
    pub fn from_config(config: &ServerConfig, processor: Arc<dyn MediaProcessor>) -> Self {
        Self::new(
            &config.upload_dir,
            WorkerPool::new(processor, config.max_workers),
        )
    }

    /// Handles a single decoded request and returns the response.
    ///
    /// Files created on the way are registered in `artifacts`; the caller
    /// removes them once the response is sent.
    #[tracing::instrument(skip_all, fields(action, duration_ms))]
    pub async fn handle(&self, request: Request, artifacts: &mut TransientArtifacts) -> Response {
        let start = std::time::Instant::now();
        let action = request.record.action.as_deref().unwrap_or("<none>");
        Span::current().record("action", action);

        let response = match self.dispatch(request, artifacts).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Request failed");
                Response::error()
            }
        };

        let duration = start.elapsed();
        Span::current().record("duration_ms", duration.as_millis());
        debug!(
            status = ?response.record.status,
            duration_ms = duration.as_millis(),
            "Request handled"
        );

        response
    }

    async fn dispatch(
        &self,
        request: Request,
        artifacts: &mut TransientArtifacts,
    ) -> Result<Response, DispatchError> {
        let Frame {
            record, payload, ..
        } = request;

        match Instruction::try_from(record)? {
            Instruction::Ping { message } => {
                debug!(message = %message, "Handling ping");
                Ok(Response::success(ACTION_PING))
            }
            Instruction::Upload(upload) => self.upload(upload, payload, artifacts).await,
        }
    }

    async fn upload(
        &self,
        upload: UploadInstruction,
        payload: Vec<u8>,
        artifacts: &mut TransientArtifacts,
    ) -> Result<Response, DispatchError> {
        let UploadInstruction {
            file_name,
            operation,
            parameters,
        } = upload;
        debug!(file = %file_name, operation = %operation, bytes = payload.len(), "Handling upload");

        let format = OutputFormat::for_operation(operation, &parameters)?;

        let input = artifacts.register(self.upload_dir.join(&file_name));
        tokio::fs::write(&input, payload)
            .await
            .map_err(|e| DispatchError::io("write", &input, e))?;

        let stamp = precise_timestamp(&Local::now());
        let output = artifacts.register(self.upload_dir.join(format.file_name(&stamp)));

        self.workers
            .run(ProcessingJob {
                operation,
                input,
                output: output.clone(),
                parameters,
            })
            .await?;

        let produced = tokio::fs::read(&output)
            .await
            .map_err(|e| DispatchError::io("read", &output, e))?;
        info!(
            file = %file_name,
            operation = %operation,
            bytes = produced.len(),
            "Upload processed"
        );

        Ok(Response::success_with(
            operation.as_str(),
            format.media_type,
            produced,
        ))
    }

    /// Serves one exchange on `transport` and closes it.
    ///
    /// The returned session has reached [`SessionState::Closed`] and records
    /// the response status, or the transport error that prevented one.
    pub async fn serve<S>(&self, transport: &mut Transport<S>, peer: SocketAddr) -> Session
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut session = Session::new(peer);
        let mut artifacts = TransientArtifacts::new();

        match self.exchange(transport, &mut session, &mut artifacts).await {
            Ok(status) => session.responded(status),
            Err(e) => {
                debug!(peer = %peer, error = %e, "Exchange aborted");
                session.abort(e);
            }
        }

        session.enter(SessionState::Cleanup);
        let removed = artifacts.cleanup().await;
        if let Err(e) = transport.shutdown().await {
            debug!(peer = %peer, error = %e, "Failed to shut down stream");
        }
        session.enter(SessionState::Closed);
        debug!(peer = %peer, removed, "Session closed");

        session
    }

    async fn exchange<S>(
        &self,
        transport: &mut Transport<S>,
        session: &mut Session,
        artifacts: &mut TransientArtifacts,
    ) -> ProtocolResult<Status>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let response = match receive(transport, session).await {
            Ok(request) => {
                session.enter(SessionState::Dispatch);
                self.handle(request, artifacts).await
            }
            Err(e) if e.is_transport() => return Err(e),
            Err(e) => {
                warn!(peer = %session.peer(), error = %e, "Rejecting undecodable request");
                Response::error()
            }
        };
        session.enter(SessionState::BuildResponse);

        session.enter(SessionState::Send);
        match transport.write_frame(&response).await {
            Ok(()) => Ok(response.record.status),
            Err(e) if e.is_transport() => Err(e),
            Err(e) => {
                // Nothing was written; fall back to the error shape.
                warn!(error = %e, "Response could not be framed");
                transport.write_frame(&Response::error()).await?;
                Ok(Status::Error)
            }
        }
    }

    /// Handles a TCP connection, returning its transport error if any.
    pub async fn handle_connection(&self, mut conn: Connection) -> ServerResult<()> {
        let peer = conn.peer();
        let session = self.serve(conn.transport_mut(), peer).await;
        match session.into_error() {
            Some(e) => Err(ServerError::Protocol(e)),
            None => Ok(()),
        }
    }
}

async fn receive<S>(transport: &mut Transport<S>, session: &mut Session) -> ProtocolResult<Request>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let header = transport.read_header().await?;
    session.enter(SessionState::AwaitBody);

    let body = transport.receive_exact(header.body_len()).await?;
    session.enter(SessionState::Decode);

    decode_body_owned(body, &header)
}

/// Creates a connection handler function for use with `TcpServer::run`.
///
/// This returns a closure that can be passed to `TcpServer::run` or
/// `TcpServer::run_until_shutdown`.
pub fn make_connection_handler(
    handler: Arc<RequestHandler>,
) -> impl Fn(Connection) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static {
    move |conn| {
        let handler = Arc::clone(&handler);
        Box::pin(async move {
            let peer = conn.peer();
            if let Err(e) = handler.handle_connection(conn).await {
                warn!(peer = %peer, error = %e, "Connection handler error");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use crate::processor::ProcessingError;
    use mediaferry_protocol::{
        InstructionRecord, Parameters, ProtocolError, ResponseRecord, decode_body, decode_header,
        encode_header,
    };
    use tempfile::{TempDir, tempdir};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    /// Writes `PROCESSED:` followed by the input, or fails on demand.
    struct FakeProcessor {
        fail: bool,
    }

    impl MediaProcessor for FakeProcessor {
        fn process(&self, job: &ProcessingJob) -> Result<(), ProcessingError> {
            assert!(job.input.exists(), "input was not written before processing");
            assert_eq!(job.input.parent(), job.output.parent());
            if self.fail {
                return Err(ProcessingError::Failed {
                    operation: job.operation,
                    status: "exit status: 1".to_string(),
                    detail: "simulated".to_string(),
                });
            }
            let mut data = b"PROCESSED:".to_vec();
            data.extend(std::fs::read(&job.input).unwrap());
            std::fs::write(&job.output, data).unwrap();
            Ok(())
        }
    }

    fn handler(fail: bool) -> (TempDir, RequestHandler) {
        let dir = tempdir().unwrap();
        let workers = WorkerPool::new(Arc::new(FakeProcessor { fail }), 2);
        let handler = RequestHandler::new(dir.path(), workers);
        (dir, handler)
    }

    fn upload(file_name: Option<&str>, operation: &str, params: &[(&str, &str)]) -> Request {
        let record = InstructionRecord {
            action: Some("upload".to_string()),
            file_name: file_name.map(str::to_string),
            operation: Some(operation.to_string()),
            parameters: Some(
                params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<Parameters>(),
            ),
            ..Default::default()
        };
        Frame::new(record, "video/mp4", b"MP4DATA".to_vec())
    }

    fn is_empty_dir(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    /// Runs one framed exchange through `serve`.
    async fn exchange(handler: &RequestHandler, request: &Request) -> (Session, Response) {
        let (client, server) = duplex(1024);
        let mut client = Transport::new(client);
        let mut server = Transport::new(server);

        let client_side = async {
            client.write_frame(request).await.unwrap();
            client.read_frame::<ResponseRecord>().await.unwrap()
        };
        tokio::join!(handler.serve(&mut server, peer()), client_side)
    }

    /// Writes raw bytes, half-closes, and collects whatever comes back.
    async fn exchange_raw(
        handler: &RequestHandler,
        bytes: Vec<u8>,
        max_body_size: u64,
    ) -> (Session, Vec<u8>) {
        let (mut client, server) = duplex(1024);
        let mut server = Transport::new(server).with_max_body_size(max_body_size);

        let client_side = async move {
            client.write_all(&bytes).await.unwrap();
            client.shutdown().await.unwrap();
            let mut reply = Vec::new();
            client.read_to_end(&mut reply).await.unwrap();
            reply
        };
        tokio::join!(handler.serve(&mut server, peer()), client_side)
    }

    fn parse_reply(reply: &[u8]) -> Response {
        let header = decode_header(&reply[..8]).unwrap();
        decode_body(&reply[8..], &header).unwrap()
    }

    #[tokio::test]
    async fn ping_returns_success() {
        let (_dir, handler) = handler(false);
        let mut artifacts = TransientArtifacts::new();

        let response = handler
            .handle(Request::ping("connection_start"), &mut artifacts)
            .await;
        assert_eq!(response, Response::success("ping"));
        assert!(artifacts.is_empty());
    }

    #[tokio::test]
    async fn ping_session_walks_every_state() {
        use SessionState::*;
        let (_dir, handler) = handler(false);

        let (session, response) = exchange(&handler, &Request::ping("connection_start")).await;

        assert!(response.is_success());
        assert_eq!(response.operation(), Some("ping"));
        assert_eq!(response.media_type, "text/plain");
        assert!(response.payload.is_empty());
        assert_eq!(
            session.trail(),
            &[
                AwaitHeader,
                AwaitBody,
                Decode,
                Dispatch,
                BuildResponse,
                Send,
                Cleanup,
                Closed
            ]
        );
        assert_eq!(session.status(), Some(Status::Success));
    }

    #[tokio::test]
    async fn upload_returns_processed_file_and_cleans_up() {
        let (dir, handler) = handler(false);

        let (session, response) =
            exchange(&handler, &upload(Some("a.mp4"), "compress", &[])).await;

        assert!(response.is_success());
        assert_eq!(response.operation(), Some("compress"));
        assert_eq!(response.media_type, "video/mp4");
        assert_eq!(response.payload, b"PROCESSED:MP4DATA");
        assert!(session.is_closed());
        assert!(is_empty_dir(dir.path()));
    }

    #[tokio::test]
    async fn trim_to_webm_reports_webm() {
        let (dir, handler) = handler(false);
        let request = upload(
            Some("clip.mov"),
            "trim",
            &[("type", "webm"), ("start_time", "1"), ("duration", "2")],
        );

        let (_, response) = exchange(&handler, &request).await;

        assert_eq!(response.operation(), Some("trim"));
        assert_eq!(response.media_type, "video/webm");
        assert!(is_empty_dir(dir.path()));
    }

    #[tokio::test]
    async fn processing_failure_is_error_and_cleans_up() {
        let (dir, handler) = handler(true);

        let (session, response) =
            exchange(&handler, &upload(Some("a.mp4"), "compress", &[])).await;

        assert_eq!(response, Response::error());
        assert_eq!(session.status(), Some(Status::Error));
        assert!(is_empty_dir(dir.path()));
    }

    #[tokio::test]
    async fn invalid_uploads_never_touch_the_filesystem() {
        let (dir, handler) = handler(false);
        let cases = [
            upload(None, "compress", &[]),
            upload(Some("a.mp4"), "explode", &[]),
            upload(Some("../a.mp4"), "compress", &[]),
            upload(Some("a.mp4"), "trim", &[("type", "avi")]),
        ];

        for request in cases {
            let mut artifacts = TransientArtifacts::new();
            let response = handler.handle(request, &mut artifacts).await;
            assert_eq!(response, Response::error());
            assert!(artifacts.is_empty());
            assert!(is_empty_dir(dir.path()));
        }
    }

    #[tokio::test]
    async fn unknown_or_missing_action_is_error() {
        let (_dir, handler) = handler(false);

        for action in [Some("delete"), None] {
            let request = Frame::text(InstructionRecord {
                action: action.map(str::to_string),
                ..Default::default()
            });
            let (session, response) = exchange(&handler, &request).await;
            assert_eq!(response, Response::error());
            assert!(session.is_closed());
        }
    }

    #[tokio::test]
    async fn undecodable_record_gets_error_response() {
        use SessionState::*;
        let (_dir, handler) = handler(false);

        let mut bytes = encode_header(5, 10, 0).unwrap().to_vec();
        bytes.extend_from_slice(b"{bad}text/plain");

        let (session, reply) = exchange_raw(&handler, bytes, u64::MAX).await;

        assert_eq!(parse_reply(&reply), Response::error());
        assert_eq!(
            session.trail(),
            &[
                AwaitHeader,
                AwaitBody,
                Decode,
                BuildResponse,
                Send,
                Cleanup,
                Closed
            ]
        );
    }

    #[tokio::test]
    async fn truncated_request_closes_without_response() {
        let (dir, handler) = handler(false);

        let mut bytes = encode_header(2, 10, 100).unwrap().to_vec();
        bytes.extend_from_slice(b"{}video/mp4");

        let (session, reply) = exchange_raw(&handler, bytes, u64::MAX).await;

        assert!(reply.is_empty());
        assert_eq!(session.status(), None);
        assert!(matches!(
            session.error(),
            Some(ProtocolError::ConnectionClosed { .. })
        ));
        assert!(session.is_closed());
        assert!(is_empty_dir(dir.path()));
    }

    #[tokio::test]
    async fn oversized_request_is_rejected_before_body() {
        let (_dir, handler) = handler(false);

        let bytes = encode_header(2, 9, 1 << 30).unwrap().to_vec();
        let (session, reply) = exchange_raw(&handler, bytes, 1024).await;

        assert_eq!(parse_reply(&reply), Response::error());
        assert_eq!(session.trail()[1], SessionState::BuildResponse);
    }

    #[tokio::test]
    async fn tcp_sessions_are_independent() {
        use crate::socket::TcpServer;
        use tokio::net::TcpStream;

        let dir = tempdir().unwrap();
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
            .with_upload_dir(dir.path())
            .with_max_workers(2);
        let handler = Arc::new(RequestHandler::from_config(
            &config,
            Arc::new(FakeProcessor { fail: false }),
        ));
        let server = TcpServer::new(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move { server.run(make_connection_handler(handler)).await });

        // Distinct operations keep the timestamped output names apart.
        let clients: Vec<_> = [("a.mp4", "resize"), ("b.mp4", "compress"), ("c.mp4", "convert")]
            .into_iter()
            .map(|(name, operation)| {
                let task = tokio::spawn(async move {
                    let mut transport = Transport::new(TcpStream::connect(addr).await.unwrap());
                    transport
                        .write_frame(&upload(Some(name), operation, &[]))
                        .await
                        .unwrap();
                    transport.read_frame::<ResponseRecord>().await.unwrap()
                });
                (operation, task)
            })
            .collect();

        for (operation, client) in clients {
            let response = client.await.unwrap();
            assert_eq!(response.operation(), Some(operation));
            assert_eq!(response.payload, b"PROCESSED:MP4DATA");
        }
        // Cleanup runs after the response is sent, so give it a moment.
        for _ in 0..50 {
            if is_empty_dir(dir.path()) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(is_empty_dir(dir.path()));
    }

    #[tokio::test]
    async fn silent_peer_is_transport_error() {
        let (_dir, handler) = handler(false);

        let (session, reply) = exchange_raw(&handler, Vec::new(), u64::MAX).await;

        assert!(reply.is_empty());
        assert!(session.error().is_some_and(ProtocolError::is_transport));
    }
}
