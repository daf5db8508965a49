//! TCP client for exchanges with a mediaferry server.
//!
//! Every call opens a fresh connection, sends one request, reads one
//! response and closes the stream again, whatever the outcome.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use mediaferry_core::{MediaKind, extension_for_media_type, file_timestamp, media_type_for_path};
use mediaferry_protocol::{
    Instruction, Operation, Parameters, ProtocolResult, Request, Response, ResponseRecord,
    Transport,
};

use crate::error::{ClientError, ClientResult};

/// Default directory processed files are saved to.
pub const DEFAULT_RESPONSE_DIR: &str = "response_data";

/// Extension used when the response media type is not in the table.
const FALLBACK_EXTENSION: &str = "bin";

/// Outcome of an upload exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The server processed the file; the result was written to `path`.
    Saved {
        path: PathBuf,
        media_type: String,
        bytes: usize,
    },
    /// The server answered with an error response. Nothing was written.
    Failed,
}

/// Client for one mediaferry server.
#[derive(Debug, Clone)]
pub struct MmpClient {
    addr: String,
    timeout: Option<Duration>,
    response_dir: PathBuf,
}

impl MmpClient {
    /// Creates a client for `addr` (`host:port`), without timeout.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: None,
            response_dir: PathBuf::from(DEFAULT_RESPONSE_DIR),
        }
    }

    /// Builder: bound connecting and each read or write by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builder: save processed files under `dir`.
    pub fn with_response_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.response_dir = dir.into();
        self
    }

    /// Server address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Directory processed files are saved to.
    pub fn response_dir(&self) -> &Path {
        &self.response_dir
    }

    /// Sends a request and waits for the response.
    pub async fn send(&self, request: &Request) -> ClientResult<Response> {
        debug!(addr = %self.addr, "connecting to server");
        let stream = self.connect().await?;
        let mut transport = Transport::new(stream).with_timeout(self.timeout);

        let result = exchange(&mut transport, request).await;

        // The server closes first; a failed shutdown here changes nothing.
        if let Err(e) = transport.shutdown().await {
            debug!(error = %e, "stream shutdown failed");
        }

        let response = result?;
        debug!(
            status = ?response.record.status,
            media_type = %response.media_type,
            bytes = response.payload.len(),
            "response received"
        );
        Ok(response)
    }

    async fn connect(&self) -> ClientResult<TcpStream> {
        let connect = TcpStream::connect(self.addr.as_str());
        let stream = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, connect).await.map_err(|_| {
                ClientError::Connection(format!(
                    "connection to {} timed out after {}s",
                    self.addr,
                    limit.as_secs()
                ))
            })?,
            None => connect.await,
        };
        stream.map_err(|e| ClientError::Connection(format!("failed to connect to {}: {}", self.addr, e)))
    }

    /// Pings the server. Returns true if it answered with success.
    pub async fn ping(&self, message: &str) -> ClientResult<bool> {
        let response = self.send(&Request::ping(message)).await?;
        Ok(response.is_success() && response.operation() == Some("ping"))
    }

    /// Uploads `path` for `operation` and saves the processed result.
    ///
    /// The media type is derived from the file extension; unknown extensions
    /// are rejected before connecting.
    pub async fn upload(
        &self,
        path: &Path,
        operation: Operation,
        parameters: Parameters,
    ) -> ClientResult<UploadOutcome> {
        let media_type = media_type_for_path(path)
            .ok_or_else(|| ClientError::UnsupportedMedia(path.to_path_buf()))?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                ClientError::InvalidInput(format!("{} has no usable file name", path.display()))
            })?;

        let payload = tokio::fs::read(path).await?;
        info!(
            file = %file_name,
            operation = %operation,
            bytes = payload.len(),
            "uploading"
        );

        let request = Request::from_instruction(
            Instruction::upload(file_name, operation, parameters),
            media_type,
            payload,
        );
        let response = self.send(&request).await?;

        if !response.is_success() {
            warn!(file = %file_name, operation = %operation, "server reported failure");
            return Ok(UploadOutcome::Failed);
        }
        if response.operation() != Some(operation.as_str()) {
            return Err(ClientError::Protocol(format!(
                "server answered for operation {:?}, expected {:?}",
                response.operation().unwrap_or_default(),
                operation.as_str()
            )));
        }

        let saved = self.save(&response, operation, &Local::now()).await?;
        Ok(UploadOutcome::Saved {
            path: saved,
            media_type: response.media_type,
            bytes: response.payload.len(),
        })
    }

    async fn save(
        &self,
        response: &Response,
        operation: Operation,
        at: &DateTime<Local>,
    ) -> ClientResult<PathBuf> {
        tokio::fs::create_dir_all(&self.response_dir).await?;
        let path = self
            .response_dir
            .join(result_file_name(&response.media_type, operation, at));
        tokio::fs::write(&path, &response.payload).await?;
        info!(path = %path.display(), bytes = response.payload.len(), "result saved");
        Ok(path)
    }
}

async fn exchange(
    transport: &mut Transport<TcpStream>,
    request: &Request,
) -> ProtocolResult<Response> {
    if let Err(e) = transport.write_frame(request).await {
        if !e.is_transport() {
            return Err(e);
        }
        // A server refusing the body answers first and closes without reading it.
        debug!(error = %e, "send failed, looking for an early response");
        return transport
            .read_frame::<ResponseRecord>()
            .await
            .map_err(|_| e);
    }
    debug!("request sent, waiting for response");
    transport.read_frame::<ResponseRecord>().await
}

/// Name for a saved result: `<kind>_<operation>_<YYYYMMDD_HHMMSS>.<ext>`.
pub fn result_file_name(media_type: &str, operation: Operation, at: &DateTime<Local>) -> String {
    format!(
        "{}_{}_{}.{}",
        MediaKind::of(media_type),
        operation,
        file_timestamp(at),
        extension_for_media_type(media_type).unwrap_or(FALLBACK_EXTENSION)
    )
}
