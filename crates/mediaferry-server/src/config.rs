//! Server configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use mediaferry_protocol::DEFAULT_MAX_BODY_SIZE;

/// Port the server listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 8888;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to accept connections on.
    pub listen_addr: SocketAddr,

    /// Directory holding uploaded and intermediate files.
    pub upload_dir: PathBuf,

    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// Maximum concurrent media processor invocations.
    pub max_workers: usize,

    /// Largest request body accepted, in bytes.
    pub max_body_size: u64,

    /// Deadline for each individual read or write, if any.
    pub io_timeout: Option<Duration>,

    /// ffmpeg executable used by the default processor.
    pub ffmpeg: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            upload_dir: default_upload_dir(),
            max_connections: 100,
            max_workers: default_workers(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            io_timeout: None,
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

impl ServerConfig {
    /// Creates a new server configuration listening on `listen_addr`.
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    /// Builder: set upload directory.
    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = dir.into();
        self
    }

    /// Builder: set max connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.max(1);
        self
    }

    /// Builder: set worker pool size.
    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.max_workers = max.max(1);
        self
    }

    /// Builder: set the request body ceiling.
    pub fn with_max_body_size(mut self, max: u64) -> Self {
        self.max_body_size = max;
        self
    }

    /// Builder: set the per-operation I/O deadline.
    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Builder: set the ffmpeg executable.
    pub fn with_ffmpeg(mut self, program: impl Into<PathBuf>) -> Self {
        self.ffmpeg = program.into();
        self
    }
}

/// Returns the default upload directory, `./upload`.
pub fn default_upload_dir() -> PathBuf {
    PathBuf::from("upload")
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}
