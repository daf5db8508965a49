//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/mediaferry/config.toml` by default. The `[server]` table is
//! shared: the client connects to `host:port` and the `server` command
//! listens there.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use mediaferry_server::{DEFAULT_PORT, ServerConfig};

use crate::error::{ClientError, ClientResult};
use crate::socket::DEFAULT_RESPONSE_DIR;

/// Configuration for mediaferry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug mode.
    pub debug: bool,

    /// Server settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Client settings.
    #[serde(default)]
    pub client: ClientSettings,
}

/// Server settings, used both to reach and to run a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host name or address.
    pub host: String,

    /// TCP port.
    pub port: u16,

    /// Directory uploads are written to.
    pub upload_dir: PathBuf,

    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// Concurrent media processing jobs; defaults to the CPU count.
    pub workers: Option<usize>,

    /// Per read/write deadline in seconds; 0 disables it.
    pub io_timeout: u64,

    /// ffmpeg executable.
    pub ffmpeg: PathBuf,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            upload_dir: defaults.upload_dir,
            max_connections: defaults.max_connections,
            workers: None,
            io_timeout: 0,
            ffmpeg: defaults.ffmpeg,
        }
    }
}

/// Client-side settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Directory processed files are saved to.
    pub response_dir: PathBuf,

    /// Network timeout in seconds; 0 waits forever.
    pub timeout: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            response_dir: PathBuf::from(DEFAULT_RESPONSE_DIR),
            timeout: 0,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the default path.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("failed to read config: {}", e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mediaferry")
    }

    /// `host:port` of the server.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Client network timeout, if any.
    pub fn client_timeout(&self) -> Option<Duration> {
        seconds(self.client.timeout)
    }

    /// Builds the configuration of a server listening on `host:port`.
    pub fn to_server_config(&self) -> ClientResult<ServerConfig> {
        let addr = self.resolve_listen_addr()?;
        let mut config = ServerConfig::new(addr)
            .with_upload_dir(&self.server.upload_dir)
            .with_max_connections(self.server.max_connections)
            .with_io_timeout(seconds(self.server.io_timeout))
            .with_ffmpeg(&self.server.ffmpeg);
        if let Some(workers) = self.server.workers {
            config = config.with_max_workers(workers);
        }
        Ok(config)
    }

    fn resolve_listen_addr(&self) -> ClientResult<SocketAddr> {
        let addr = self.server_addr();
        addr.to_socket_addrs()
            .map_err(|e| ClientError::Config(format!("cannot resolve {}: {}", addr, e)))?
            .next()
            .ok_or_else(|| ClientError::Config(format!("{} resolves to no address", addr)))
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
