//! TCP listener for MMP clients.
//!
//! Each accepted connection carries exactly one exchange and is handed to
//! its own task. A semaphore caps how many connections are served at once;
//! further clients wait in the listen backlog.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info};

use mediaferry_protocol::Transport;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// TCP server handing out one [`Connection`] per client.
pub struct TcpServer {
    /// Server configuration.
    config: ServerConfig,
    /// TCP listener.
    listener: TcpListener,
    /// Semaphore for limiting concurrent connections.
    connection_semaphore: Arc<Semaphore>,
}

impl TcpServer {
    /// Creates the upload directory and binds the listen address.
    pub async fn new(config: ServerConfig) -> ServerResult<Self> {
        tokio::fs::create_dir_all(&config.upload_dir)
            .await
            .map_err(|source| ServerError::UploadDir {
                path: config.upload_dir.clone(),
                source,
            })?;

        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.listen_addr,
                source,
            })?;
        info!(
            addr = %listener.local_addr()?,
            upload_dir = %config.upload_dir.display(),
            max_connections = config.max_connections,
            "TCP server listening"
        );

        let connection_semaphore = Arc::new(Semaphore::new(config.max_connections));

        Ok(Self {
            config,
            listener,
            connection_semaphore,
        })
    }

    /// Address actually bound (useful when listening on port 0).
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts a single connection.
    ///
    /// Waits for a free connection slot before accepting.
    pub async fn accept(&self) -> ServerResult<Connection> {
        let permit = self
            .connection_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ServerError::Shutdown)?;

        let (stream, peer) = self.listener.accept().await?;
        debug!(peer = %peer, "Accepted new connection");

        let transport = Transport::new(stream)
            .with_timeout(self.config.io_timeout)
            .with_max_body_size(self.config.max_body_size);

        Ok(Connection {
            transport,
            peer,
            _permit: permit,
        })
    }

    /// Runs the server accept loop, calling the handler for each connection.
    ///
    /// This method runs until the connection semaphore is closed.
    pub async fn run<F, Fut>(&self, handler: F) -> ServerResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        loop {
            match self.accept().await {
                Ok(connection) => {
                    tokio::spawn(handler(connection));
                }
                Err(ServerError::Shutdown) => return Ok(()),
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Runs the server accept loop with a shutdown signal.
    ///
    /// The server stops accepting when the shutdown future completes;
    /// sessions already running finish in their own tasks.
    pub async fn run_until_shutdown<F, Fut, S>(&self, handler: F, shutdown: S) -> ServerResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
        S: std::future::Future<Output = ()> + Send,
    {
        tokio::select! {
            result = self.run(handler) => result,
            _ = shutdown => {
                info!("Shutdown signal received");
                Ok(())
            }
        }
    }
}

/// A client connection, holding one connection slot until dropped.
pub struct Connection {
    transport: Transport<TcpStream>,
    peer: SocketAddr,
    _permit: OwnedSemaphorePermit,
}

impl Connection {
    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// The framed stream.
    pub fn transport_mut(&mut self) -> &mut Transport<TcpStream> {
        &mut self.transport
    }
}
