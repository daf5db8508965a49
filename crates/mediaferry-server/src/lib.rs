//! mediaferry server: accepts MMP connections and processes uploaded media.
//!
//! This crate provides:
//! - A TCP listener handing each connection to its own task
//! - The per-connection session driver and request dispatcher
//! - The [`MediaProcessor`] seam, with an ffmpeg implementation run on a
//!   bounded worker pool
//! - Cleanup of every file created while serving a request
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mediaferry_server::{
//!     FfmpegProcessor, RequestHandler, ServerConfig, TcpServer, make_connection_handler,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let processor = Arc::new(FfmpegProcessor::new(&config.ffmpeg));
//!     let handler = Arc::new(RequestHandler::from_config(&config, processor));
//!
//!     let server = TcpServer::new(config).await?;
//!     server.run(make_connection_handler(handler)).await?;
//!     Ok(())
//! }
//! ```

mod artifacts;
mod config;
mod error;
mod handler;
mod processor;
mod session;
mod signals;
mod socket;
mod worker;

pub use artifacts::TransientArtifacts;
pub use config::{DEFAULT_PORT, ServerConfig, default_upload_dir};
pub use error::{DispatchError, ServerError, ServerResult};
pub use handler::{RequestHandler, make_connection_handler};
pub use processor::{FfmpegProcessor, MediaProcessor, OutputFormat, ProcessingError, ProcessingJob};
pub use session::{Session, SessionState};
pub use signals::Shutdown;
pub use socket::{Connection, TcpServer};
pub use worker::WorkerPool;
