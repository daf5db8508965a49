//! Server command: runs the MMP server in the foreground.

use std::sync::Arc;

use tracing::info;

use mediaferry_server::{
    FfmpegProcessor, RequestHandler, Shutdown, TcpServer, make_connection_handler,
};

use crate::cli::ServerArgs;
use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Starts the server and serves until SIGTERM or SIGINT.
///
/// Sessions still running when the signal arrives finish in their own tasks.
pub async fn run(config: &ClientConfig, args: ServerArgs) -> ClientResult<()> {
    let mut server_config = config.to_server_config()?;
    if let Some(listen) = args.listen {
        server_config.listen_addr = listen;
    }
    if let Some(dir) = args.upload_dir {
        server_config = server_config.with_upload_dir(dir);
    }
    if let Some(workers) = args.workers {
        server_config = server_config.with_max_workers(workers);
    }

    let shutdown = Shutdown::new();
    shutdown.listen_for_signals();

    let processor = Arc::new(FfmpegProcessor::new(&server_config.ffmpeg));
    let handler = Arc::new(RequestHandler::from_config(&server_config, processor));
    info!(
        ffmpeg = %server_config.ffmpeg.display(),
        workers = server_config.max_workers,
        "Media processor ready"
    );

    let server = TcpServer::new(server_config).await?;
    server
        .run_until_shutdown(make_connection_handler(handler), shutdown.triggered())
        .await?;

    info!("Server stopped");
    Ok(())
}
