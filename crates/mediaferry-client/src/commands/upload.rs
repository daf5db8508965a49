//! Upload command.

use mediaferry_protocol::Parameters;

use crate::cli::UploadArgs;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::socket::{MmpClient, UploadOutcome};

/// Uploads a file, then prints where the processed result was saved.
pub async fn run(config: &ClientConfig, args: UploadArgs) -> ClientResult<()> {
    let response_dir = args
        .response_dir
        .unwrap_or_else(|| config.client.response_dir.clone());
    let client = MmpClient::new(config.server_addr())
        .with_timeout(config.client_timeout())
        .with_response_dir(response_dir);

    let parameters: Parameters = args.params.into_iter().collect();

    match client.upload(&args.file, args.operation, parameters).await? {
        UploadOutcome::Saved {
            path,
            media_type,
            bytes,
        } => {
            println!("saved {} ({}, {} bytes)", path.display(), media_type, bytes);
            Ok(())
        }
        UploadOutcome::Failed => Err(ClientError::Server(format!(
            "server could not {} {}",
            args.operation,
            args.file.display()
        ))),
    }
}
