//! Ping command.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::socket::MmpClient;

/// Pings the configured server and reports whether it answered.
pub async fn run(config: &ClientConfig, message: &str) -> ClientResult<()> {
    let client = MmpClient::new(config.server_addr()).with_timeout(config.client_timeout());

    if client.ping(message).await? {
        println!("server at {} is up", client.addr());
        Ok(())
    } else {
        Err(ClientError::Server(format!(
            "server at {} answered the ping with an error",
            client.addr()
        )))
    }
}
