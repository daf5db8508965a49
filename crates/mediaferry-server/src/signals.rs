//! Graceful shutdown.
//!
//! A [`Shutdown`] is a one-way flag: once triggered, by SIGTERM, SIGINT or
//! a direct call, it stays triggered. The accept loop waits on it; sessions
//! already running finish in their own tasks.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

/// Shared shutdown flag. Clones observe and trigger the same flag.
#[derive(Debug, Clone)]
pub struct Shutdown {
    flag: Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
        }
    }

    /// Triggers shutdown on SIGTERM or SIGINT.
    ///
    /// If the handlers cannot be installed the failure is logged and only
    /// [`Shutdown::trigger`] stops the server.
    #[cfg(unix)]
    pub fn listen_for_signals(&self) {
        let shutdown = self.clone();

        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};

            let (mut term, mut int) =
                match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                    (Ok(term), Ok(int)) => (term, int),
                    (Err(e), _) | (_, Err(e)) => {
                        error!(error = %e, "Failed to install signal handlers");
                        return;
                    }
                };

            let name = tokio::select! {
                _ = term.recv() => "SIGTERM",
                _ = int.recv() => "SIGINT",
            };
            info!(signal = name, "Shutting down");
            shutdown.trigger();
        });
    }

    /// Triggers shutdown on Ctrl+C.
    #[cfg(not(unix))]
    pub fn listen_for_signals(&self) {
        let shutdown = self.clone();

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!(signal = "ctrl-c", "Shutting down");
                    shutdown.trigger();
                }
                Err(e) => error!(error = %e, "Failed to install Ctrl+C handler"),
            }
        });
    }

    /// Sets the flag. Later calls do nothing.
    pub fn trigger(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.flag.borrow()
    }

    /// Completes once the flag is set, immediately if it already is.
    pub async fn triggered(&self) {
        let mut rx = self.flag.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|set| *set).await;
    }
}
