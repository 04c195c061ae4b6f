//! Interrupt handling: Ctrl-C sets a cancellation token that the OTA flow checks
use tokio_util::sync::CancellationToken;

/// Shutdown signal that can be shared across tasks
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Request shutdown of the running OTA flow
    pub fn request_shutdown(&self) {
        log::info!("🛑 Shutdown requested");
        self.token.cancel();
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request shutdown on the first Ctrl-C.
    pub fn watch_ctrl_c(&self) {
        let signal = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => signal.request_shutdown(),
                Err(e) => log::warn!("Cannot listen for Ctrl-C: {}", e),
            }
        });
    }
}
