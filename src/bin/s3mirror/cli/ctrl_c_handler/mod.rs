use tokio::task::JoinHandle;
use tokio::{select, signal};
use tracing::{debug, error, warn};

use s3mirror::types::token::PipelineCancellationToken;

/// Listens for ctrl-c while a mirror runs and turns it into a pipeline
/// cancellation. In-flight transfers observe the token and are interrupted.
pub struct CtrlCHandler {
    join_handle: JoinHandle<bool>,
    stop: PipelineCancellationToken,
}

impl CtrlCHandler {
    pub fn spawn(cancellation_token: PipelineCancellationToken) -> Self {
        // a child token also fires when the pipeline itself is cancelled
        let stop = cancellation_token.child_token();
        let watched = stop.clone();

        let join_handle = tokio::spawn(async move {
            select! {
                _ = watched.cancelled() => {
                    debug!("ctrl-c handler stopped.");
                    false
                }
                result = signal::ctrl_c() => match result {
                    Ok(()) => {
                        warn!("ctrl-c received, interrupting running transfers.");
                        cancellation_token.cancel();
                        true
                    }
                    Err(e) => {
                        error!(error = e.to_string(), "failed to listen for ctrl-c.");
                        false
                    }
                }
            }
        });

        Self { join_handle, stop }
    }

    /// Stops listening. Returns `true` if ctrl-c was received.
    pub async fn finish(self) -> bool {
        self.stop.cancel();
        self.join_handle.await.unwrap_or(false)
    }
}

// SIGINT reaches every test in the process.
#[cfg(test)]
pub static SIGNAL_TEST_SEMAPHORE: once_cell::sync::Lazy<std::sync::Arc<tokio::sync::Semaphore>> =
    once_cell::sync::Lazy::new(|| std::sync::Arc::new(tokio::sync::Semaphore::new(1)));
