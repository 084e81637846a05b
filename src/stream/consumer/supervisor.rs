//! The retry loop that drives reclaim + read passes

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::stream::error::{Error, Result};

use super::{retry::RetryState, worker::Worker};

/// Lifecycle state of a running consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Not started yet
    Idle,
    /// Running reclaim + read passes
    Running,
    /// Waiting before the next attempt after a failed pass
    BackingOff { retry_count: u32, delay: Duration },
    /// The loop has exited
    Stopped,
}

/// Why the loop exited without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerExit {
    /// The cancellation token given to `start` was cancelled
    Cancelled,
    /// `shutdown` was called
    Shutdown,
}

pub(crate) struct Supervisor<T> {
    pub(crate) worker: Arc<Worker<T>>,
    /// Token handed to `start` by the caller
    pub(crate) cancel: CancellationToken,
    /// Child of `cancel`, also cancelled by `shutdown`
    pub(crate) stop: CancellationToken,
    pub(crate) state: watch::Sender<ConsumerState>,
    pub(crate) retry: RetryState,
}

impl<T: Send + 'static> Supervisor<T> {
    pub(crate) async fn run(mut self) -> Result<ConsumerExit> {
        let exit = self.run_loop().await;
        self.state.send_replace(ConsumerState::Stopped);
        exit
    }

    fn exit_reason(&self) -> ConsumerExit {
        if self.cancel.is_cancelled() {
            ConsumerExit::Cancelled
        } else {
            ConsumerExit::Shutdown
        }
    }

    async fn run_loop(&mut self) -> Result<ConsumerExit> {
        let consumer_id = self.worker.identity.clone();
        let max_retries = self.worker.config.max_retries;
        let retry_delay = self.worker.config.retry_delay;

        loop {
            if self.stop.is_cancelled() {
                let exit = self.exit_reason();
                info!(consumer_id = %consumer_id, ?exit, "consume loop stopping");
                return Ok(exit);
            }

            self.state.send_replace(ConsumerState::Running);

            let err = match self.worker.run_pass(&self.stop).await {
                Ok(_) => {
                    self.retry.reset();
                    // A pass on a non-blocking log may never return Pending
                    tokio::task::yield_now().await;
                    continue;
                }
                Err(Error::OutputClosed) => {
                    error!(consumer_id = %consumer_id, "output channel closed; stopping consume loop");
                    return Err(Error::OutputClosed);
                }
                Err(e) => e,
            };

            if self.stop.is_cancelled() {
                let exit = self.exit_reason();
                info!(
                    consumer_id = %consumer_id,
                    ?exit,
                    error = %err,
                    "consume loop stopping; last pass failed"
                );
                return Ok(exit);
            }

            warn!(
                consumer_id = %consumer_id,
                error = %err,
                retry_count = self.retry.count(),
                "error during message processing"
            );
            let retry_count = self.retry.record_failure();

            if self.retry.is_exhausted(max_retries) {
                error!(
                    consumer_id = %consumer_id,
                    error = %err,
                    retry_count,
                    "max retries exceeded; stopping consume loop"
                );
                return Err(Error::RetriesExhausted {
                    retries: retry_count,
                    source: Box::new(err),
                });
            }

            let delay = self.retry.backoff(retry_delay);
            self.state
                .send_replace(ConsumerState::BackingOff { retry_count, delay });
            info!(
                consumer_id = %consumer_id,
                retry_count,
                backoff_delay = ?delay,
                "waiting before retry"
            );

            tokio::select! {
                _ = self.stop.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
