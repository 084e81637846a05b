use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::stream::{
    error::{Error, Result},
    log::StreamLog,
};

use super::{
    config::ConsumerConfig,
    identity::ConsumerIdentity,
    parser::Parser,
    retry::RetryState,
    supervisor::{ConsumerExit, ConsumerState, Supervisor},
    worker::{PassReport, Worker},
};

/// At-least-once consumer of a stream through a consumer group
///
/// Decoded events are delivered on the bounded channel returned by [`Consumer::new`].
/// Each pass first reclaims stuck pending work (its own, and peers' once idle long
/// enough), then reads a new batch. A record is acknowledged only after it has been
/// handed to the channel, so downstream code must tolerate duplicates.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use streamgroup::stream::MemoryStreamLog;
/// use streamgroup::stream::consumer::{Consumer, ConsumerConfig, JsonFieldParser};
/// use tokio_util::sync::CancellationToken;
///
/// #[derive(serde::Deserialize)]
/// struct Event { id: String }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let log = Arc::new(MemoryStreamLog::new());
///     let config = ConsumerConfig::new("stats:events", "stats-service", "stats-consumer");
///
///     let (mut consumer, mut events) =
///         Consumer::new(log, config, JsonFieldParser::<Event>::default())?;
///
///     consumer.start(CancellationToken::new()).await?;
///
///     tokio::spawn(async move {
///         while let Some(event) = events.recv().await {
///             println!("event {}", event.id);
///         }
///     });
///
///     consumer.shutdown(Duration::from_secs(5)).await?;
///     Ok(())
/// }
/// ```
pub struct Consumer<T> {
    worker: Arc<Worker<T>>,
    state_tx: Option<watch::Sender<ConsumerState>>,
    state_rx: watch::Receiver<ConsumerState>,
    stop: Option<CancellationToken>,
    task: Option<JoinHandle<Result<ConsumerExit>>>,
    outcome: Option<Result<ConsumerExit>>,
}

impl<T: Send + 'static> Consumer<T> {
    /// Create a consumer identified as `<prefix>-<hostname>-<pid>`
    ///
    /// Returns the consumer and the receiving end of its output channel.
    pub fn new<P>(
        log: Arc<dyn StreamLog>,
        config: ConsumerConfig,
        parser: P,
    ) -> Result<(Self, mpsc::Receiver<T>)>
    where
        P: Parser<T>,
    {
        let identity = ConsumerIdentity::new(&config.consumer_id_prefix);
        Self::with_identity(log, config, parser, identity)
    }

    /// Create a consumer with an explicit identity
    pub fn with_identity<P>(
        log: Arc<dyn StreamLog>,
        config: ConsumerConfig,
        parser: P,
        identity: ConsumerIdentity,
    ) -> Result<(Self, mpsc::Receiver<T>)>
    where
        P: Parser<T>,
    {
        config.validate()?;

        info!(
            consumer_id = %identity,
            consumer_group = %config.consumer_group,
            stream_key = %config.stream_key,
            batch_size = config.batch_size,
            block_time = ?config.block_time,
            "stream consumer config"
        );

        let (output, events) = mpsc::channel(config.channel_capacity);
        let (state_tx, state_rx) = watch::channel(ConsumerState::Idle);

        let worker = Worker {
            log,
            identity,
            config,
            parser: Arc::new(parser),
            output,
        };

        Ok((
            Self {
                worker: Arc::new(worker),
                state_tx: Some(state_tx),
                state_rx,
                stop: None,
                task: None,
                outcome: None,
            },
            events,
        ))
    }

    /// Identity this consumer reads and claims under
    pub fn identity(&self) -> &ConsumerIdentity {
        &self.worker.identity
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.worker.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConsumerState {
        *self.state_rx.borrow()
    }

    /// Watch lifecycle state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConsumerState> {
        self.state_rx.clone()
    }

    /// Create the consumer group if it does not exist yet
    pub async fn ensure_group(&self) -> Result<()> {
        self.worker.ensure_group().await
    }

    /// Run a single reclaim + read pass in the calling task
    ///
    /// Useful for tests and custom loops. The group must exist.
    pub async fn poll_once(&self) -> Result<PassReport> {
        self.worker.run_pass(&CancellationToken::new()).await
    }

    /// Ensure the group exists and spawn the consume loop
    ///
    /// Cancelling `cancel` stops the loop as [`ConsumerExit::Cancelled`]. A failure to
    /// create the group is returned here and nothing is spawned.
    pub async fn start(&mut self, cancel: CancellationToken) -> Result<()> {
        let state = self.state_tx.take().ok_or(Error::AlreadyStarted)?;

        if let Err(e) = self.worker.ensure_group().await {
            self.state_tx = Some(state);
            return Err(e);
        }

        info!(
            consumer_id = %self.worker.identity,
            group = %self.worker.config.consumer_group,
            stream_key = %self.worker.config.stream_key,
            "consumer group ready; stream consumer initialized; start loop"
        );

        let stop = cancel.child_token();
        let supervisor = Supervisor {
            worker: Arc::clone(&self.worker),
            cancel,
            stop: stop.clone(),
            state,
            retry: RetryState::new(),
        };

        self.stop = Some(stop);
        self.task = Some(tokio::spawn(supervisor.run()));
        Ok(())
    }

    /// Signal the loop to stop and wait up to `timeout` for it to exit
    ///
    /// Safe to call more than once. Returns [`Error::ShutdownTimeout`] if the loop is
    /// still running after `timeout`; the loop keeps its stop signal and a later call
    /// can wait again.
    pub async fn shutdown(&mut self, timeout: Duration) -> Result<()> {
        info!(consumer_id = %self.worker.identity, "initiating consumer shutdown");

        let Some(stop) = &self.stop else {
            return Ok(());
        };
        stop.cancel();

        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, task).await {
            Ok(joined) => {
                self.task = None;
                self.outcome = Some(flatten(joined));
                info!(consumer_id = %self.worker.identity, "consumer stopped gracefully");
                Ok(())
            }
            Err(_) => {
                warn!(consumer_id = %self.worker.identity, ?timeout, "consumer shutdown timed out");
                Err(Error::ShutdownTimeout { timeout })
            }
        }
    }

    /// Wait for the loop to exit and return how it ended
    ///
    /// Retry exhaustion surfaces here as [`Error::RetriesExhausted`]. The outcome is
    /// reported once; later calls return [`Error::NotStarted`]. Cancel safe.
    pub async fn wait(&mut self) -> Result<ConsumerExit> {
        if let Some(outcome) = self.outcome.take() {
            return outcome;
        }

        let Some(task) = self.task.as_mut() else {
            return Err(Error::NotStarted);
        };

        // The handle is kept until the task completes so a dropped `wait` loses nothing
        let outcome = flatten(task.await);
        self.task = None;
        outcome
    }

    /// Whether the consume loop has exited
    pub fn is_finished(&self) -> bool {
        match &self.task {
            Some(task) => task.is_finished(),
            None => self.stop.is_some(),
        }
    }
}

fn flatten(
    joined: std::result::Result<Result<ConsumerExit>, tokio::task::JoinError>,
) -> Result<ConsumerExit> {
    joined.unwrap_or_else(|e| Err(Error::TaskFailed(e.to_string())))
}

impl<T> Drop for Consumer<T> {
    fn drop(&mut self) {
        if let Some(stop) = &self.stop {
            stop.cancel();
        }
    }
}
