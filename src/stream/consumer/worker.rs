//! Group initialization, batch reading and acknowledgment
//!
//! A [`Worker`] holds everything one consumer pass needs. The supervisor task and
//! [`Consumer::poll_once`](super::Consumer::poll_once) both drive passes through it.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::stream::{
    error::{Error, Result},
    log::StreamLog,
    types::{EntryId, StreamRecord},
};

use super::{config::ConsumerConfig, identity::ConsumerIdentity, parser::Parser};

/// What happened to a single record handed to the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Sent downstream and acknowledged
    Acked,
    /// Decode failed; left pending
    Skipped,
    /// Sent downstream but the acknowledgment failed; left pending
    Unacked,
    /// Cancelled before the send completed; left pending
    Abandoned,
}

/// Counters for one reclaim + read pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Records returned by the read
    pub read: usize,
    /// Pending records claimed by this consumer
    pub claimed: usize,
    /// Records sent downstream and acknowledged
    pub acked: usize,
    /// Records whose decode failed
    pub skipped: usize,
    /// Records sent downstream whose acknowledgment failed
    pub unacked: usize,
    /// Records whose send was abandoned on cancellation
    pub abandoned: usize,
    /// Claims that failed at the log
    pub claim_failures: usize,
}

impl PassReport {
    pub(crate) fn record(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Acked => self.acked += 1,
            Delivery::Skipped => self.skipped += 1,
            Delivery::Unacked => self.unacked += 1,
            Delivery::Abandoned => self.abandoned += 1,
        }
    }

    pub(crate) fn merge(&mut self, other: PassReport) {
        self.read += other.read;
        self.claimed += other.claimed;
        self.acked += other.acked;
        self.skipped += other.skipped;
        self.unacked += other.unacked;
        self.abandoned += other.abandoned;
        self.claim_failures += other.claim_failures;
    }
}

pub(crate) struct Worker<T> {
    pub(crate) log: Arc<dyn StreamLog>,
    pub(crate) identity: ConsumerIdentity,
    pub(crate) config: ConsumerConfig,
    pub(crate) parser: Arc<dyn Parser<T>>,
    pub(crate) output: mpsc::Sender<T>,
}

impl<T: Send + 'static> Worker<T> {
    /// Create the consumer group, treating "already exists" as success
    pub(crate) async fn ensure_group(&self) -> Result<()> {
        let stream = &self.config.stream_key;
        let group = &self.config.consumer_group;

        match self.log.create_group(stream, group, EntryId::ZERO).await {
            Ok(()) => {
                info!(stream_key = %stream, group = %group, "consumer group created");
            }
            Err(e) if e.is_group_exists() => {
                info!(stream_key = %stream, group = %group, "consumer group already exists, proceeding");
            }
            Err(e) => {
                error!(stream_key = %stream, group = %group, error = %e, "failed to create consumer group");
                return Err(e);
            }
        }

        Ok(())
    }

    /// One full pass: reclaim stuck work, then read new records
    ///
    /// Both steps always run; the first error observed is returned. A closed output
    /// channel aborts the pass immediately.
    pub(crate) async fn run_pass(&self, cancel: &CancellationToken) -> Result<PassReport> {
        let mut report = PassReport::default();
        let mut failure = None;

        match self.reclaim_pending(cancel).await {
            Ok(reclaimed) => report.merge(reclaimed),
            Err(Error::OutputClosed) => return Err(Error::OutputClosed),
            Err(e) => failure = Some(e),
        }

        if cancel.is_cancelled() {
            return failure.map_or(Ok(report), Err);
        }

        match self.read_batch(cancel).await {
            Ok(read) => report.merge(read),
            Err(Error::OutputClosed) => return Err(Error::OutputClosed),
            Err(e) => {
                failure.get_or_insert(e);
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Read a batch of new records for this consumer and hand them downstream
    pub(crate) async fn read_batch(&self, cancel: &CancellationToken) -> Result<PassReport> {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(PassReport::default()),
            read = self.log.read_group(
                &self.config.stream_key,
                &self.config.consumer_group,
                self.identity.as_str(),
                self.config.batch_size,
                self.config.block_time,
            ) => read,
        };

        let records = read.map_err(|e| {
            error!(consumer_id = %self.identity, error = %e, "read from consumer group failed");
            e
        })?;

        let mut report = PassReport {
            read: records.len(),
            ..Default::default()
        };
        for record in records {
            report.record(self.deliver(record, cancel).await?);
        }

        if report.read > 0 {
            debug!(consumer_id = %self.identity, ?report, "batch processed");
        }
        Ok(report)
    }

    /// Decode a record, send it downstream and acknowledge it
    ///
    /// Only a closed output channel is an error; every other failure leaves the
    /// record pending for a later reclaim pass.
    pub(crate) async fn deliver(
        &self,
        record: StreamRecord,
        cancel: &CancellationToken,
    ) -> Result<Delivery> {
        debug!(message_id = %record.id, values = ?record.fields, "processing message");

        let event = match self.parser.parse(&record) {
            Ok(event) => event,
            Err(e) => {
                error!(
                    message_id = %record.id,
                    consumer_id = %self.identity,
                    error = %e,
                    "failed to parse message; leaving it pending"
                );
                return Ok(Delivery::Skipped);
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(
                    message_id = %record.id,
                    consumer_id = %self.identity,
                    "send abandoned on cancellation; message stays pending"
                );
                return Ok(Delivery::Abandoned);
            }
            sent = self.output.send(event) => {
                if sent.is_err() {
                    error!(message_id = %record.id, consumer_id = %self.identity, "output channel closed");
                    return Err(Error::OutputClosed);
                }
            }
        }

        match self.ack(record.id).await {
            Ok(()) => Ok(Delivery::Acked),
            Err(e) => {
                error!(
                    message_id = %record.id,
                    consumer_id = %self.identity,
                    error = %e,
                    "failed to acknowledge message"
                );
                Ok(Delivery::Unacked)
            }
        }
    }

    async fn ack(&self, id: EntryId) -> Result<()> {
        let acked = self
            .log
            .ack(&self.config.stream_key, &self.config.consumer_group, &[id])
            .await?;
        debug!(message_id = %id, ack_count = acked, "message acknowledged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::consumer::JsonFieldParser;
    use crate::stream::{FieldMap, MemoryStreamLog};
    use std::time::Duration;

    const STREAM: &str = "stats:events";
    const GROUP: &str = "stats-service";

    fn worker(
        log: Arc<MemoryStreamLog>,
        capacity: usize,
    ) -> (Worker<serde_json::Value>, mpsc::Receiver<serde_json::Value>) {
        let (output, events) = mpsc::channel(capacity);
        let worker = Worker {
            log,
            identity: ConsumerIdentity::from_parts("stats-consumer", "a", 1),
            config: ConsumerConfig::new(STREAM, GROUP, "stats-consumer"),
            parser: Arc::new(JsonFieldParser::<serde_json::Value>::default()),
            output,
        };
        (worker, events)
    }

    async fn read_one(log: &MemoryStreamLog, consumer: &str) -> StreamRecord {
        let fields = FieldMap::from([("data".to_string(), r#"{"value":1}"#.to_string())]);
        log.add(STREAM, fields).await.unwrap();
        let mut records = log
            .read_group(STREAM, GROUP, consumer, 1, Duration::ZERO)
            .await
            .unwrap();
        records.remove(0)
    }

    #[tokio::test]
    async fn test_full_output_abandons_send_on_cancel() {
        let log = Arc::new(MemoryStreamLog::new());
        let (worker, mut events) = worker(log.clone(), 1);
        worker.ensure_group().await.unwrap();

        let consumer = worker.identity.as_str().to_string();
        let first = read_one(&log, &consumer).await;
        let second = read_one(&log, &consumer).await;

        let cancel = CancellationToken::new();
        assert_eq!(worker.deliver(first, &cancel).await.unwrap(), Delivery::Acked);

        // Channel is full; the send can only end through cancellation
        cancel.cancel();
        let delivery = worker.deliver(second, &cancel).await.unwrap();
        assert_eq!(delivery, Delivery::Abandoned);

        let mut report = PassReport::default();
        report.record(delivery);
        assert_eq!(report.abandoned, 1);
        assert_eq!(report.acked, 0);

        let summary = log.pending_summary(STREAM, GROUP).await.unwrap();
        assert_eq!(summary.count, 1);
        assert_eq!(summary.count_for(&consumer), 1);

        assert_eq!(events.recv().await.unwrap()["value"], 1);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_output_is_an_error() {
        let log = Arc::new(MemoryStreamLog::new());
        let (worker, events) = worker(log.clone(), 1);
        worker.ensure_group().await.unwrap();
        drop(events);

        let consumer = worker.identity.as_str().to_string();
        let record = read_one(&log, &consumer).await;
        assert!(matches!(
            worker.deliver(record, &CancellationToken::new()).await,
            Err(Error::OutputClosed)
        ));
    }
}
