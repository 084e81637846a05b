//! Reclaiming pending work from crashed or stalled consumers
//!
//! Each pass scans every owner's pending entries and claims the eligible ones:
//!
//! - entries owned by this consumer are claimed with no idle requirement, so its own
//!   unacknowledged work (failed decode, failed ack, abandoned send) is retried;
//! - entries owned by a peer are claimed once they were delivered more than
//!   `max_retries` times or have been idle longer than `min_idle`. The claim itself
//!   carries `min_idle` so two consumers racing for the same entry cannot both win.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::stream::{
    error::Result,
    types::PendingEntry,
};

use super::{identity::ConsumerIdentity, worker::PassReport, worker::Worker};

/// Whether and how to claim a pending entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimDecision {
    /// Leave the entry with its owner
    Skip,
    /// Claim, requiring the entry to have been idle at least `min_idle`
    Claim { min_idle: Duration },
}

impl ClaimDecision {
    pub fn evaluate(
        entry: &PendingEntry,
        identity: &ConsumerIdentity,
        max_retries: u32,
        min_idle: Duration,
    ) -> Self {
        if identity.as_str() == entry.consumer {
            return ClaimDecision::Claim {
                min_idle: Duration::ZERO,
            };
        }

        let reached_max_retries = entry.delivery_count > u64::from(max_retries);
        let idle_timeout = entry.idle > min_idle;

        if reached_max_retries || idle_timeout {
            ClaimDecision::Claim { min_idle }
        } else {
            ClaimDecision::Skip
        }
    }
}

impl<T: Send + 'static> Worker<T> {
    /// Scan all owners' pending entries and process the ones this consumer claims
    ///
    /// Failing to fetch the summary aborts the scan. A failed detail fetch for one owner
    /// is reported after the remaining owners have been scanned. Claim failures only
    /// affect their own entry.
    pub(crate) async fn reclaim_pending(&self, cancel: &CancellationToken) -> Result<PassReport> {
        let stream = &self.config.stream_key;
        let group = &self.config.consumer_group;

        let summary = self.log.pending_summary(stream, group).await.map_err(|e| {
            error!(consumer_id = %self.identity, error = %e, "failed to get total pending count");
            e
        })?;

        let mut report = PassReport::default();
        let mut failure = None;

        for (owner, count) in summary.owners() {
            if cancel.is_cancelled() {
                break;
            }

            let count = usize::try_from(count).unwrap_or(usize::MAX);
            let entries = match self.log.pending_entries(stream, group, owner, count).await {
                Ok(entries) => entries,
                Err(e) => {
                    error!(
                        consumer_id = %self.identity,
                        owner = %owner,
                        error = %e,
                        "failed to get detailed pending entries"
                    );
                    failure.get_or_insert(e);
                    continue;
                }
            };

            for entry in entries {
                if cancel.is_cancelled() {
                    break;
                }
                self.reclaim_entry(&entry, cancel, &mut report).await?;
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    async fn reclaim_entry(
        &self,
        entry: &PendingEntry,
        cancel: &CancellationToken,
        report: &mut PassReport,
    ) -> Result<()> {
        let decision = ClaimDecision::evaluate(
            entry,
            &self.identity,
            self.config.max_retries,
            self.config.min_idle,
        );
        debug!(
            message_id = %entry.id,
            owner = %entry.consumer,
            delivery_count = entry.delivery_count,
            idle = ?entry.idle,
            ?decision,
            "claim condition check"
        );

        let ClaimDecision::Claim { min_idle } = decision else {
            return Ok(());
        };

        let claimed = match self
            .log
            .claim(
                &self.config.stream_key,
                &self.config.consumer_group,
                self.identity.as_str(),
                min_idle,
                &[entry.id],
            )
            .await
        {
            Ok(records) => records,
            Err(e) => {
                error!(
                    message_id = %entry.id,
                    owner = %entry.consumer,
                    consumer_id = %self.identity,
                    error = %e,
                    "failed to claim message"
                );
                report.claim_failures += 1;
                return Ok(());
            }
        };

        if !claimed.is_empty() {
            info!(
                message_id = %entry.id,
                previous_owner = %entry.consumer,
                claimed_count = claimed.len(),
                "claimed pending message"
            );
        }

        for record in claimed {
            report.claimed += 1;
            report.record(self.deliver(record, cancel).await?);
        }
        Ok(())
    }
}
