//! The stream log boundary consumed by [`Consumer`](crate::stream::consumer::Consumer)

use async_trait::async_trait;
use std::time::Duration;

use crate::stream::{
    error::Result,
    types::{EntryId, FieldMap, PendingEntry, PendingSummary, StreamRecord},
};

/// An append-only log with consumer-group semantics
///
/// Every call is keyed by stream key and group name. Implementations must make
/// `claim` atomic: an entry is reassigned only if it has been idle for at least
/// `min_idle`, so two consumers racing for the same entry cannot both win.
#[async_trait]
pub trait StreamLog: Send + Sync + 'static {
    /// Create `group` on `stream`, delivering entries after `start`
    ///
    /// The stream is created if it does not exist. Fails with
    /// [`Error::GroupExists`](crate::stream::Error::GroupExists) if the group is already there.
    async fn create_group(&self, stream: &str, group: &str, start: EntryId) -> Result<()>;

    /// Read up to `count` never-delivered entries for `consumer`
    ///
    /// Waits up to `block` for entries to arrive; `Duration::ZERO` does not wait.
    /// Returned entries are recorded as pending for `consumer`. An empty result is not an error.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamRecord>>;

    /// Aggregate pending counts for the group, grouped by owner
    async fn pending_summary(&self, stream: &str, group: &str) -> Result<PendingSummary>;

    /// Up to `count` pending entries owned by `consumer`, in id order
    async fn pending_entries(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<PendingEntry>>;

    /// Reassign pending entries idle for at least `min_idle` to `consumer`
    ///
    /// Returns the records actually claimed; entries that are not pending or not idle
    /// long enough are silently left out.
    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[EntryId],
    ) -> Result<Vec<StreamRecord>>;

    /// Acknowledge entries, removing them from the pending list
    ///
    /// Returns how many entries were actually pending.
    async fn ack(&self, stream: &str, group: &str, ids: &[EntryId]) -> Result<u64>;

    /// Append a record, returning its assigned id
    async fn add(&self, stream: &str, fields: FieldMap) -> Result<EntryId>;
}
