//! In-process stream log with full consumer-group semantics
//!
//! [`MemoryStreamLog`] keeps streams, groups and pending entry lists in memory. It is
//! useful for tests and for wiring a consumer inside a single process. Idle times are
//! measured with tokio's clock, so tests running with a paused clock can advance time
//! deterministically.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::stream::{
    error::{Error, Result},
    log::StreamLog,
    types::{EntryId, FieldMap, PendingEntry, PendingSummary, StreamRecord},
};

/// In-memory [`StreamLog`]
///
/// Cloning is cheap and yields a handle to the same underlying log.
#[derive(Debug, Clone, Default)]
pub struct MemoryStreamLog {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    streams: Mutex<HashMap<String, Stream>>,
    appended: Notify,
}

#[derive(Debug, Default)]
struct Stream {
    entries: BTreeMap<EntryId, FieldMap>,
    last_id: EntryId,
    groups: HashMap<String, Group>,
}

#[derive(Debug)]
struct Group {
    last_delivered: EntryId,
    pending: BTreeMap<EntryId, PendingRecord>,
}

#[derive(Debug)]
struct PendingRecord {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u64,
}

impl Stream {
    fn group(&self, stream: &str, group: &str) -> Result<&Group> {
        self.groups.get(group).ok_or_else(|| no_group(stream, group))
    }

    fn group_mut(&mut self, stream: &str, group: &str) -> Result<&mut Group> {
        self.groups.get_mut(group).ok_or_else(|| no_group(stream, group))
    }
}

fn no_group(stream: &str, group: &str) -> Error {
    Error::NoGroup {
        stream: stream.to_string(),
        group: group.to_string(),
    }
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

impl MemoryStreamLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in `stream`
    pub fn len(&self, stream: &str) -> usize {
        self.inner
            .streams
            .lock()
            .get(stream)
            .map(|s| s.entries.len())
            .unwrap_or(0)
    }

    /// Whether `stream` has no entries
    pub fn is_empty(&self, stream: &str) -> bool {
        self.len(stream) == 0
    }

    /// Move never-delivered entries to `consumer`'s pending list
    fn deliver_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamRecord>> {
        let mut streams = self.inner.streams.lock();
        let s = streams.get_mut(stream).ok_or_else(|| no_group(stream, group))?;
        let Stream { entries, groups, .. } = s;
        let g = groups.get_mut(group).ok_or_else(|| no_group(stream, group))?;

        let now = Instant::now();
        let records: Vec<StreamRecord> = entries
            .range((Bound::Excluded(g.last_delivered), Bound::Unbounded))
            .take(count)
            .map(|(id, fields)| StreamRecord::new(*id, fields.clone()))
            .collect();

        for record in &records {
            g.pending.insert(
                record.id,
                PendingRecord {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                    delivery_count: 1,
                },
            );
            g.last_delivered = record.id;
        }

        Ok(records)
    }
}

#[async_trait]
impl StreamLog for MemoryStreamLog {
    async fn create_group(&self, stream: &str, group: &str, start: EntryId) -> Result<()> {
        let mut streams = self.inner.streams.lock();
        let s = streams.entry(stream.to_string()).or_default();

        if s.groups.contains_key(group) {
            return Err(Error::GroupExists {
                stream: stream.to_string(),
                group: group.to_string(),
            });
        }

        s.groups.insert(
            group.to_string(),
            Group {
                last_delivered: start,
                pending: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamRecord>> {
        let deadline = Instant::now() + block;

        loop {
            // Register for wakeups before looking, so an append in between is not missed
            let appended = self.inner.appended.notified();

            let records = self.deliver_new(stream, group, consumer, count)?;
            if !records.is_empty() || block.is_zero() {
                return Ok(records);
            }

            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn pending_summary(&self, stream: &str, group: &str) -> Result<PendingSummary> {
        let streams = self.inner.streams.lock();
        let s = streams.get(stream).ok_or_else(|| no_group(stream, group))?;
        let g = s.group(stream, group)?;

        let mut consumers = BTreeMap::new();
        for pe in g.pending.values() {
            *consumers.entry(pe.consumer.clone()).or_insert(0) += 1;
        }

        Ok(PendingSummary {
            count: g.pending.len() as u64,
            lowest: g.pending.keys().next().copied(),
            highest: g.pending.keys().next_back().copied(),
            consumers,
        })
    }

    async fn pending_entries(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<PendingEntry>> {
        let streams = self.inner.streams.lock();
        let s = streams.get(stream).ok_or_else(|| no_group(stream, group))?;
        let g = s.group(stream, group)?;
        let now = Instant::now();

        Ok(g.pending
            .iter()
            .filter(|(_, pe)| pe.consumer == consumer)
            .take(count)
            .map(|(id, pe)| PendingEntry {
                id: *id,
                consumer: pe.consumer.clone(),
                idle: now.saturating_duration_since(pe.delivered_at),
                delivery_count: pe.delivery_count,
            })
            .collect())
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[EntryId],
    ) -> Result<Vec<StreamRecord>> {
        let mut streams = self.inner.streams.lock();
        let s = streams.get_mut(stream).ok_or_else(|| no_group(stream, group))?;
        let Stream { entries, groups, .. } = s;
        let g = groups.get_mut(group).ok_or_else(|| no_group(stream, group))?;
        let now = Instant::now();

        let mut claimed = Vec::new();
        for id in ids {
            let Some(pe) = g.pending.get_mut(id) else {
                continue;
            };
            if now.saturating_duration_since(pe.delivered_at) < min_idle {
                continue;
            }
            let Some(fields) = entries.get(id) else {
                continue;
            };

            pe.consumer = consumer.to_string();
            pe.delivered_at = now;
            pe.delivery_count += 1;
            claimed.push(StreamRecord::new(*id, fields.clone()));
        }

        Ok(claimed)
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[EntryId]) -> Result<u64> {
        let mut streams = self.inner.streams.lock();
        let s = streams.get_mut(stream).ok_or_else(|| no_group(stream, group))?;
        let g = s.group_mut(stream, group)?;

        Ok(ids.iter().filter(|id| g.pending.remove(id).is_some()).count() as u64)
    }

    async fn add(&self, stream: &str, fields: FieldMap) -> Result<EntryId> {
        let id = {
            let mut streams = self.inner.streams.lock();
            let s = streams.entry(stream.to_string()).or_default();
            let id = s.last_id.next_after(now_ms());
            s.entries.insert(id, fields);
            s.last_id = id;
            id
        };

        self.inner.appended.notify_waiters();
        Ok(id)
    }
}
