use std::collections::BTreeMap;
use std::time::Duration;

use super::record::EntryId;

/// A delivered-but-unacknowledged entry, as reported by the log
///
/// Always fetched fresh; ownership can change between reclaim passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    /// Entry id
    pub id: EntryId,

    /// Consumer identity currently owning the entry
    pub consumer: String,

    /// Time since the last delivery or claim
    pub idle: Duration,

    /// Number of times the entry has been delivered
    pub delivery_count: u64,
}

/// Aggregate pending information for a consumer group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingSummary {
    /// Total pending entries in the group
    pub count: u64,

    /// Smallest pending id, if any
    pub lowest: Option<EntryId>,

    /// Largest pending id, if any
    pub highest: Option<EntryId>,

    /// Pending count per owning consumer
    pub consumers: BTreeMap<String, u64>,
}

impl PendingSummary {
    /// Pending count owned by `consumer`
    pub fn count_for(&self, consumer: &str) -> u64 {
        self.consumers.get(consumer).copied().unwrap_or(0)
    }

    /// Owners with at least one pending entry
    pub fn owners(&self) -> impl Iterator<Item = (&str, u64)> {
        self.consumers
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(name, count)| (name.as_str(), *count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owners_skips_empty() {
        let mut summary = PendingSummary::default();
        summary.consumers.insert("a".to_string(), 2);
        summary.consumers.insert("b".to_string(), 0);
        summary.count = 2;

        let owners: Vec<_> = summary.owners().collect();
        assert_eq!(owners, vec![("a", 2)]);
        assert_eq!(summary.count_for("b"), 0);
        assert_eq!(summary.count_for("missing"), 0);
    }
}
