//! Per-resource statistics for asynchronous activity
//!
//! `ActivityTable` is the shared ordered map of activity buckets. It takes one
//! coarse lock per insert; activity records arrive far less often than timer
//! events, so contention stays low.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use tracing::trace;

use crate::activity::{ActivityKey, ActivityKind, CorrelationKey};
use crate::AsyncActivity;

/// Running statistics for one bucket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub count: u64,
    pub total_ns: u64,
    pub min_ns: u64,
    pub max_ns: u64,
    /// Distinct activity names that landed in the bucket
    pub names: BTreeSet<String>,
}

impl ActivityStats {
    fn record(&mut self, name: &str, duration_ns: u64) {
        if self.count == 0 {
            self.min_ns = duration_ns;
        } else {
            self.min_ns = self.min_ns.min(duration_ns);
        }
        self.max_ns = self.max_ns.max(duration_ns);
        self.total_ns = self.total_ns.saturating_add(duration_ns);
        self.count += 1;
        if !self.names.contains(name) {
            self.names.insert(name.to_string());
        }
    }
}

/// One bucket in reporting order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRow {
    /// First key seen for the bucket
    pub key: ActivityKey,
    #[serde(flatten)]
    pub stats: ActivityStats,
}

#[derive(Debug)]
struct Bucket {
    representative: ActivityKey,
    stats: ActivityStats,
}

/// Ordered, thread-safe table of activity buckets
#[derive(Debug)]
pub struct ActivityTable {
    extended: bool,
    buckets: Mutex<BTreeMap<CorrelationKey, Bucket>>,
}

impl ActivityTable {
    /// Create a table. With `extended` off, keys that differ only in their
    /// activity tag share a bucket.
    pub fn new(extended: bool) -> Self {
        Self {
            extended,
            buckets: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn extended(&self) -> bool {
        self.extended
    }

    /// Merge one activity into its bucket
    pub fn record(&self, activity: &AsyncActivity) {
        let duration_ns = activity.duration_ns();
        trace!(
            "activity {} '{}' {}ns",
            activity.key,
            activity.name,
            duration_ns
        );

        let slot = CorrelationKey::new(activity.key, self.extended);
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets
            .entry(slot)
            .or_insert_with(|| Bucket {
                representative: activity.key,
                stats: ActivityStats::default(),
            })
            .stats
            .record(&activity.name, duration_ns);
    }

    /// Merge a batch of activities under a single lock acquisition
    pub fn record_all<'a>(&self, activities: impl IntoIterator<Item = &'a AsyncActivity>) {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        for activity in activities {
            buckets
                .entry(CorrelationKey::new(activity.key, self.extended))
                .or_insert_with(|| Bucket {
                    representative: activity.key,
                    stats: ActivityStats::default(),
                })
                .stats
                .record(&activity.name, activity.duration_ns());
        }
    }

    /// Buckets in key order
    pub fn snapshot(&self) -> Vec<ActivityRow> {
        let buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets
            .values()
            .map(|b| ActivityRow {
                key: b.representative,
                stats: b.stats.clone(),
            })
            .collect()
    }

    /// Statistics of the bucket `key` falls into
    pub fn get(&self, key: &ActivityKey) -> Option<ActivityStats> {
        let buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets
            .get(&CorrelationKey::new(*key, self.extended))
            .map(|b| b.stats.clone())
    }

    /// Number of buckets
    pub fn len(&self) -> usize {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total time across all buckets
    pub fn total_time_ns(&self) -> u64 {
        let buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets.values().map(|b| b.stats.total_ns).sum()
    }

    /// Number of activities whose bucket representative has `kind`
    pub fn count_of(&self, kind: ActivityKind) -> u64 {
        let buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets
            .values()
            .filter(|b| b.representative.activity() == kind)
            .map(|b| b.stats.count)
            .sum()
    }
}

impl Default for ActivityTable {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn activity(key: ActivityKey, name: &str, start_ns: u64, end_ns: u64) -> AsyncActivity {
        AsyncActivity {
            key,
            name: name.to_string(),
            start_ns,
            end_ns,
        }
    }

    #[test]
    fn test_collapsed_buckets() {
        let table = ActivityTable::new(false);
        table.record(&activity(
            ActivityKey::stream(0, 1, 2, ActivityKind::Kernel),
            "gemm",
            0,
            100,
        ));
        table.record(&activity(
            ActivityKey::stream(0, 1, 2, ActivityKind::Memory),
            "copy",
            100,
            150,
        ));

        assert_eq!(table.len(), 1);
        let rows = table.snapshot();
        assert_eq!(rows[0].key.activity(), ActivityKind::Kernel);
        assert_eq!(rows[0].stats.count, 2);
        assert_eq!(rows[0].stats.total_ns, 150);
        assert_eq!(rows[0].stats.min_ns, 50);
        assert_eq!(rows[0].stats.max_ns, 100);
        assert_eq!(rows[0].stats.names.len(), 2);
    }

    #[test]
    fn test_extended_buckets() {
        let table = ActivityTable::new(true);
        table.record(&activity(
            ActivityKey::stream(0, 1, 2, ActivityKind::Memory),
            "copy",
            0,
            10,
        ));
        table.record(&activity(
            ActivityKey::stream(0, 1, 2, ActivityKind::Kernel),
            "gemm",
            0,
            10,
        ));

        assert_eq!(table.len(), 2);
        let rows = table.snapshot();
        // Kernel orders before Memory
        assert_eq!(rows[0].key.activity(), ActivityKind::Kernel);
        assert_eq!(rows[1].key.activity(), ActivityKind::Memory);
        assert_eq!(table.count_of(ActivityKind::Memory), 1);
    }

    #[test]
    fn test_snapshot_in_resource_order() {
        let table = ActivityTable::new(false);
        for (queue, device) in [(3, 1), (0, 1), (5, 0)] {
            table.record(&activity(
                ActivityKey::queue(device, queue, ActivityKind::Kernel),
                "k",
                0,
                1,
            ));
        }

        let order: Vec<(u32, ActivityKey)> = table
            .snapshot()
            .into_iter()
            .map(|r| (r.key.device_id(), r.key))
            .collect();
        assert_eq!(order[0].1, ActivityKey::queue(0, 5, ActivityKind::Kernel));
        assert_eq!(order[1].1, ActivityKey::queue(1, 0, ActivityKind::Kernel));
        assert_eq!(order[2].1, ActivityKey::queue(1, 3, ActivityKind::Kernel));
    }

    #[test]
    fn test_concurrent_record() {
        let table = Arc::new(ActivityTable::new(false));
        let handles: Vec<_> = (0..4)
            .map(|device| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        table.record(&activity(
                            ActivityKey::device(device, ActivityKind::Kernel),
                            "k",
                            i,
                            i + 2,
                        ));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(table.len(), 4);
        assert_eq!(table.total_time_ns(), 4 * 250 * 2);
        assert_eq!(
            table
                .get(&ActivityKey::device(2, ActivityKind::Memory))
                .unwrap()
                .count,
            250
        );
    }

    #[test]
    fn test_record_all() {
        let table = ActivityTable::default();
        let batch = vec![
            activity(ActivityKey::device(0, ActivityKind::Kernel), "a", 0, 4),
            activity(ActivityKey::device(1, ActivityKind::Kernel), "b", 0, 6),
        ];
        table.record_all(&batch);
        assert_eq!(table.len(), 2);
        assert_eq!(table.total_time_ns(), 10);
        assert!(!table.is_empty());
    }
}
