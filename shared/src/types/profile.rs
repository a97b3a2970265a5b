//! Aggregated timer statistics
//!
//! These types represent per-identity totals built from timer samples,
//! suitable for reporting.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::events::TimerSample;
use super::identity::{TaskEdge, TimerId};

/// Running statistics for one timer identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerStats {
    /// Completed calls (stopped intervals)
    pub calls: u64,

    /// Intervals closed by a yield
    pub yields: u64,

    /// Total attributed time across all intervals
    pub total_ns: u64,

    /// Shortest interval seen
    pub min_ns: u64,

    /// Longest interval seen
    pub max_ns: u64,
}

impl TimerStats {
    /// Fold one interval into the statistics
    pub fn record(&mut self, elapsed_ns: u64, completed: bool) {
        if self.calls + self.yields == 0 {
            self.min_ns = elapsed_ns;
        } else {
            self.min_ns = self.min_ns.min(elapsed_ns);
        }
        self.max_ns = self.max_ns.max(elapsed_ns);
        self.total_ns = self.total_ns.saturating_add(elapsed_ns);

        if completed {
            self.calls += 1;
        } else {
            self.yields += 1;
        }
    }

    /// Mean attributed time per completed call
    pub fn mean_ns(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_ns as f64 / self.calls as f64
        }
    }
}

/// JSON-safe row of a timer profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerRow {
    pub id: TimerId,
    #[serde(flatten)]
    pub stats: TimerStats,
}

/// Aggregated timer data for a measurement period
///
/// Note: `timers` is keyed by `TimerId`, which does not serialize as a JSON
/// object key. Use `rows()` for output.
#[derive(Debug, Clone, Default)]
pub struct TimerProfile {
    /// Start timestamp of the period
    pub start_time: u64,

    /// End timestamp of the period
    pub end_time: u64,

    /// Statistics per identity
    pub timers: HashMap<TimerId, TimerStats>,

    /// Spawn graph edges in arrival order
    pub task_edges: Vec<TaskEdge>,

    /// Threads that registered with the listener
    pub threads_registered: u64,

    /// Threads whose state was torn down
    pub threads_exited: u64,
}

impl TimerProfile {
    /// Create a new empty profile
    pub fn new(start_time: u64) -> Self {
        Self {
            start_time,
            end_time: start_time,
            ..Default::default()
        }
    }

    /// Add a timer sample to the profile
    pub fn add_sample(&mut self, sample: &TimerSample) {
        self.timers
            .entry(sample.id.clone())
            .or_default()
            .record(sample.elapsed_ns, sample.completed);
        self.end_time = self.end_time.max(sample.timestamp);
    }

    /// Add a spawn edge
    pub fn add_edge(&mut self, edge: TaskEdge) {
        self.task_edges.push(edge);
    }

    /// Statistics for one identity
    pub fn get(&self, id: &TimerId) -> Option<&TimerStats> {
        self.timers.get(id)
    }

    /// Total number of samples folded in
    pub fn total_samples(&self) -> u64 {
        self.timers.values().map(|s| s.calls + s.yields).sum()
    }

    /// Rows sorted by total time descending, ties broken by identity
    pub fn rows(&self) -> Vec<TimerRow> {
        let mut rows: Vec<TimerRow> = self
            .timers
            .iter()
            .map(|(id, stats)| TimerRow {
                id: id.clone(),
                stats: stats.clone(),
            })
            .collect();
        rows.sort_by(|a, b| {
            b.stats
                .total_ns
                .cmp(&a.stats.total_ns)
                .then_with(|| a.id.cmp(&b.id))
        });
        rows
    }

    /// Get the duration of the period in nanoseconds
    pub fn duration_ns(&self) -> u64 {
        self.end_time.saturating_sub(self.start_time)
    }
}
