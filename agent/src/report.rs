//! Summary report of one measurement run

use cadence_gpu::{ActivityRow, ActivityTable};
use cadence_shared::types::identity::{TaskEdge, TimerId};
use cadence_shared::types::profile::{TimerProfile, TimerRow, TimerStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything the runtime knows at a snapshot or at finalize
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileReport {
    pub program: String,
    pub generated_at: DateTime<Utc>,
    pub start_time: u64,
    pub end_time: u64,
    pub duration_ns: u64,

    /// Per-identity totals, largest first
    pub timers: Vec<TimerRow>,

    /// Spawn graph in arrival order
    pub task_edges: Vec<TaskEdge>,
    pub threads_registered: u64,
    pub threads_exited: u64,

    pub extended_correlation: bool,
    /// Async activity buckets in key order
    pub activity: Vec<ActivityRow>,
}

impl ProfileReport {
    pub fn new(program: &str, profile: &TimerProfile, activity: &ActivityTable) -> Self {
        Self {
            program: program.to_string(),
            generated_at: Utc::now(),
            start_time: profile.start_time,
            end_time: profile.end_time,
            duration_ns: profile.duration_ns(),
            timers: profile.rows(),
            task_edges: profile.task_edges.clone(),
            threads_registered: profile.threads_registered,
            threads_exited: profile.threads_exited,
            extended_correlation: activity.extended(),
            activity: activity.snapshot(),
        }
    }

    /// Statistics for one identity
    pub fn timer(&self, id: &TimerId) -> Option<&TimerStats> {
        self.timers.iter().find(|row| &row.id == id).map(|row| &row.stats)
    }

    /// Task ids created during the run, in allocation order
    pub fn task_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.task_edges.iter().map(|e| e.child.0).collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_gpu::{ActivityKey, ActivityKind, AsyncActivity};
    use cadence_shared::types::events::TimerSample;
    use cadence_shared::types::identity::TaskId;

    #[test]
    fn test_report_from_profile() {
        let mut profile = TimerProfile::new(100);
        profile.add_sample(&TimerSample {
            id: TimerId::name("solve"),
            timestamp: 300,
            elapsed_ns: 150,
            completed: true,
        });
        profile.add_edge(TaskEdge {
            parent: TaskId::ROOT,
            child: TaskId(2),
            identity: TimerId::name("b"),
        });
        profile.add_edge(TaskEdge {
            parent: TaskId::ROOT,
            child: TaskId(1),
            identity: TimerId::name("a"),
        });

        let table = ActivityTable::new(true);
        table.record(&AsyncActivity {
            key: ActivityKey::device(0, ActivityKind::Kernel),
            name: "k".to_string(),
            start_ns: 0,
            end_ns: 10,
        });

        let report = ProfileReport::new("test", &profile, &table);
        assert_eq!(report.duration_ns, 200);
        assert_eq!(report.timer(&TimerId::name("solve")).unwrap().calls, 1);
        assert!(report.timer(&TimerId::name("missing")).is_none());
        assert_eq!(report.task_ids(), vec![1, 2]);
        assert!(report.extended_correlation);
        assert_eq!(report.activity.len(), 1);
    }
}
