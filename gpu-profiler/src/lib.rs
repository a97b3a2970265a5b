//! Asynchronous accelerator activity
//!
//! Identifies GPU stream, command-queue and fallback device activity with a
//! single ordered key, and buckets completed activities per execution resource.

pub mod activity;
pub mod fallback;
pub mod metrics;

pub use activity::{ActivityKey, ActivityKind, ActivityModel, CorrelationKey};
pub use fallback::SyncFallback;
pub use metrics::{ActivityRow, ActivityStats, ActivityTable};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Source of completed asynchronous activity records
///
/// A driver integration (CUPTI, rocprofiler, ...) implements this to feed
/// activities into an [`ActivityTable`].
pub trait ActivitySource {
    /// Start observing activity
    fn start(&mut self) -> Result<()>;

    /// Stop observing and flush anything in flight
    fn stop(&mut self) -> Result<()>;

    /// Take the activities completed since the last drain
    fn drain(&mut self) -> Result<Vec<AsyncActivity>>;
}

/// One completed unit of asynchronous work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsyncActivity {
    pub key: ActivityKey,
    pub name: String,
    pub start_ns: u64,
    pub end_ns: u64,
}

impl AsyncActivity {
    pub fn duration_ns(&self) -> u64 {
        self.end_ns.saturating_sub(self.start_ns)
    }
}
