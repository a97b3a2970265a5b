//! Synchronous stand-in for builds without an accelerator backend
//!
//! Work is run on the calling thread and reported as device-only activity,
//! so the same tables and reports work with or without a GPU.

use anyhow::Result;
use cadence_shared::utils::time::{duration_nanos, system_time_nanos};
use std::time::Instant;
use tracing::debug;

use crate::activity::{ActivityKey, ActivityKind};
use crate::{ActivitySource, AsyncActivity};

/// Activity source that times synchronous closures
#[derive(Debug)]
pub struct SyncFallback {
    device: u32,
    active: bool,
    pending: Vec<AsyncActivity>,
}

impl SyncFallback {
    pub fn new(device: u32) -> Self {
        Self {
            device,
            active: false,
            pending: Vec::new(),
        }
    }

    /// Run `f` and, while the source is active, record it as one activity
    pub fn run<T>(&mut self, name: &str, kind: ActivityKind, f: impl FnOnce() -> T) -> T {
        if !self.active {
            return f();
        }

        let start_ns = system_time_nanos();
        let clock = Instant::now();
        let out = f();
        let end_ns = start_ns.saturating_add(duration_nanos(clock.elapsed()));

        self.pending.push(AsyncActivity {
            key: ActivityKey::device(self.device, kind),
            name: name.to_string(),
            start_ns,
            end_ns,
        });
        out
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl ActivitySource for SyncFallback {
    fn start(&mut self) -> Result<()> {
        if self.active {
            anyhow::bail!("Fallback source for device {} already started", self.device);
        }
        debug!("Synchronous fallback source started on device {}", self.device);
        self.active = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.active = false;
        Ok(())
    }

    fn drain(&mut self) -> Result<Vec<AsyncActivity>> {
        Ok(std::mem::take(&mut self.pending))
    }
}
