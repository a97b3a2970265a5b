//! Free-standing profiler timers
//!
//! A `Profiler` measures one interval for one identity. Closing it either
//! stops it (a completed call) or yields it (time counted, call not done).
//! Either way a `TimerSample` goes to the statistics listener.

use cadence_shared::types::events::{MeasurementEvent, TimerSample};
use cadence_shared::types::identity::TimerId;
use cadence_shared::utils::time::{duration_nanos, system_time_nanos};
use std::time::{Duration, Instant};
use tracing::trace;

use crate::lifecycle;
use crate::metrics;

/// One measured interval
#[derive(Debug)]
pub struct Profiler {
    id: TimerId,
    started: Instant,
    stopped: bool,
}

impl Profiler {
    /// Start measuring `id` now
    pub fn new(id: TimerId) -> Self {
        metrics::TIMERS_TOTAL.with_label_values(&["start"]).inc();
        trace!("timer {} started", id);
        Self {
            id,
            started: Instant::now(),
            stopped: false,
        }
    }

    pub fn identity(&self) -> &TimerId {
        &self.id
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Close the interval as a completed call
    pub fn stop(mut self) -> Duration {
        self.finish(true)
    }

    /// Close the interval without completing the call
    pub fn yield_now(mut self) -> Duration {
        self.finish(false)
    }

    fn finish(&mut self, completed: bool) -> Duration {
        let elapsed = self.started.elapsed();
        self.stopped = true;

        let event = if completed { "stop" } else { "yield" };
        metrics::TIMERS_TOTAL.with_label_values(&[event]).inc();
        trace!("timer {} {} after {:?}", self.id, event, elapsed);

        lifecycle::emit(MeasurementEvent::Sample(TimerSample {
            id: self.id.clone(),
            timestamp: system_time_nanos(),
            elapsed_ns: duration_nanos(elapsed),
            completed,
        }));
        elapsed
    }
}

impl Drop for Profiler {
    fn drop(&mut self) {
        if !self.stopped {
            self.finish(true);
        }
    }
}

/// Start a timer; a `None` identity means no timer was requested
pub fn start(identity: Option<TimerId>) -> Option<Profiler> {
    identity.map(Profiler::new)
}

/// Stop a timer, recording a completed call
pub fn stop(profiler: Profiler) -> Duration {
    profiler.stop()
}

/// Yield a timer: its time is recorded but the call is not counted
pub fn yield_timer(profiler: Profiler) -> Duration {
    profiler.yield_now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_identity_is_no_timer() {
        assert!(start(None).is_none());
    }

    #[test]
    fn test_stop_measures_interval() {
        let profiler = start(Some(TimerId::name("work"))).unwrap();
        assert_eq!(profiler.identity(), &TimerId::name("work"));
        std::thread::sleep(Duration::from_millis(2));
        let elapsed = stop(profiler);
        assert!(elapsed >= Duration::from_millis(2));
    }

    #[test]
    fn test_yield_measures_interval() {
        let profiler = Profiler::new(TimerId::id(7));
        std::thread::sleep(Duration::from_millis(1));
        assert!(yield_timer(profiler) >= Duration::from_millis(1));
    }
}
