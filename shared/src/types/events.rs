//! Event type definitions for measurement data
//!
//! These are the events produced on the measured threads and consumed by the
//! statistics listener.

use serde::{Deserialize, Serialize};

use super::identity::{TaskEdge, TimerId};

/// Timestamp in nanoseconds since UNIX epoch
pub type Timestamp = u64;

/// One closed interval of a timer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerSample {
    /// Identity the interval is attributed to
    pub id: TimerId,

    /// Wall-clock time when the interval closed
    pub timestamp: Timestamp,

    /// Length of the interval
    pub elapsed_ns: u64,

    /// `false` when the interval was yielded rather than stopped; the time
    /// counts but the call is not finished
    pub completed: bool,
}

/// Unified measurement event type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MeasurementEvent {
    Sample(TimerSample),
    TaskCreated(TaskEdge),
    ThreadRegistered { name: String },
    ThreadExited,
}

impl MeasurementEvent {
    /// Short label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            MeasurementEvent::Sample(s) if s.completed => "stop",
            MeasurementEvent::Sample(_) => "yield",
            MeasurementEvent::TaskCreated(_) => "task",
            MeasurementEvent::ThreadRegistered { .. } => "register",
            MeasurementEvent::ThreadExited => "exit",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::identity::TaskId;

    #[test]
    fn test_sample_serialization() {
        let sample = TimerSample {
            id: TimerId::address(0x400000),
            timestamp: 1234567890,
            elapsed_ns: 1000,
            completed: true,
        };

        let json = serde_json::to_string(&sample).unwrap();
        let deserialized: TimerSample = serde_json::from_str(&json).unwrap();

        assert_eq!(sample.id, deserialized.id);
        assert_eq!(sample.elapsed_ns, deserialized.elapsed_ns);
        assert!(deserialized.completed);
    }

    #[test]
    fn test_event_kind() {
        let mut sample = TimerSample {
            id: TimerId::name("x"),
            timestamp: 0,
            elapsed_ns: 1,
            completed: true,
        };
        assert_eq!(MeasurementEvent::Sample(sample.clone()).kind(), "stop");
        sample.completed = false;
        assert_eq!(MeasurementEvent::Sample(sample).kind(), "yield");

        let edge = TaskEdge {
            parent: TaskId::ROOT,
            child: TaskId(1),
            identity: TimerId::name("worker"),
        };
        assert_eq!(MeasurementEvent::TaskCreated(edge).kind(), "task");
        assert_eq!(MeasurementEvent::ThreadExited.kind(), "exit");
    }
}
