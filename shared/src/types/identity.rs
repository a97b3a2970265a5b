//! Identities for timers and tasks
//!
//! A `TimerId` names whatever a measured interval is attributed to: the
//! address of a thread entry point, a free-form name, or an enumerated id.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Opaque, comparable identity of a measured call or task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimerId {
    /// Address of a function (e.g. a thread start routine)
    Address(usize),

    /// Human-readable name
    Name(Cow<'static, str>),

    /// Enumerated id assigned by the caller
    Id(u64),
}

impl TimerId {
    /// Identity for a function address
    pub fn address(addr: usize) -> Self {
        TimerId::Address(addr)
    }

    /// Identity for a name
    pub fn name(name: impl Into<Cow<'static, str>>) -> Self {
        TimerId::Name(name.into())
    }

    /// Identity for an enumerated id
    pub fn id(id: u64) -> Self {
        TimerId::Id(id)
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerId::Address(addr) => write!(f, "0x{:x}", addr),
            TimerId::Name(name) => f.write_str(name),
            TimerId::Id(id) => write!(f, "#{}", id),
        }
    }
}

impl From<&'static str> for TimerId {
    fn from(name: &'static str) -> Self {
        TimerId::Name(Cow::Borrowed(name))
    }
}

impl From<String> for TimerId {
    fn from(name: String) -> Self {
        TimerId::Name(Cow::Owned(name))
    }
}

/// Task id in the spawn graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Implicit task of every thread that was not spawned through interception
    pub const ROOT: TaskId = TaskId(0);

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Dependency edge recorded when one task spawns another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEdge {
    /// Task that performed the spawn
    pub parent: TaskId,

    /// Newly created task
    pub child: TaskId,

    /// Entry point the child runs
    pub identity: TimerId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(TimerId::address(0xdead).to_string(), "0xdead");
        assert_eq!(TimerId::name("pthread_join").to_string(), "pthread_join");
        assert_eq!(TimerId::id(7).to_string(), "#7");
        assert_eq!(TaskId(3).to_string(), "task-3");
    }

    #[test]
    fn test_borrowed_and_owned_names_are_equal() {
        let borrowed = TimerId::from("worker");
        let owned = TimerId::from("worker".to_string());
        assert_eq!(borrowed, owned);

        let mut set = std::collections::HashSet::new();
        set.insert(borrowed);
        assert!(set.contains(&owned));
    }

    #[test]
    fn test_root_task() {
        assert!(TaskId::ROOT.is_root());
        assert!(!TaskId(1).is_root());
    }

    #[test]
    fn test_timer_id_json() {
        let id = TimerId::name("compute");
        let json = serde_json::to_string(&id).unwrap();
        let back: TimerId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
