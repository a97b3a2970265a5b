//! Per-thread wrapper state
//!
//! Every OS thread gets one `ThreadState`, created on first use and dropped
//! by the TLS key destructor at thread exit. It holds the reentrancy flag used
//! by interception and a single active-profiler slot. There is no nesting:
//! starting a timer while one is active stops the old one first.

use cadence_shared::types::events::MeasurementEvent;
use cadence_shared::types::identity::{TaskId, TimerId};
use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, error};

use crate::lifecycle;
use crate::metrics;
use crate::timer::Profiler;
use crate::tls::{KeyError, ThreadKey};

/// Identifies one `start` on the current thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProfilerHandle(u64);

#[derive(Debug)]
struct Active {
    handle: ProfilerHandle,
    profiler: Profiler,
}

/// Task id of a thread, possibly still being published by its creator
#[derive(Debug, Clone)]
enum TaskSlot {
    Root,
    Pending(Arc<OnceLock<TaskId>>),
    Known(TaskId),
}

/// State attached to one OS thread
#[derive(Debug)]
pub struct ThreadState {
    wrapped: Cell<bool>,
    active: RefCell<Option<Active>>,
    next_handle: Cell<u64>,
    entry: RefCell<Option<TimerId>>,
    yielded: RefCell<Option<(ProfilerHandle, TimerId)>>,
    task: RefCell<TaskSlot>,
    registered: Cell<bool>,
}

impl ThreadState {
    fn new() -> Self {
        Self {
            wrapped: Cell::new(false),
            active: RefCell::new(None),
            next_handle: Cell::new(1),
            entry: RefCell::new(None),
            yielded: RefCell::new(None),
            task: RefCell::new(TaskSlot::Root),
            registered: Cell::new(false),
        }
    }

    fn activate(&self, handle: ProfilerHandle, id: TimerId) {
        let previous = self.active.replace(Some(Active {
            handle,
            profiler: Profiler::new(id),
        }));
        if let Some(previous) = previous {
            debug!("replacing active timer {}", previous.profiler.identity());
            previous.profiler.stop();
        }
    }

    fn start(&self, id: TimerId) -> ProfilerHandle {
        let handle = ProfilerHandle(self.next_handle.get());
        self.next_handle.set(handle.0 + 1);
        self.yielded.replace(None);
        self.activate(handle, id);
        handle
    }

    fn stop(&self, handle: ProfilerHandle) -> Option<Duration> {
        let active = {
            let mut slot = self.active.borrow_mut();
            let current = slot.as_ref().map_or(false, |a| a.handle == handle);
            if current {
                slot.take()
            } else {
                None
            }
        }?;
        Some(active.profiler.stop())
    }

    fn stop_active(&self) -> Option<Duration> {
        let active = self.active.borrow_mut().take()?;
        Some(active.profiler.stop())
    }

    fn yield_active(&self) -> Option<Duration> {
        let active = self.active.borrow_mut().take()?;
        self.yielded
            .replace(Some((active.handle, active.profiler.identity().clone())));
        Some(active.profiler.yield_now())
    }

    fn restart(&self) -> Option<ProfilerHandle> {
        let (handle, id) = self.yielded.borrow_mut().take()?;
        self.activate(handle, id);
        Some(handle)
    }

    fn task(&self) -> TaskId {
        let slot = self.task.borrow().clone();
        match slot {
            TaskSlot::Root => TaskId::ROOT,
            TaskSlot::Known(id) => id,
            TaskSlot::Pending(cell) => {
                // The creator publishes right after the create call returns.
                let id = loop {
                    if let Some(id) = cell.get() {
                        break *id;
                    }
                    std::thread::yield_now();
                };
                self.task.replace(TaskSlot::Known(id));
                id
            }
        }
    }
}

impl Drop for ThreadState {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.profiler.stop();
        }
        if self.registered.get() {
            lifecycle::emit(MeasurementEvent::ThreadExited);
        }
    }
}

static KEY: OnceLock<Result<ThreadKey<ThreadState>, KeyError>> = OnceLock::new();

fn key() -> Option<&'static ThreadKey<ThreadState>> {
    let key = KEY.get_or_init(|| {
        ThreadKey::new().map_err(|err| {
            match err {
                KeyError::Exhausted => {
                    error!("thread-local key limit reached (EAGAIN); thread interception disabled")
                }
                KeyError::NoMemory => {
                    error!("out of memory creating thread-local key (ENOMEM); thread interception disabled")
                }
                KeyError::Other(_) => error!("{}; thread interception disabled", err),
            }
            err
        })
    });
    key.as_ref().ok()
}

fn with_state<R>(f: impl FnOnce(&ThreadState) -> R) -> Option<R> {
    key()?.with_or_init(ThreadState::new, f)
}

/// Whether per-thread state can be used on this thread
pub fn available() -> bool {
    with_state(|_| ()).is_some()
}

/// Marks the current thread as inside an interception wrapper
#[derive(Debug)]
pub struct WrapGuard {
    _not_send: PhantomData<*const ()>,
}

impl Drop for WrapGuard {
    fn drop(&mut self) {
        with_state(|state| state.wrapped.set(false));
    }
}

/// Why a wrapper must forward to the real primitive untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Passthrough {
    /// The thread is already inside a wrapper
    Nested,
    /// No thread state (key unavailable or thread exiting)
    Unavailable,
}

impl Passthrough {
    pub fn as_str(self) -> &'static str {
        match self {
            Passthrough::Nested => "nested",
            Passthrough::Unavailable => "unavailable",
        }
    }
}

/// Set the reentrancy flag, or report why the caller must pass through
pub fn try_enter() -> Result<WrapGuard, Passthrough> {
    let entered = with_state(|state| !state.wrapped.replace(true)).ok_or(Passthrough::Unavailable)?;
    if !entered {
        return Err(Passthrough::Nested);
    }
    Ok(WrapGuard {
        _not_send: PhantomData,
    })
}

/// Whether the current thread is inside an interception wrapper
pub fn is_wrapped() -> bool {
    with_state(|state| state.wrapped.get()).unwrap_or(false)
}

/// Start a timer in this thread's slot. A `None` identity is a no-op.
///
/// An already active timer is stopped first.
pub fn start(identity: Option<TimerId>) -> Option<ProfilerHandle> {
    let identity = identity?;
    with_state(|state| state.start(identity))
}

/// Stop the slot's timer if `handle` refers to it
pub fn stop(handle: ProfilerHandle) -> Option<Duration> {
    with_state(|state| state.stop(handle)).flatten()
}

/// Stop whatever timer is active on this thread
pub fn stop_active() -> Option<Duration> {
    with_state(ThreadState::stop_active).flatten()
}

/// Suspend the active timer without completing its call
pub fn yield_active() -> Option<Duration> {
    with_state(ThreadState::yield_active).flatten()
}

/// Resume the identity last yielded on this thread, under its old handle
pub fn restart() -> Option<ProfilerHandle> {
    with_state(ThreadState::restart).flatten()
}

/// Identity of the active timer, if any
pub fn active_identity() -> Option<TimerId> {
    with_state(|state| {
        state
            .active
            .borrow()
            .as_ref()
            .map(|a| a.profiler.identity().clone())
    })
    .flatten()
}

/// Entry point this thread was created to run
pub fn entry_identity() -> Option<TimerId> {
    with_state(|state| state.entry.borrow().clone()).flatten()
}

/// Task id of the current thread (`TaskId::ROOT` if not spawned through
/// interception)
pub fn current_task() -> TaskId {
    with_state(ThreadState::task).unwrap_or(TaskId::ROOT)
}

/// Bind a freshly created thread to its entry point and task, and register
/// it with the listener
pub(crate) fn adopt(identity: TimerId, task: Arc<OnceLock<TaskId>>) {
    let name = std::thread::current()
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| identity.to_string());
    let adopted = with_state(|state| {
        state.entry.replace(Some(identity));
        state.task.replace(TaskSlot::Pending(task));
        state.registered.set(true);
    });
    if adopted.is_some() {
        metrics::THREADS_WRAPPED.inc();
        lifecycle::emit(MeasurementEvent::ThreadRegistered { name });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test runs on its own thread, so slots start empty.

    #[test]
    fn test_second_start_replaces_first() {
        let first = start(Some(TimerId::name("a"))).unwrap();
        let second = start(Some(TimerId::name("b"))).unwrap();
        assert_ne!(first, second);
        assert_eq!(active_identity(), Some(TimerId::name("b")));

        // the replaced timer is already finalized
        assert!(stop(first).is_none());
        assert!(stop(second).is_some());
        assert!(active_identity().is_none());
    }

    #[test]
    fn test_none_identity_is_noop() {
        assert!(start(None).is_none());
        assert!(active_identity().is_none());
    }

    #[test]
    fn test_yield_and_restart_keep_handle() {
        let handle = start(Some(TimerId::name("solver"))).unwrap();
        assert!(yield_active().is_some());
        assert!(active_identity().is_none());

        assert_eq!(restart(), Some(handle));
        assert_eq!(active_identity(), Some(TimerId::name("solver")));
        assert!(stop(handle).is_some());
    }

    #[test]
    fn test_restart_without_yield_is_noop() {
        assert!(restart().is_none());
        assert!(yield_active().is_none());
        assert!(stop_active().is_none());
    }

    #[test]
    fn test_restart_consumes_yielded_identity() {
        start(Some(TimerId::id(3)));
        yield_active();
        assert!(restart().is_some());
        stop_active();
        assert!(restart().is_none());
    }

    #[test]
    fn test_reentrancy_flag() {
        assert!(!is_wrapped());
        let guard = try_enter().unwrap();
        assert!(is_wrapped());
        assert_eq!(try_enter().unwrap_err(), Passthrough::Nested);
        drop(guard);
        assert!(!is_wrapped());
        assert!(try_enter().is_ok());
    }

    #[test]
    fn test_plain_thread_is_root_task() {
        assert_eq!(current_task(), TaskId::ROOT);
        assert!(entry_identity().is_none());
    }

    #[test]
    fn test_adopt_waits_for_published_task() {
        let slot = Arc::new(OnceLock::new());
        let publisher = Arc::clone(&slot);

        let child = std::thread::spawn(move || {
            adopt(TimerId::name("child"), slot);
            (current_task(), entry_identity())
        });
        std::thread::sleep(Duration::from_millis(5));
        publisher.set(TaskId(41)).unwrap();

        let (task, entry) = child.join().unwrap();
        assert_eq!(task, TaskId(41));
        assert_eq!(entry, Some(TimerId::name("child")));
    }

    #[test]
    fn test_start_discards_yielded_identity() {
        start(Some(TimerId::name("phase-a")));
        yield_active();
        let handle = start(Some(TimerId::name("phase-b"))).unwrap();
        stop(handle);
        assert!(restart().is_none());
        assert!(active_identity().is_none());
    }

    #[test]
    fn test_state_destroyed_on_exit_stops_timer() {
        lifecycle::test_runtime();
        let id = TimerId::name("left running at exit");
        let worker_id = id.clone();
        let handle = std::thread::spawn(move || {
            start(Some(worker_id));
            assert!(available());
        });
        handle.join().unwrap();

        let report = lifecycle::snapshot().unwrap();
        let stats = report.timer(&id).unwrap();
        assert_eq!(stats.calls, 1);
        assert_eq!(stats.yields, 0);
    }
}
