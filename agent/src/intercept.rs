//! Thread creation and join interception
//!
//! Every thread created through these wrappers is registered with the
//! measurement runtime, gets a task id and a spawn edge, and runs its entry
//! point under a timer named after it. Joins yield the caller's timer, so
//! time spent blocked is attributed to `pthread_join` instead.
//!
//! A per-thread reentrancy flag makes the wrappers forward untouched when
//! they are re-entered, which is how threads created by the runtime itself
//! (and by nested wrappers) escape instrumentation.

use cadence_shared::types::events::MeasurementEvent;
use cadence_shared::types::identity::{TaskEdge, TaskId, TimerId};
use libc::{c_int, c_void, pthread_attr_t, pthread_t};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, Thread};
use tracing::{trace, warn};

use crate::lifecycle;
use crate::metrics;
use crate::thread_state::{self, Passthrough};
use crate::timer::Profiler;

/// Identity of the timer around the real create call
pub const CREATE_TIMER: &str = "pthread_create";

/// Identity of the timer around the real join call
pub const JOIN_TIMER: &str = "pthread_join";

pub type StartRoutine = extern "C" fn(*mut c_void) -> *mut c_void;

/// Shape of `pthread_create`
pub type CreateFn =
    unsafe extern "C" fn(*mut pthread_t, *const pthread_attr_t, StartRoutine, *mut c_void) -> c_int;

/// Shape of `pthread_join`
pub type JoinFn = unsafe extern "C" fn(pthread_t, *mut *mut c_void) -> c_int;

static NEXT_TASK: AtomicU64 = AtomicU64::new(1);

fn passthrough(reason: Passthrough) {
    trace!("interception pass-through: {}", reason.as_str());
    metrics::PASSTHROUGH_TOTAL
        .with_label_values(&[reason.as_str()])
        .inc();
}

/// Allocate the next task id for a created thread and publish it
fn register_task(parent: TaskId, slot: &OnceLock<TaskId>, identity: TimerId) -> TaskId {
    let child = TaskId(NEXT_TASK.fetch_add(1, Ordering::SeqCst));
    let _ = slot.set(child);
    metrics::TASKS_CREATED.inc();
    trace!("{} created {} running {}", parent, child, identity);
    lifecycle::emit(MeasurementEvent::TaskCreated(TaskEdge {
        parent,
        child,
        identity,
    }));
    child
}

/// Body of every instrumented thread
fn run_entry<R>(identity: TimerId, task: Arc<OnceLock<TaskId>>, entry: impl FnOnce() -> R) -> R {
    thread_state::adopt(identity.clone(), task);
    let handle = thread_state::start(Some(identity));
    let out = entry();
    if let Some(handle) = handle {
        thread_state::stop(handle);
    }
    out
}

/// Yield the caller's timer around a blocking join
fn measured_join<R>(join: impl FnOnce() -> R) -> R {
    let yielded = thread_state::yield_active().is_some();
    let timer = Profiler::new(TimerId::name(JOIN_TIMER));
    let out = join();
    timer.stop();
    if yielded {
        thread_state::restart();
    }
    out
}

// ── pthread path ─────────────────────────────────────────────────────────────

/// Entry point and argument handed to the proxy
struct Launch {
    routine: StartRoutine,
    arg: *mut c_void,
    task: Arc<OnceLock<TaskId>>,
}

extern "C" fn proxy_entry(launch: *mut c_void) -> *mut c_void {
    // SAFETY: `create_with` passes a `Box<Launch>` and gives up ownership
    // once the real create call succeeds.
    let launch = unsafe { Box::from_raw(launch.cast::<Launch>()) };
    let Launch { routine, arg, task } = *launch;
    run_entry(TimerId::address(routine as usize), task, || routine(arg))
}

/// Thread attributes carrying the configured stack size
struct StackAttr(pthread_attr_t);

impl StackAttr {
    fn new(size: usize) -> Option<Self> {
        let mut attr = std::mem::MaybeUninit::<pthread_attr_t>::uninit();
        // SAFETY: `pthread_attr_init` initializes the out-pointer on success.
        let rc = unsafe { libc::pthread_attr_init(attr.as_mut_ptr()) };
        if rc != 0 {
            warn!("pthread_attr_init failed with code {}", rc);
            return None;
        }
        // SAFETY: initialized above.
        let mut attr = StackAttr(unsafe { attr.assume_init() });
        let size = size.max(libc::PTHREAD_STACK_MIN);
        // SAFETY: `attr` is initialized.
        let rc = unsafe { libc::pthread_attr_setstacksize(&mut attr.0, size) };
        if rc != 0 {
            warn!("cannot apply stack size {}: code {}", size, rc);
            return None;
        }
        Some(attr)
    }

    fn as_ptr(&self) -> *const pthread_attr_t {
        &self.0
    }
}

impl Drop for StackAttr {
    fn drop(&mut self) {
        // SAFETY: initialized in `new`.
        unsafe {
            libc::pthread_attr_destroy(&mut self.0);
        }
    }
}

/// Instrumented thread creation over an arbitrary `pthread_create`.
///
/// Returns the real call's status unchanged. Caller-supplied attributes are
/// used as given; with a null `attr` the configured stack size applies.
///
/// # Safety
///
/// Same contract as `pthread_create`.
pub unsafe fn create_with(
    real: CreateFn,
    thread: *mut pthread_t,
    attr: *const pthread_attr_t,
    routine: StartRoutine,
    arg: *mut c_void,
) -> c_int {
    let _guard = match thread_state::try_enter() {
        Ok(guard) => guard,
        Err(reason) => {
            passthrough(reason);
            return unsafe { real(thread, attr, routine, arg) };
        }
    };
    let Some(runtime) = lifecycle::ensure_initialized() else {
        return unsafe { real(thread, attr, routine, arg) };
    };

    let stack = if attr.is_null() {
        StackAttr::new(runtime.config().effective_stack_size())
    } else {
        None
    };
    let attr = stack.as_ref().map_or(attr, StackAttr::as_ptr);

    let parent = thread_state::current_task();
    let task = Arc::new(OnceLock::new());
    let launch = Box::into_raw(Box::new(Launch {
        routine,
        arg,
        task: Arc::clone(&task),
    }));

    let timer = Profiler::new(TimerId::name(CREATE_TIMER));
    let rc = unsafe { real(thread, attr, proxy_entry, launch.cast()) };
    timer.stop();

    if rc != 0 {
        // SAFETY: the thread was not created, so the proxy never ran.
        drop(unsafe { Box::from_raw(launch) });
        return rc;
    }

    register_task(parent, &task, TimerId::address(routine as usize));
    rc
}

/// Instrumented join over an arbitrary `pthread_join`
///
/// # Safety
///
/// Same contract as `pthread_join`.
pub unsafe fn join_with(real: JoinFn, thread: pthread_t, retval: *mut *mut c_void) -> c_int {
    match thread_state::try_enter() {
        Ok(_guard) => measured_join(|| unsafe { real(thread, retval) }),
        Err(reason) => {
            passthrough(reason);
            unsafe { real(thread, retval) }
        }
    }
}

/// `pthread_create` with measurement
///
/// # Safety
///
/// Same contract as `pthread_create`.
#[no_mangle]
pub unsafe extern "C" fn cadence_pthread_create(
    thread: *mut pthread_t,
    attr: *const pthread_attr_t,
    routine: StartRoutine,
    arg: *mut c_void,
) -> c_int {
    unsafe { create_with(libc::pthread_create, thread, attr, routine, arg) }
}

/// `pthread_join` with measurement
///
/// # Safety
///
/// Same contract as `pthread_join`.
#[no_mangle]
pub unsafe extern "C" fn cadence_pthread_join(thread: pthread_t, retval: *mut *mut c_void) -> c_int {
    unsafe { join_with(libc::pthread_join, thread, retval) }
}

// ── std path ─────────────────────────────────────────────────────────────────

/// Join handle of a thread created by [`spawn`] or [`spawn_named`]
#[derive(Debug)]
pub struct InstrumentedHandle<T> {
    inner: JoinHandle<T>,
    task: Option<TaskId>,
}

impl<T> InstrumentedHandle<T> {
    /// Task id of the thread, `None` if creation passed through
    pub fn task(&self) -> Option<TaskId> {
        self.task
    }

    pub fn thread(&self) -> &Thread {
        self.inner.thread()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Wait for the thread, attributing the blocked time to `pthread_join`
    pub fn join(self) -> thread::Result<T> {
        match thread_state::try_enter() {
            Ok(_guard) => measured_join(|| self.inner.join()),
            Err(reason) => {
                passthrough(reason);
                self.inner.join()
            }
        }
    }

    /// The underlying handle, joined without measurement
    pub fn into_inner(self) -> JoinHandle<T> {
        self.inner
    }
}

fn spawn_with<F, T>(builder: thread::Builder, identity: TimerId, f: F) -> io::Result<InstrumentedHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let _guard = match thread_state::try_enter() {
        Ok(guard) => guard,
        Err(reason) => {
            passthrough(reason);
            return builder
                .spawn(f)
                .map(|inner| InstrumentedHandle { inner, task: None });
        }
    };
    let Some(runtime) = lifecycle::ensure_initialized() else {
        return builder
            .spawn(f)
            .map(|inner| InstrumentedHandle { inner, task: None });
    };

    let builder = builder.stack_size(runtime.config().effective_stack_size());
    let parent = thread_state::current_task();
    let task = Arc::new(OnceLock::new());
    let child_task = Arc::clone(&task);
    let child_identity = identity.clone();

    let timer = Profiler::new(TimerId::name(CREATE_TIMER));
    let spawned = builder.spawn(move || run_entry(child_identity, child_task, f));
    timer.stop();

    let inner = spawned?;
    let child = register_task(parent, &task, identity);
    Ok(InstrumentedHandle {
        inner,
        task: Some(child),
    })
}

/// Spawn an instrumented thread named after the closure's type
pub fn spawn<F, T>(f: F) -> io::Result<InstrumentedHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    spawn_with(
        thread::Builder::new(),
        TimerId::name(std::any::type_name::<F>()),
        f,
    )
}

/// Spawn an instrumented thread with a name, which is also its identity
pub fn spawn_named<F, T>(name: impl Into<String>, f: F) -> io::Result<InstrumentedHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let name = name.into();
    spawn_with(
        thread::Builder::new().name(name.clone()),
        TimerId::name(name),
        f,
    )
}
