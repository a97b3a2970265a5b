//! Process-wide measurement runtime
//!
//! The runtime is built once, either explicitly with [`init`] or lazily by
//! the first intercepted thread creation. It owns the channel to the
//! statistics listener and the async activity table. [`finalize`] drains the
//! listener and writes the report; afterwards new measurements are dropped.

use cadence_gpu::{ActivityTable, AsyncActivity};
use cadence_shared::types::events::MeasurementEvent;
use cadence_shared::types::profile::TimerProfile;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Mutex, OnceLock};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::intercept;
use crate::listener::{Listener, Message};
use crate::metrics;
use crate::output::json::write_report;
use crate::report::ProfileReport;
use crate::thread_state;

/// Name of the listener thread
pub const LISTENER_THREAD: &str = "cadence-listener";

/// State shared by every measured thread
#[derive(Debug)]
pub struct Runtime {
    config: Config,
    events: Sender<Message>,
    listener: Mutex<Option<JoinHandle<TimerProfile>>>,
    activity: ActivityTable,
    finalized: AtomicBool,
    report: Mutex<Option<ProfileReport>>,
}

impl Runtime {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn activity(&self) -> &ActivityTable {
        &self.activity
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    fn send(&self, event: MeasurementEvent) {
        if self.is_finalized() || self.events.send(Message::Event(event)).is_err() {
            metrics::EVENTS_DROPPED.inc();
        }
    }

    fn flush(&self) -> Option<TimerProfile> {
        let (reply, response) = mpsc::channel();
        self.events.send(Message::Flush(reply)).ok()?;
        response.recv().ok()
    }

    fn report(&self, profile: &TimerProfile) -> ProfileReport {
        ProfileReport::new(&self.config.program, profile, &self.activity)
    }
}

static RUNTIME: OnceLock<Runtime> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Guard returned by [`init`]; finalizes the runtime when dropped
#[derive(Debug)]
#[must_use = "dropping the session finalizes measurement"]
pub struct Session {
    _private: (),
}

impl Session {
    /// Finalize now and return the report
    pub fn finish(self) -> Option<ProfileReport> {
        // Drop runs `finalize` again, which is a no-op after this call.
        finalize()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        finalize();
    }
}

/// Install a stderr diagnostics subscriber unless the host already has one
fn init_diagnostics(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}

fn build(config: Config) -> Result<Runtime> {
    config.validate().map_err(Error::Config)?;
    init_diagnostics(&config.log_filter);

    // Mark this thread as inside a wrapper so the listener thread is created
    // without instrumentation. Interception may already hold the flag.
    let _guard = thread_state::try_enter().ok();

    let (events, rx) = mpsc::channel();
    let listener = intercept::spawn_named(LISTENER_THREAD, move || Listener::new().run(rx))?;

    info!(
        "measurement runtime started for '{}' (stack size {} bytes, extended correlation {})",
        config.program,
        config.effective_stack_size(),
        config.extended_correlation
    );

    Ok(Runtime {
        activity: ActivityTable::new(config.extended_correlation),
        config,
        events,
        listener: Mutex::new(Some(listener.into_inner())),
        finalized: AtomicBool::new(false),
        report: Mutex::new(None),
    })
}

fn install(config: Config) -> Result<&'static Runtime> {
    let _lock = INIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    if RUNTIME.get().is_some() {
        return Err(Error::AlreadyInitialized);
    }
    let runtime = build(config)?;
    Ok(RUNTIME.get_or_init(|| runtime))
}

/// Initialize the runtime with an explicit configuration
pub fn init(config: Config) -> Result<Session> {
    install(config)?;
    Ok(Session { _private: () })
}

extern "C" fn finalize_at_exit() {
    finalize();
}

/// Runtime for interception, built from the environment on first use
pub fn ensure_initialized() -> Option<&'static Runtime> {
    if let Some(runtime) = RUNTIME.get() {
        return Some(runtime);
    }

    match install(Config::default()) {
        Ok(runtime) => {
            // SAFETY: registering a plain `extern "C"` function.
            if unsafe { libc::atexit(finalize_at_exit) } != 0 {
                warn!("could not register exit hook; call finalize() explicitly");
            }
            Some(runtime)
        }
        // Another thread won the race.
        Err(Error::AlreadyInitialized) => RUNTIME.get(),
        Err(err) => {
            error!("measurement runtime unavailable: {}", err);
            None
        }
    }
}

/// The runtime, if it has been initialized
pub fn runtime() -> Option<&'static Runtime> {
    RUNTIME.get()
}

/// Hand an event to the listener; dropped before init and after finalize
pub(crate) fn emit(event: MeasurementEvent) {
    match RUNTIME.get() {
        Some(runtime) => runtime.send(event),
        None => metrics::EVENTS_DROPPED.inc(),
    }
}

/// Report reflecting every measurement sent before the call
pub fn snapshot() -> Option<ProfileReport> {
    let runtime = RUNTIME.get()?;
    if runtime.is_finalized() {
        return runtime
            .report
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
    }
    let profile = runtime.flush()?;
    Some(runtime.report(&profile))
}

/// Merge a completed async activity into the runtime's activity table
pub fn record_activity(activity: &AsyncActivity) {
    if let Some(runtime) = RUNTIME.get() {
        if !runtime.is_finalized() {
            runtime.activity.record(activity);
            metrics::ACTIVITIES_RECORDED.inc();
        }
    }
}

/// Stop measurement, drain the listener and write the report.
///
/// Idempotent: later calls return the same report.
pub fn finalize() -> Option<ProfileReport> {
    let runtime = RUNTIME.get()?;

    let handle = {
        let mut listener = runtime.listener.lock().unwrap_or_else(|e| e.into_inner());
        match listener.take() {
            Some(handle) => handle,
            None => {
                drop(listener);
                return runtime
                    .report
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .clone();
            }
        }
    };

    thread_state::stop_active();
    let _ = runtime.events.send(Message::Shutdown);
    runtime.finalized.store(true, Ordering::Release);

    let profile = match handle.join() {
        Ok(profile) => profile,
        Err(_) => {
            error!("statistics listener panicked; report is empty");
            TimerProfile::default()
        }
    };
    let report = runtime.report(&profile);
    debug!(
        "finalized: {} timers, {} tasks",
        report.timers.len(),
        report.task_edges.len()
    );

    if let Some(path) = &runtime.config.output_path {
        if let Err(err) = write_report(&report, path) {
            error!("{:#}", err);
        }
    }

    *runtime.report.lock().unwrap_or_else(|e| e.into_inner()) = Some(report.clone());
    Some(report)
}

/// Whether measurement has ended for this process
pub fn is_finalized() -> bool {
    RUNTIME.get().map_or(false, Runtime::is_finalized)
}

/// Runtime for unit tests: large stacks, never finalized
#[cfg(test)]
pub(crate) fn test_runtime() -> &'static Runtime {
    if RUNTIME.get().is_none() {
        let config = Config {
            stack_size: 1 << 20,
            program: "unit-tests".to_string(),
            ..Config::default()
        };
        if let Ok(session) = init(config) {
            std::mem::forget(session);
        }
    }
    RUNTIME.get().expect("runtime initialized")
}
