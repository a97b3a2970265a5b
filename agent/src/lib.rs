//! Cadence measurement agent
//!
//! Always-on measurement for threaded runtimes: per-thread timers with a
//! single active slot, transparent interception of thread creation and join,
//! and a listener thread that aggregates everything into a report.
//!
//! ```no_run
//! use cadence_agent::{intercept, lifecycle, Config};
//!
//! let session = lifecycle::init(Config::default()).unwrap();
//! let worker = intercept::spawn_named("worker", || 6 * 7).unwrap();
//! assert_eq!(worker.join().unwrap(), 42);
//! let report = session.finish().unwrap();
//! println!("{} timers", report.timers.len());
//! ```

pub mod config;
pub mod error;
pub mod intercept;
pub mod lifecycle;
pub mod listener;
pub mod metrics;
pub mod output;
pub mod report;
pub mod thread_state;
pub mod timer;
pub mod tls;

pub use config::Config;
pub use error::{Error, Result};
pub use intercept::{spawn, spawn_named, InstrumentedHandle};
pub use lifecycle::{ensure_initialized, finalize, init, record_activity, snapshot, Session};
pub use report::ProfileReport;
pub use thread_state::ProfilerHandle;
pub use timer::{start, stop, yield_timer, Profiler};
