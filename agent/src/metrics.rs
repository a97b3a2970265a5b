//! Prometheus metrics for the measurement runtime

use once_cell::sync::Lazy;
use prometheus::{register_counter, register_counter_vec, Counter, CounterVec, Encoder, TextEncoder};

// ── Timers ───────────────────────────────────────────────────────────────────

pub static TIMERS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cadence_timers_total",
        "Timer transitions on measured threads",
        &["event"]
    )
    .unwrap()
});

pub static EVENTS_DROPPED: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "cadence_events_dropped_total",
        "Measurements discarded because no runtime was accepting them"
    )
    .unwrap()
});

// ── Interception ─────────────────────────────────────────────────────────────

pub static THREADS_WRAPPED: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "cadence_threads_wrapped_total",
        "Threads started through the instrumented entry point"
    )
    .unwrap()
});

pub static PASSTHROUGH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cadence_passthrough_total",
        "Create/join calls forwarded without instrumentation",
        &["reason"]
    )
    .unwrap()
});

pub static TASKS_CREATED: Lazy<Counter> = Lazy::new(|| {
    register_counter!("cadence_tasks_created_total", "Task ids allocated").unwrap()
});

// ── Activity ─────────────────────────────────────────────────────────────────

pub static ACTIVITIES_RECORDED: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "cadence_activities_recorded_total",
        "Asynchronous activities merged into the activity table"
    )
    .unwrap()
});

/// Render all registered metrics in the Prometheus text format
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
