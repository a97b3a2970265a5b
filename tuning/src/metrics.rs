//! Prometheus counters for the tuning protocol

use once_cell::sync::Lazy;
use prometheus::{register_counter, register_counter_vec, Counter, CounterVec};

pub static CONTEXTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cadence_tuning_contexts_total",
        "Tuning context transitions",
        &["event"]
    )
    .unwrap()
});

pub static DECISIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cadence_tuning_decisions_total",
        "Output values requested from the policy",
        &["status"]
    )
    .unwrap()
});

pub static VARIABLES_DECLARED: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "cadence_tuning_variables_declared_total",
        "Input and output variables declared"
    )
    .unwrap()
});
