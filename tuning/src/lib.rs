//! Autonomic tuning context protocol
//!
//! Applications and middleware declare tunable inputs and outputs, then wrap
//! each decision point in a context: begin, bind the feature vector, ask for
//! output values, end. The elapsed time of the context is the cost fed back to
//! the policy.
//!
//! The free functions operate on a process-wide [`Tuner`]; independent
//! instances can be built with [`Tuner::new`].

pub mod context;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod variable;

pub use context::{ContextId, DeclaredVariable, Tuner};
pub use error::{Result, TuningError, VariableKind};
pub use policy::{Decision, ExhaustiveSearch, KeepDefaults, Outcome, TuningPolicy};
pub use variable::{
    make_candidate_set, make_range, make_variable_value, CandidateDomain, CandidateSet,
    StatisticalCategory, TuningValue, ValueRange, ValueType, VariableId, VariableInfo,
    VariableValue,
};

use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::Duration;

static GLOBAL: Lazy<Tuner> = Lazy::new(Tuner::default);

/// The process-wide tuner used by the free functions
pub fn global() -> &'static Tuner {
    &GLOBAL
}

/// Install the policy for the process-wide tuner
pub fn set_policy(policy: Arc<dyn TuningPolicy>) {
    GLOBAL.set_policy(policy);
}

pub fn declare_input_type(name: &str, info: VariableInfo) -> Result<VariableId> {
    GLOBAL.declare_input_type(name, info)
}

pub fn declare_output_type(name: &str, info: VariableInfo) -> Result<VariableId> {
    GLOBAL.declare_output_type(name, info)
}

pub fn get_new_context_id() -> ContextId {
    GLOBAL.get_new_context_id()
}

pub fn begin_context(id: ContextId) -> Result<()> {
    GLOBAL.begin_context(id)
}

pub fn set_input_values(id: ContextId, values: &[VariableValue]) -> Result<()> {
    GLOBAL.set_input_values(id, values)
}

pub fn request_output_values(id: ContextId, values: &mut [VariableValue]) -> Result<()> {
    GLOBAL.request_output_values(id, values)
}

pub fn end_context(id: ContextId) -> Result<Duration> {
    GLOBAL.end_context(id)
}
