//! Tuning protocol errors

use thiserror::Error;

use crate::context::ContextId;
use crate::variable::{ValueType, VariableId};

pub type Result<T> = std::result::Result<T, TuningError>;

/// Which namespace a variable id was looked up in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Input,
    Output,
}

impl std::fmt::Display for VariableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VariableKind::Input => f.write_str("input"),
            VariableKind::Output => f.write_str("output"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TuningError {
    #[error("unknown tuning context {0}")]
    UnknownContext(ContextId),

    #[error("tuning context {0} already begun")]
    AlreadyBegun(ContextId),

    #[error("tuning context {0} has not been begun")]
    NotBegun(ContextId),

    #[error("input values already set for tuning context {0}")]
    InputsAlreadySet(ContextId),

    #[error("unknown {kind} variable {id}")]
    UnknownVariable { kind: VariableKind, id: VariableId },

    #[error("variable '{name}' expects {expected:?} values, got {found}")]
    TypeMismatch {
        name: String,
        expected: ValueType,
        found: &'static str,
    },

    #[error("variable '{0}' already declared with different metadata")]
    DuplicateVariable(String),

    #[error("variable '{0}' has an empty candidate set")]
    EmptyDomain(String),

    #[error("invalid range for variable '{0}': {1}")]
    InvalidRange(String, String),

    #[error("candidate count {count} exceeds the {available} values supplied")]
    CandidateCount { count: usize, available: usize },
}
