//! Variable registry and tuning context sessions
//!
//! The `Tuner` does the bookkeeping side of the protocol: it stores
//! declarations, hands out context ids, scopes input/output values to a
//! session and forwards decisions and measured costs to the policy. Policy
//! calls are made without holding any registry lock.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{Result, TuningError, VariableKind};
use crate::metrics;
use crate::policy::{Decision, ExhaustiveSearch, Outcome, TuningPolicy};
use crate::variable::{VariableId, VariableInfo, VariableValue};

/// Identifier of one tuning session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A variable as registered with the tuner
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredVariable {
    pub id: VariableId,
    pub name: String,
    pub info: VariableInfo,
}

#[derive(Debug, Default)]
struct Registry {
    variables: Vec<DeclaredVariable>,
    by_name: HashMap<String, VariableId>,
}

impl Registry {
    fn declare(&mut self, name: &str, info: VariableInfo) -> Result<VariableId> {
        if let Some(&id) = self.by_name.get(name) {
            let existing = &self.variables[id.0 as usize];
            if existing.info == info {
                return Ok(id);
            }
            return Err(TuningError::DuplicateVariable(name.to_string()));
        }

        let id = VariableId(self.variables.len() as u64);
        self.variables.push(DeclaredVariable {
            id,
            name: name.to_string(),
            info,
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    fn get(&self, id: VariableId) -> Option<&DeclaredVariable> {
        self.variables.get(id.0 as usize)
    }
}

#[derive(Debug)]
struct Session {
    started: Instant,
    inputs: Option<Arc<[VariableValue]>>,
    outputs: Vec<VariableValue>,
}

#[derive(Debug, Default)]
struct Sessions {
    /// Ids handed out but not yet begun
    allocated: HashSet<ContextId>,
    open: HashMap<ContextId, Session>,
}

impl Sessions {
    fn missing(&self, id: ContextId) -> TuningError {
        if self.allocated.contains(&id) {
            TuningError::NotBegun(id)
        } else {
            TuningError::UnknownContext(id)
        }
    }
}

/// Registry plus session bookkeeping for one policy
pub struct Tuner {
    inputs: RwLock<Registry>,
    outputs: RwLock<Registry>,
    next_context: AtomicU64,
    sessions: Mutex<Sessions>,
    policy: RwLock<Arc<dyn TuningPolicy>>,
}

impl Tuner {
    pub fn new(policy: Arc<dyn TuningPolicy>) -> Self {
        Self {
            inputs: RwLock::new(Registry::default()),
            outputs: RwLock::new(Registry::default()),
            next_context: AtomicU64::new(1),
            sessions: Mutex::new(Sessions::default()),
            policy: RwLock::new(policy),
        }
    }

    /// Replace the decision policy; open contexts report to the new one
    pub fn set_policy(&self, policy: Arc<dyn TuningPolicy>) {
        *self.policy.write().unwrap_or_else(|e| e.into_inner()) = policy;
    }

    fn policy(&self) -> Arc<dyn TuningPolicy> {
        Arc::clone(&self.policy.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn declare_input_type(&self, name: &str, info: VariableInfo) -> Result<VariableId> {
        info.validate(name)?;
        let id = self
            .inputs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .declare(name, info)?;
        metrics::VARIABLES_DECLARED.inc();
        debug!("declared input '{}' as {}", name, id);
        Ok(id)
    }

    pub fn declare_output_type(&self, name: &str, info: VariableInfo) -> Result<VariableId> {
        info.validate(name)?;
        let id = self
            .outputs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .declare(name, info)?;
        metrics::VARIABLES_DECLARED.inc();
        debug!("declared output '{}' as {}", name, id);
        Ok(id)
    }

    pub fn input(&self, id: VariableId) -> Option<DeclaredVariable> {
        self.inputs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn output(&self, id: VariableId) -> Option<DeclaredVariable> {
        self.outputs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Fresh, process-unique, increasing context id
    pub fn get_new_context_id(&self) -> ContextId {
        let id = ContextId(self.next_context.fetch_add(1, Ordering::Relaxed));
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .allocated
            .insert(id);
        id
    }

    pub fn begin_context(&self, id: ContextId) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if sessions.open.contains_key(&id) {
            return Err(TuningError::AlreadyBegun(id));
        }
        if !sessions.allocated.remove(&id) {
            return Err(TuningError::UnknownContext(id));
        }
        sessions.open.insert(
            id,
            Session {
                started: Instant::now(),
                inputs: None,
                outputs: Vec::new(),
            },
        );
        metrics::CONTEXTS_TOTAL.with_label_values(&["begin"]).inc();
        Ok(())
    }

    /// Attach the feature vector describing this decision point
    pub fn set_input_values(&self, id: ContextId, values: &[VariableValue]) -> Result<()> {
        {
            let inputs = self.inputs.read().unwrap_or_else(|e| e.into_inner());
            for value in values {
                let declared = inputs.get(value.id).ok_or(TuningError::UnknownVariable {
                    kind: VariableKind::Input,
                    id: value.id,
                })?;
                if !value.value.fits(declared.info.value_type) {
                    return Err(TuningError::TypeMismatch {
                        name: declared.name.clone(),
                        expected: declared.info.value_type,
                        found: value.value.type_name(),
                    });
                }
            }
        }

        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let err = sessions.missing(id);
        let session = sessions.open.get_mut(&id).ok_or(err)?;
        if session.inputs.is_some() {
            return Err(TuningError::InputsAlreadySet(id));
        }
        session.inputs = Some(values.into());
        Ok(())
    }

    /// Ask the policy to fill each slot in place. Slots the policy leaves
    /// alone, or fills with a value outside the declared domain, keep their
    /// current value.
    pub fn request_output_values(&self, id: ContextId, values: &mut [VariableValue]) -> Result<()> {
        let declared: Vec<DeclaredVariable> = {
            let outputs = self.outputs.read().unwrap_or_else(|e| e.into_inner());
            values
                .iter()
                .map(|v| {
                    outputs.get(v.id).cloned().ok_or(TuningError::UnknownVariable {
                        kind: VariableKind::Output,
                        id: v.id,
                    })
                })
                .collect::<Result<_>>()?
        };

        let inputs = {
            let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            let session = sessions.open.get(&id).ok_or_else(|| sessions.missing(id))?;
            session.inputs.clone().unwrap_or_else(|| Arc::from(Vec::new()))
        };

        let policy = self.policy();
        for (slot, variable) in values.iter_mut().zip(&declared) {
            let decision = Decision {
                context: id,
                variable,
                inputs: &inputs,
                current: &slot.value,
            };
            match policy.choose(&decision) {
                Some(value)
                    if value.fits(variable.info.value_type)
                        && variable.info.domain.contains(&value) =>
                {
                    slot.value = value;
                    metrics::DECISIONS_TOTAL.with_label_values(&["accepted"]).inc();
                }
                Some(value) => {
                    warn!(
                        "policy answered {}={} outside the declared domain; keeping {}",
                        variable.name, value, slot.value
                    );
                    metrics::DECISIONS_TOTAL.with_label_values(&["rejected"]).inc();
                }
                None => {
                    metrics::DECISIONS_TOTAL.with_label_values(&["unchanged"]).inc();
                }
            }
        }

        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let err = sessions.missing(id);
        let session = sessions.open.get_mut(&id).ok_or(err)?;
        for value in values.iter() {
            match session.outputs.iter_mut().find(|o| o.id == value.id) {
                Some(existing) => existing.value = value.value.clone(),
                None => session.outputs.push(value.clone()),
            }
        }
        Ok(())
    }

    /// Close the session and report its measured cost to the policy
    pub fn end_context(&self, id: ContextId) -> Result<Duration> {
        let session = {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            let err = sessions.missing(id);
            sessions.open.remove(&id).ok_or(err)?
        };
        let cost = session.started.elapsed();
        metrics::CONTEXTS_TOTAL.with_label_values(&["end"]).inc();

        let inputs = session.inputs.unwrap_or_else(|| Arc::from(Vec::new()));
        self.policy().observe(&Outcome {
            context: id,
            inputs: &inputs,
            outputs: &session.outputs,
            cost,
        });
        debug!("context {} ended after {:?}", id, cost);
        Ok(cost)
    }

    /// Number of contexts currently open
    pub fn open_contexts(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .open
            .len()
    }
}

impl Default for Tuner {
    fn default() -> Self {
        Self::new(Arc::new(ExhaustiveSearch::new()))
    }
}

impl fmt::Debug for Tuner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tuner")
            .field("next_context", &self.next_context)
            .field("open_contexts", &self.open_contexts())
            .finish_non_exhaustive()
    }
}
