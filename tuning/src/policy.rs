//! Decision policies
//!
//! A `TuningPolicy` is the external side of the protocol: it is asked for
//! output values at decision points and told the measured cost when a context
//! ends. `ExhaustiveSearch` is a small built-in policy; real deployments plug
//! in their own.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::context::{ContextId, DeclaredVariable};
use crate::variable::{TuningValue, ValueKey, VariableId, VariableValue};

/// One output value the policy is asked to fill
#[derive(Debug)]
pub struct Decision<'a> {
    pub context: ContextId,
    pub variable: &'a DeclaredVariable,
    /// Feature vector bound to the context (empty if none was set)
    pub inputs: &'a [VariableValue],
    /// Value currently in the caller's slot
    pub current: &'a TuningValue,
}

/// Result of a finished context
#[derive(Debug)]
pub struct Outcome<'a> {
    pub context: ContextId,
    pub inputs: &'a [VariableValue],
    pub outputs: &'a [VariableValue],
    /// Time between `begin_context` and `end_context`
    pub cost: Duration,
}

/// Pluggable decision logic
pub trait TuningPolicy: Send + Sync {
    /// Pick a value for one output variable, or `None` to keep the caller's
    fn choose(&self, decision: &Decision<'_>) -> Option<TuningValue>;

    /// Learn from the measured cost of a finished context
    fn observe(&self, _outcome: &Outcome<'_>) {}
}

/// Policy that never changes a value
#[derive(Debug, Default)]
pub struct KeepDefaults;

impl TuningPolicy for KeepDefaults {
    fn choose(&self, _decision: &Decision<'_>) -> Option<TuningValue> {
        None
    }
}

type FeatureKey = Vec<(VariableId, ValueKey)>;

fn feature_key(inputs: &[VariableValue]) -> FeatureKey {
    let mut key: FeatureKey = inputs.iter().map(|v| (v.id, v.value.key())).collect();
    key.sort();
    key
}

#[derive(Debug, Default, Clone)]
struct Arm {
    samples: u64,
    total: Duration,
}

impl Arm {
    fn mean(&self) -> Option<Duration> {
        if self.samples == 0 {
            None
        } else {
            let nanos = self.total.as_nanos() / u128::from(self.samples);
            Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
        }
    }
}

#[derive(Debug)]
struct Search {
    candidates: Vec<TuningValue>,
    arms: Vec<Arm>,
    issued: usize,
}

impl Search {
    fn new(candidates: Vec<TuningValue>) -> Self {
        let arms = vec![Arm::default(); candidates.len()];
        Self {
            candidates,
            arms,
            issued: 0,
        }
    }

    fn best(&self) -> Option<usize> {
        self.arms
            .iter()
            .enumerate()
            .filter_map(|(i, arm)| arm.mean().map(|m| (i, m)))
            .min_by_key(|(_, mean)| *mean)
            .map(|(i, _)| i)
    }

    fn next(&mut self) -> usize {
        if self.issued < self.candidates.len() {
            let idx = self.issued;
            self.issued += 1;
            idx
        } else {
            self.best().unwrap_or(0)
        }
    }
}

#[derive(Debug, Default)]
struct SearchState {
    searches: HashMap<(VariableId, FeatureKey), Search>,
    in_flight: HashMap<ContextId, Vec<(VariableId, FeatureKey, usize)>>,
}

/// Tries every candidate once per (output, feature vector), then keeps
/// returning the candidate with the lowest mean cost.
///
/// Outputs whose domain cannot be enumerated are left untouched.
#[derive(Debug, Default)]
pub struct ExhaustiveSearch {
    state: Mutex<SearchState>,
}

impl ExhaustiveSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Best known value for `variable` under the given feature vector
    pub fn best(&self, variable: VariableId, inputs: &[VariableValue]) -> Option<TuningValue> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let search = state.searches.get(&(variable, feature_key(inputs)))?;
        search.best().map(|i| search.candidates[i].clone())
    }

    /// Whether every candidate has been tried for the given feature vector
    pub fn converged(&self, variable: VariableId, inputs: &[VariableValue]) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .searches
            .get(&(variable, feature_key(inputs)))
            .map(|s| s.arms.iter().all(|a| a.samples > 0))
            .unwrap_or(false)
    }
}

impl TuningPolicy for ExhaustiveSearch {
    fn choose(&self, decision: &Decision<'_>) -> Option<TuningValue> {
        let candidates = decision.variable.info.domain.candidates()?;
        if candidates.is_empty() {
            return None;
        }

        let features = feature_key(decision.inputs);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let search = state
            .searches
            .entry((decision.variable.id, features.clone()))
            .or_insert_with(|| Search::new(candidates));
        let idx = search.next();
        let value = search.candidates[idx].clone();

        state
            .in_flight
            .entry(decision.context)
            .or_default()
            .push((decision.variable.id, features, idx));

        debug!(
            "context {} chose {}={} (candidate {})",
            decision.context, decision.variable.name, value, idx
        );
        Some(value)
    }

    fn observe(&self, outcome: &Outcome<'_>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tried) = state.in_flight.remove(&outcome.context) else {
            return;
        };
        for (variable, features, idx) in tried {
            if let Some(arm) = state
                .searches
                .get_mut(&(variable, features))
                .and_then(|s| s.arms.get_mut(idx))
            {
                arm.samples += 1;
                arm.total += outcome.cost;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::{make_candidate_set, StatisticalCategory, ValueType, VariableInfo};

    #[test]
    fn test_arm_mean_with_many_samples() {
        let arm = Arm {
            samples: 1 << 32,
            total: Duration::from_nanos(3 << 32),
        };
        assert_eq!(arm.mean(), Some(Duration::from_nanos(3)));
        assert_eq!(Arm::default().mean(), None);
    }

    fn declared(id: u64) -> DeclaredVariable {
        DeclaredVariable {
            id: VariableId(id),
            name: "block_size".to_string(),
            info: VariableInfo::new(
                ValueType::Int64,
                StatisticalCategory::Ratio,
                make_candidate_set(3, &[8i64, 16, 32]).unwrap(),
            ),
        }
    }

    fn run(policy: &ExhaustiveSearch, ctx: u64, var: &DeclaredVariable, cost_of: impl Fn(i64) -> u64) -> i64 {
        let current = TuningValue::Int(0);
        let decision = Decision {
            context: ContextId(ctx),
            variable: var,
            inputs: &[],
            current: &current,
        };
        let value = policy.choose(&decision).unwrap();
        let chosen = value.as_int().unwrap();
        let outputs = [VariableValue { id: var.id, value }];
        policy.observe(&Outcome {
            context: ContextId(ctx),
            inputs: &[],
            outputs: &outputs,
            cost: Duration::from_micros(cost_of(chosen)),
        });
        chosen
    }

    #[test]
    fn test_tries_each_candidate_then_exploits() {
        let policy = ExhaustiveSearch::new();
        let var = declared(0);
        let cost = |v: i64| (v - 16).unsigned_abs() + 1;

        let first: Vec<i64> = (1..=3).map(|c| run(&policy, c, &var, cost)).collect();
        assert_eq!(first, vec![8, 16, 32]);
        assert!(policy.converged(var.id, &[]));

        for c in 4..10 {
            assert_eq!(run(&policy, c, &var, cost), 16);
        }
        assert_eq!(policy.best(var.id, &[]), Some(TuningValue::Int(16)));
    }

    #[test]
    fn test_searches_are_per_feature_vector() {
        let policy = ExhaustiveSearch::new();
        let var = declared(0);
        let current = TuningValue::Int(0);
        let small = [VariableValue {
            id: VariableId(0),
            value: TuningValue::Int(1),
        }];
        let large = [VariableValue {
            id: VariableId(0),
            value: TuningValue::Int(2048),
        }];

        let a = policy.choose(&Decision {
            context: ContextId(1),
            variable: &var,
            inputs: &small,
            current: &current,
        });
        let b = policy.choose(&Decision {
            context: ContextId(2),
            variable: &var,
            inputs: &large,
            current: &current,
        });
        // both searches start from the first candidate
        assert_eq!(a, Some(TuningValue::Int(8)));
        assert_eq!(b, Some(TuningValue::Int(8)));
    }

    #[test]
    fn test_unbounded_domain_is_left_alone() {
        let policy = ExhaustiveSearch::new();
        let var = DeclaredVariable {
            id: VariableId(1),
            name: "free".to_string(),
            info: VariableInfo::new(
                ValueType::Double,
                StatisticalCategory::Ratio,
                crate::variable::CandidateDomain::Unbounded,
            ),
        };
        let current = TuningValue::Double(0.5);
        let decision = Decision {
            context: ContextId(1),
            variable: &var,
            inputs: &[],
            current: &current,
        };
        assert!(policy.choose(&decision).is_none());
    }

    #[test]
    fn test_keep_defaults() {
        let var = declared(0);
        let current = TuningValue::Int(4);
        let decision = Decision {
            context: ContextId(1),
            variable: &var,
            inputs: &[],
            current: &current,
        };
        assert!(KeepDefaults.choose(&decision).is_none());
    }
}
