//! Tuning variable metadata and values

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, TuningError};

/// Identifier of a declared input or output variable.
///
/// Inputs and outputs are numbered independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariableId(pub u64);

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Semantic type of a variable's values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Int64,
    Double,
    /// Labels or indices without numeric meaning
    Categorical,
    String,
}

/// How values of a variable may be compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticalCategory {
    /// Differences and ratios are meaningful
    Ratio,
    /// Only equality is meaningful
    Categorical,
}

/// A concrete variable value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TuningValue {
    Int(i64),
    Double(f64),
    Text(String),
}

impl TuningValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            TuningValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            TuningValue::Double(v) => Some(*v),
            TuningValue::Int(v) => Some(*v as f64),
            TuningValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TuningValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            TuningValue::Int(_) => "int64",
            TuningValue::Double(_) => "double",
            TuningValue::Text(_) => "string",
        }
    }

    /// Whether the value can be stored in a variable of type `ty`
    pub fn fits(&self, ty: ValueType) -> bool {
        matches!(
            (ty, self),
            (ValueType::Int64, TuningValue::Int(_))
                | (ValueType::Double, TuningValue::Double(_))
                | (ValueType::String, TuningValue::Text(_))
                | (ValueType::Categorical, TuningValue::Int(_))
                | (ValueType::Categorical, TuningValue::Text(_))
        )
    }

    /// Hashable form, with doubles compared bitwise
    pub fn key(&self) -> ValueKey {
        match self {
            TuningValue::Int(v) => ValueKey::Int(*v),
            TuningValue::Double(v) => ValueKey::Double(v.to_bits()),
            TuningValue::Text(s) => ValueKey::Text(s.clone()),
        }
    }
}

impl fmt::Display for TuningValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TuningValue::Int(v) => write!(f, "{}", v),
            TuningValue::Double(v) => write!(f, "{}", v),
            TuningValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for TuningValue {
    fn from(v: i64) -> Self {
        TuningValue::Int(v)
    }
}

impl From<i32> for TuningValue {
    fn from(v: i32) -> Self {
        TuningValue::Int(v.into())
    }
}

impl From<f64> for TuningValue {
    fn from(v: f64) -> Self {
        TuningValue::Double(v)
    }
}

impl From<&str> for TuningValue {
    fn from(v: &str) -> Self {
        TuningValue::Text(v.to_string())
    }
}

impl From<String> for TuningValue {
    fn from(v: String) -> Self {
        TuningValue::Text(v)
    }
}

/// Hashable counterpart of [`TuningValue`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKey {
    Int(i64),
    Double(u64),
    Text(String),
}

/// Explicit set of admissible values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSet(Arc<[TuningValue]>);

impl CandidateSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[TuningValue] {
        &self.0
    }

    pub fn contains(&self, value: &TuningValue) -> bool {
        self.0.iter().any(|c| c == value)
    }
}

/// Closed numeric interval, optionally stepped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub lower: TuningValue,
    pub upper: TuningValue,
    pub step: Option<TuningValue>,
}

/// Largest range `ValueRange::enumerate` expands
const MAX_ENUMERATED: usize = 4096;

impl ValueRange {
    pub fn contains(&self, value: &TuningValue) -> bool {
        match (&self.lower, &self.upper, value) {
            (TuningValue::Int(lo), TuningValue::Int(hi), TuningValue::Int(v)) => lo <= v && v <= hi,
            _ => match (self.lower.as_double(), self.upper.as_double(), value) {
                (Some(lo), Some(hi), TuningValue::Double(v)) => lo <= *v && *v <= hi,
                _ => false,
            },
        }
    }

    /// Stepped values from lower to upper, or `None` when the range is not
    /// discrete or too large to list
    pub fn enumerate(&self) -> Option<Vec<TuningValue>> {
        match (&self.lower, &self.upper, &self.step) {
            (TuningValue::Int(lo), TuningValue::Int(hi), step) => {
                let step = match step {
                    Some(TuningValue::Int(s)) if *s > 0 => *s,
                    None => 1,
                    _ => return None,
                };
                let span = hi.checked_sub(*lo).filter(|s| *s >= 0)?;
                let count = usize::try_from(span.checked_div(step)?.checked_add(1)?).ok()?;
                if count > MAX_ENUMERATED {
                    return None;
                }
                Some(
                    (0..count as i64)
                        .map(|i| TuningValue::Int(lo + i * step))
                        .collect(),
                )
            }
            (TuningValue::Double(lo), TuningValue::Double(hi), Some(TuningValue::Double(step)))
                if *step > 0.0 =>
            {
                let steps = ((hi - lo) / step).floor();
                if !steps.is_finite() || steps < 0.0 || steps >= MAX_ENUMERATED as f64 {
                    return None;
                }
                let count = steps as usize + 1;
                Some(
                    (0..count)
                        .map(|i| TuningValue::Double(lo + i as f64 * step))
                        .collect(),
                )
            }
            _ => None,
        }
    }
}

/// Value domain of a variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateDomain {
    Set(CandidateSet),
    Range(ValueRange),
    /// Any value of the right type (typical for inputs)
    Unbounded,
}

impl CandidateDomain {
    pub fn contains(&self, value: &TuningValue) -> bool {
        match self {
            CandidateDomain::Set(set) => set.contains(value),
            CandidateDomain::Range(range) => range.contains(value),
            CandidateDomain::Unbounded => true,
        }
    }

    /// All admissible values, when the domain is finite and small enough
    pub fn candidates(&self) -> Option<Vec<TuningValue>> {
        match self {
            CandidateDomain::Set(set) => Some(set.values().to_vec()),
            CandidateDomain::Range(range) => range.enumerate(),
            CandidateDomain::Unbounded => None,
        }
    }
}

/// Declared metadata of one tunable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableInfo {
    pub value_type: ValueType,
    pub category: StatisticalCategory,
    pub domain: CandidateDomain,
}

impl VariableInfo {
    pub fn new(value_type: ValueType, category: StatisticalCategory, domain: CandidateDomain) -> Self {
        Self {
            value_type,
            category,
            domain,
        }
    }

    /// Check the domain is non-empty and agrees with the value type
    pub fn validate(&self, name: &str) -> Result<()> {
        match &self.domain {
            CandidateDomain::Set(set) => {
                if set.is_empty() {
                    return Err(TuningError::EmptyDomain(name.to_string()));
                }
                if let Some(bad) = set.values().iter().find(|v| !v.fits(self.value_type)) {
                    return Err(TuningError::TypeMismatch {
                        name: name.to_string(),
                        expected: self.value_type,
                        found: bad.type_name(),
                    });
                }
            }
            CandidateDomain::Range(range) => {
                if !matches!(self.value_type, ValueType::Int64 | ValueType::Double) {
                    return Err(TuningError::InvalidRange(
                        name.to_string(),
                        "ranges need a numeric value type".to_string(),
                    ));
                }
                if !range.lower.fits(self.value_type) || !range.upper.fits(self.value_type) {
                    return Err(TuningError::TypeMismatch {
                        name: name.to_string(),
                        expected: self.value_type,
                        found: range.lower.type_name(),
                    });
                }
                match (range.lower.as_double(), range.upper.as_double()) {
                    (Some(lo), Some(hi)) if !lo.is_finite() || !hi.is_finite() => {
                        return Err(TuningError::InvalidRange(
                            name.to_string(),
                            format!("bounds {} and {} must be finite", range.lower, range.upper),
                        ))
                    }
                    (Some(lo), Some(hi)) if lo <= hi => {}
                    _ => {
                        return Err(TuningError::InvalidRange(
                            name.to_string(),
                            format!("lower {} above upper {}", range.lower, range.upper),
                        ))
                    }
                }
            }
            CandidateDomain::Unbounded => {}
        }
        Ok(())
    }
}

/// A value bound to a declared variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableValue {
    pub id: VariableId,
    pub value: TuningValue,
}

/// Pair a variable id with a value
pub fn make_variable_value(id: VariableId, value: impl Into<TuningValue>) -> VariableValue {
    VariableValue {
        id,
        value: value.into(),
    }
}

/// Candidate-set domain built from the first `count` entries of `values`.
///
/// The values are copied into shared storage, so the caller's buffer does not
/// need to outlive the declaration.
pub fn make_candidate_set<T>(count: usize, values: &[T]) -> Result<CandidateDomain>
where
    T: Clone + Into<TuningValue>,
{
    if count > values.len() {
        return Err(TuningError::CandidateCount {
            count,
            available: values.len(),
        });
    }
    let set: Arc<[TuningValue]> = values[..count].iter().cloned().map(Into::into).collect();
    Ok(CandidateDomain::Set(CandidateSet(set)))
}

/// Bounded range domain
pub fn make_range(
    lower: impl Into<TuningValue>,
    upper: impl Into<TuningValue>,
    step: Option<TuningValue>,
) -> CandidateDomain {
    CandidateDomain::Range(ValueRange {
        lower: lower.into(),
        upper: upper.into(),
        step,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_candidate_set() {
        let sizes: Vec<i64> = vec![1, 16, 1024, 2048];
        let domain = make_candidate_set(sizes.len(), &sizes).unwrap();
        drop(sizes);

        assert!(domain.contains(&TuningValue::Int(1024)));
        assert!(!domain.contains(&TuningValue::Int(3)));
        assert_eq!(domain.candidates().unwrap().len(), 4);
    }

    #[test]
    fn test_candidate_set_prefix_and_overflow() {
        let values = [1i64, 2, 3];
        let domain = make_candidate_set(2, &values).unwrap();
        assert!(!domain.contains(&TuningValue::Int(3)));

        let err = make_candidate_set(5, &values).unwrap_err();
        assert!(matches!(
            err,
            TuningError::CandidateCount {
                count: 5,
                available: 3
            }
        ));
    }

    #[test]
    fn test_int_range() {
        let domain = make_range(0i64, 10i64, Some(TuningValue::Int(5)));
        assert!(domain.contains(&TuningValue::Int(7)));
        assert!(!domain.contains(&TuningValue::Int(11)));
        assert_eq!(
            domain.candidates().unwrap(),
            vec![TuningValue::Int(0), TuningValue::Int(5), TuningValue::Int(10)]
        );
    }

    #[test]
    fn test_double_range() {
        let domain = make_range(0.0, 1.0, Some(TuningValue::Double(0.25)));
        assert!(domain.contains(&TuningValue::Double(0.3)));
        assert!(!domain.contains(&TuningValue::Int(0)));
        assert_eq!(domain.candidates().unwrap().len(), 5);

        let continuous = make_range(0.0, 1.0, None);
        assert!(continuous.candidates().is_none());
    }

    #[test]
    fn test_huge_ranges_are_not_enumerated() {
        let full = make_range(0i64, i64::MAX, None);
        assert!(full.candidates().is_none());
        assert!(full.contains(&TuningValue::Int(i64::MAX)));

        let widest = make_range(i64::MIN, i64::MAX, Some(TuningValue::Int(1)));
        assert!(widest.candidates().is_none());

        let unbounded = make_range(0.0, f64::INFINITY, Some(TuningValue::Double(0.5)));
        assert!(unbounded.candidates().is_none());

        let edge = make_range(0.0, 4095.0, Some(TuningValue::Double(1.0)));
        assert_eq!(edge.candidates().unwrap().len(), 4096);
        let past_edge = make_range(0.0, 4096.0, Some(TuningValue::Double(1.0)));
        assert!(past_edge.candidates().is_none());
    }

    #[test]
    fn test_value_fits() {
        assert!(TuningValue::Int(1).fits(ValueType::Int64));
        assert!(TuningValue::Int(1).fits(ValueType::Categorical));
        assert!(TuningValue::from("blocked").fits(ValueType::Categorical));
        assert!(!TuningValue::Double(1.0).fits(ValueType::Int64));
        assert!(!TuningValue::Int(1).fits(ValueType::String));
    }

    #[test]
    fn test_validate() {
        let empty = VariableInfo::new(
            ValueType::Int64,
            StatisticalCategory::Ratio,
            make_candidate_set::<i64>(0, &[]).unwrap(),
        );
        assert!(matches!(empty.validate("x"), Err(TuningError::EmptyDomain(_))));

        let mixed = VariableInfo::new(
            ValueType::Int64,
            StatisticalCategory::Ratio,
            make_candidate_set(2, &[TuningValue::Int(1), TuningValue::Double(2.0)]).unwrap(),
        );
        assert!(matches!(mixed.validate("x"), Err(TuningError::TypeMismatch { .. })));

        let inverted = VariableInfo::new(
            ValueType::Int64,
            StatisticalCategory::Ratio,
            make_range(10i64, 1i64, None),
        );
        assert!(matches!(inverted.validate("x"), Err(TuningError::InvalidRange(..))));

        let infinite = VariableInfo::new(
            ValueType::Double,
            StatisticalCategory::Ratio,
            make_range(0.0, f64::INFINITY, Some(TuningValue::Double(0.5))),
        );
        assert!(matches!(infinite.validate("x"), Err(TuningError::InvalidRange(..))));

        let text_range = VariableInfo::new(
            ValueType::String,
            StatisticalCategory::Categorical,
            make_range("a", "b", None),
        );
        assert!(text_range.validate("x").is_err());

        let ok = VariableInfo::new(
            ValueType::Categorical,
            StatisticalCategory::Categorical,
            make_candidate_set(2, &["static", "dynamic"]).unwrap(),
        );
        assert!(ok.validate("schedule").is_ok());
    }

    #[test]
    fn test_value_key_distinguishes_types() {
        assert_ne!(TuningValue::Int(1).key(), TuningValue::Double(1.0).key());
        assert_eq!(TuningValue::Double(0.5).key(), TuningValue::Double(0.5).key());
    }
}
