//! # Feature Schema and Input Validation
//!
//! This module is the exclusive entry point for per-request clinical inputs.
//! Its responsibility is to validate a set of named raw measurements against
//! a strict, predefined schema and transform them into the ordered `ndarray`
//! vectors required by the numerical core.
//!
//! - Strict Schema: the ordered feature list for a prediction task is fixed
//!   at configuration time and never mutated at runtime. Requests must supply
//!   exactly the features the schema names.
//! - User-Centric Errors: failures are assumed to be caller-input errors.
//!   The `SchemaError` enum names the offending feature so the enclosing
//!   application can report it directly.

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Static description of one recognized feature: its name, whether it is
/// categorical, and the linear transform parameters for continuous features.
///
/// `mean` and `std_dev` are precomputed externally (from the training
/// distribution) and are ignored for categorical features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub categorical: bool,
    #[serde(default)]
    pub mean: f64,
    #[serde(default = "default_std_dev")]
    pub std_dev: f64,
}

fn default_std_dev() -> f64 {
    1.0
}

impl FeatureSpec {
    /// A continuous feature with the given scaling parameters.
    pub fn continuous(name: &str, mean: f64, std_dev: f64) -> Self {
        FeatureSpec {
            name: name.to_string(),
            categorical: false,
            mean,
            std_dev,
        }
    }

    /// A categorical feature, copied through standardization verbatim.
    pub fn categorical(name: &str) -> Self {
        FeatureSpec {
            name: name.to_string(),
            categorical: true,
            mean: 0.0,
            std_dev: 1.0,
        }
    }
}

/// A comprehensive error type for schema construction and input validation.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("feature list is empty; a prediction task needs at least one feature")]
    EmptySchema,
    #[error("feature '{0}' appears more than once in the schema")]
    DuplicateFeature(String),
    #[error(
        "continuous feature '{name}' has scale std {std_dev}, but standardization requires a finite, strictly positive std"
    )]
    InvalidScale { name: String, std_dev: f64 },
    #[error("continuous feature '{name}' has non-finite scale mean {mean}")]
    InvalidMean { name: String, mean: f64 },
    #[error("missing value for feature '{0}'")]
    MissingFeature(String),
    #[error("input supplies feature '{0}', which this prediction task does not recognize")]
    UnknownFeature(String),
    #[error("input supplies feature '{0}' more than once")]
    DuplicateInput(String),
    #[error("value for feature '{name}' is not finite (got {value})")]
    NonFiniteValue { name: String, value: f64 },
}

/// The ordered, immutable feature list for one prediction task.
///
/// Built once at configuration time; shared read-only by every request.
#[derive(Debug, Clone)]
pub struct FeatureSchema {
    specs: Vec<FeatureSpec>,
}

impl FeatureSchema {
    /// Validates and freezes an ordered feature list.
    ///
    /// Rejects empty lists, duplicate names, and continuous features whose
    /// scale parameters would make the standardization transform undefined
    /// (`std_dev <= 0` or non-finite parameters).
    pub fn new(specs: Vec<FeatureSpec>) -> Result<Self, SchemaError> {
        if specs.is_empty() {
            return Err(SchemaError::EmptySchema);
        }
        for (i, spec) in specs.iter().enumerate() {
            if specs[..i].iter().any(|s| s.name == spec.name) {
                return Err(SchemaError::DuplicateFeature(spec.name.clone()));
            }
            if !spec.categorical {
                if !spec.std_dev.is_finite() || spec.std_dev <= 0.0 {
                    return Err(SchemaError::InvalidScale {
                        name: spec.name.clone(),
                        std_dev: spec.std_dev,
                    });
                }
                if !spec.mean.is_finite() {
                    return Err(SchemaError::InvalidMean {
                        name: spec.name.clone(),
                        mean: spec.mean,
                    });
                }
            }
        }
        Ok(FeatureSchema { specs })
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn specs(&self) -> &[FeatureSpec] {
        &self.specs
    }

    /// Feature names in schema order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.name.as_str())
    }

    /// Builds an ordered `FeatureVector` from named input pairs.
    ///
    /// Every schema feature must be supplied exactly once, every supplied
    /// name must be recognized, and every value must be finite. Violations
    /// surface as `SchemaError`; nothing is defaulted.
    pub fn vector_from_named(&self, named: &[(String, f64)]) -> Result<FeatureVector, SchemaError> {
        for (i, (name, _)) in named.iter().enumerate() {
            if !self.specs.iter().any(|s| &s.name == name) {
                return Err(SchemaError::UnknownFeature(name.clone()));
            }
            if named[..i].iter().any(|(n, _)| n == name) {
                return Err(SchemaError::DuplicateInput(name.clone()));
            }
        }
        let mut values = Array1::zeros(self.specs.len());
        for (i, spec) in self.specs.iter().enumerate() {
            let value = named
                .iter()
                .find(|(n, _)| n == &spec.name)
                .map(|(_, v)| *v)
                .ok_or_else(|| SchemaError::MissingFeature(spec.name.clone()))?;
            if !value.is_finite() {
                return Err(SchemaError::NonFiniteValue {
                    name: spec.name.clone(),
                    value,
                });
            }
            values[i] = value;
        }
        Ok(FeatureVector { values })
    }
}

/// Raw per-request measurements, ordered per the task's schema.
///
/// Immutable once built; owned by a single request.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub(crate) values: Array1<f64>,
}

impl FeatureVector {
    pub fn values(&self) -> ArrayView1<'_, f64> {
        self.values.view()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A `FeatureVector` mapped into the model's native input space: continuous
/// entries linearly transformed, categorical entries copied verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardizedVector {
    pub(crate) values: Array1<f64>,
}

impl StandardizedVector {
    pub fn values(&self) -> ArrayView1<'_, f64> {
        self.values.view()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_feature_schema() -> FeatureSchema {
        FeatureSchema::new(vec![
            FeatureSpec::continuous("Age", 54.0, 11.0),
            FeatureSpec::categorical("Gender"),
        ])
        .unwrap()
    }

    #[test]
    fn builds_vector_in_schema_order_regardless_of_input_order() {
        let schema = two_feature_schema();
        let v = schema
            .vector_from_named(&[("Gender".into(), 1.0), ("Age".into(), 63.0)])
            .unwrap();
        assert_eq!(v.values().to_vec(), vec![63.0, 1.0]);
    }

    #[test]
    fn rejects_missing_feature_by_name() {
        let schema = two_feature_schema();
        let err = schema
            .vector_from_named(&[("Age".into(), 63.0)])
            .unwrap_err();
        assert!(matches!(err, SchemaError::MissingFeature(name) if name == "Gender"));
    }

    #[test]
    fn rejects_unknown_feature() {
        let schema = two_feature_schema();
        let err = schema
            .vector_from_named(&[
                ("Age".into(), 63.0),
                ("Gender".into(), 1.0),
                ("BMI".into(), 27.0),
            ])
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownFeature(name) if name == "BMI"));
    }

    #[test]
    fn rejects_non_finite_value() {
        let schema = two_feature_schema();
        let err = schema
            .vector_from_named(&[("Age".into(), f64::NAN), ("Gender".into(), 0.0)])
            .unwrap_err();
        assert!(matches!(err, SchemaError::NonFiniteValue { name, .. } if name == "Age"));
    }

    #[test]
    fn rejects_duplicate_input() {
        let schema = two_feature_schema();
        let err = schema
            .vector_from_named(&[
                ("Age".into(), 63.0),
                ("Age".into(), 64.0),
                ("Gender".into(), 1.0),
            ])
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateInput(name) if name == "Age"));
    }

    #[test]
    fn rejects_zero_std_at_schema_construction() {
        let err = FeatureSchema::new(vec![FeatureSpec::continuous("WBC", 6.8, 0.0)]).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidScale { name, .. } if name == "WBC"));
    }

    #[test]
    fn rejects_duplicate_schema_names() {
        let err = FeatureSchema::new(vec![
            FeatureSpec::continuous("SBP", 130.0, 15.0),
            FeatureSpec::continuous("SBP", 130.0, 15.0),
        ])
        .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateFeature(name) if name == "SBP"));
    }
}
