//! Linear standardization of raw clinical inputs.
//!
//! Continuous features are mapped into the numeric space the predictive model
//! was trained on via `(x - mean) / std_dev`; categorical features pass
//! through untouched. Both directions are pure functions of the immutable
//! schema, so a standardized vector can always be mapped back to raw units
//! for display.

use crate::schema::{FeatureSchema, FeatureVector, StandardizedVector};
use ndarray::Array1;

/// Applies the per-feature linear transform to a validated raw vector.
///
/// Infallible: completeness and finiteness were checked when the
/// `FeatureVector` was built, and `std_dev > 0` when the schema was built.
pub fn standardize(raw: &FeatureVector, schema: &FeatureSchema) -> StandardizedVector {
    debug_assert_eq!(raw.len(), schema.len());
    let mut values = Array1::zeros(raw.len());
    for (i, spec) in schema.specs().iter().enumerate() {
        let x = raw.values[i];
        values[i] = if spec.categorical {
            x
        } else {
            (x - spec.mean) / spec.std_dev
        };
    }
    StandardizedVector { values }
}

/// Inverse of [`standardize`]: maps model-space values back to raw units.
pub fn destandardize(scaled: &StandardizedVector, schema: &FeatureSchema) -> FeatureVector {
    debug_assert_eq!(scaled.len(), schema.len());
    let mut values = Array1::zeros(scaled.len());
    for (i, spec) in schema.specs().iter().enumerate() {
        let z = scaled.values[i];
        values[i] = if spec.categorical {
            z
        } else {
            z * spec.std_dev + spec.mean
        };
    }
    FeatureVector { values }
}
