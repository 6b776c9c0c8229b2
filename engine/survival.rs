//! Survival curves and time-horizon risk resolution.
//!
//! Trained survival models report a discrete, monotonically non-increasing
//! curve at observed event times; clinical reporting needs one number at a
//! fixed horizon (e.g. 240 months). The resolver clamps at the ends of the
//! observed support rather than extrapolating, and linearly interpolates
//! between bracketing points inside it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failures for a model-produced survival curve.
///
/// A malformed curve is fatal to the request that produced it; the engine
/// never repairs or re-sorts model output.
#[derive(Error, Debug)]
pub enum CurveError {
    #[error("survival curve is empty")]
    Empty,
    #[error("survival curve has {times} time points but {probs} probabilities")]
    LengthMismatch { times: usize, probs: usize },
    #[error("survival curve time at index {index} is not strictly increasing ({prev} -> {next})")]
    NonIncreasingTime { index: usize, prev: f64, next: f64 },
    #[error(
        "survival probability at index {index} increases over time ({prev} -> {next}); curves must be non-increasing"
    )]
    IncreasingProbability { index: usize, prev: f64, next: f64 },
    #[error("survival probability {value} at index {index} is outside [0, 1]")]
    ProbabilityOutOfRange { index: usize, value: f64 },
    #[error("survival curve contains a non-finite entry at index {index}")]
    NonFiniteEntry { index: usize },
}

/// A validated `(time, survival probability)` step curve.
///
/// Invariants established at construction: non-empty, strictly increasing
/// times, probabilities finite, within [0, 1], and non-increasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurvivalCurve {
    times: Vec<f64>,
    probs: Vec<f64>,
}

impl SurvivalCurve {
    pub fn new(times: Vec<f64>, probs: Vec<f64>) -> Result<Self, CurveError> {
        if times.is_empty() {
            return Err(CurveError::Empty);
        }
        if times.len() != probs.len() {
            return Err(CurveError::LengthMismatch {
                times: times.len(),
                probs: probs.len(),
            });
        }
        for i in 0..times.len() {
            if !times[i].is_finite() || !probs[i].is_finite() {
                return Err(CurveError::NonFiniteEntry { index: i });
            }
            if !(0.0..=1.0).contains(&probs[i]) {
                return Err(CurveError::ProbabilityOutOfRange {
                    index: i,
                    value: probs[i],
                });
            }
            if i > 0 {
                if times[i] <= times[i - 1] {
                    return Err(CurveError::NonIncreasingTime {
                        index: i,
                        prev: times[i - 1],
                        next: times[i],
                    });
                }
                if probs[i] > probs[i - 1] {
                    return Err(CurveError::IncreasingProbability {
                        index: i,
                        prev: probs[i - 1],
                        next: probs[i],
                    });
                }
            }
        }
        Ok(SurvivalCurve { times, probs })
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.probs
    }

    /// Survival probability at `horizon`: clamped to the first/last observed
    /// point outside the curve's support, linearly interpolated inside it.
    pub fn survival_at(&self, horizon: f64) -> f64 {
        let n = self.times.len();
        if horizon <= self.times[0] {
            return self.probs[0];
        }
        if horizon >= self.times[n - 1] {
            return self.probs[n - 1];
        }
        // Find the bracketing segment [t_i, t_{i+1}) containing the horizon.
        let i = match self
            .times
            .binary_search_by(|t| t.partial_cmp(&horizon).unwrap_or(std::cmp::Ordering::Less))
        {
            Ok(exact) => return self.probs[exact],
            Err(insertion) => insertion - 1,
        };
        let (t0, t1) = (self.times[i], self.times[i + 1]);
        let (p0, p1) = (self.probs[i], self.probs[i + 1]);
        p0 + (p1 - p0) * (horizon - t0) / (t1 - t0)
    }

    /// Risk of the outcome having occurred by `horizon`: `1 - survival`.
    pub fn risk_at(&self, horizon: f64) -> f64 {
        1.0 - self.survival_at(horizon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn curve() -> SurvivalCurve {
        SurvivalCurve::new(vec![10.0, 20.0, 30.0], vec![0.9, 0.8, 0.7]).unwrap()
    }

    #[test]
    fn clamps_below_observed_support() {
        assert_abs_diff_eq!(curve().risk_at(5.0), 0.10, epsilon = 1e-12);
    }

    #[test]
    fn clamps_above_observed_support() {
        assert_abs_diff_eq!(curve().risk_at(35.0), 0.30, epsilon = 1e-12);
    }

    #[test]
    fn interpolates_between_bracketing_points() {
        assert_abs_diff_eq!(curve().risk_at(25.0), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn exact_time_point_returns_observed_probability() {
        assert_abs_diff_eq!(curve().survival_at(20.0), 0.8, epsilon = 1e-12);
    }

    #[test]
    fn rejects_empty_curve() {
        assert!(matches!(
            SurvivalCurve::new(vec![], vec![]),
            Err(CurveError::Empty)
        ));
    }

    #[test]
    fn rejects_unsorted_times() {
        assert!(matches!(
            SurvivalCurve::new(vec![10.0, 10.0], vec![0.9, 0.8]),
            Err(CurveError::NonIncreasingTime { index: 1, .. })
        ));
    }

    #[test]
    fn rejects_increasing_probability() {
        assert!(matches!(
            SurvivalCurve::new(vec![10.0, 20.0], vec![0.8, 0.9]),
            Err(CurveError::IncreasingProbability { index: 1, .. })
        ));
    }

    #[test]
    fn rejects_probability_outside_unit_interval() {
        assert!(matches!(
            SurvivalCurve::new(vec![10.0], vec![1.2]),
            Err(CurveError::ProbabilityOutOfRange { index: 0, .. })
        ));
    }
}
