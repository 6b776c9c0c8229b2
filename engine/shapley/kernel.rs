//! Model-agnostic Shapley approximation via kernel-weighted least squares.
//!
//! The prediction is treated as a cooperative game over feature coalitions:
//! a coalition takes its members' values from the input vector and the rest
//! from the background population, and the model is evaluated on the hybrid.
//! Regressing coalition values against coalition membership under the
//! Shapley kernel weight recovers the Shapley values; the empty and full
//! coalitions act as fixed anchors (`v(empty) = base`, `v(full) =
//! predict(x)`) enforced through the equality constraint rather than kernel
//! weight, which is infinite at both ends.

use super::{AttributionStrategy, ExplainError, Explanation, expected_prediction};
use crate::model::{BackgroundDataset, PredictiveModel};
use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView1};
use ndarray_linalg::LeastSquaresSvd;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Strategy B: sampling/regression Shapley approximation.
///
/// Deterministic for a given seed. `max_model_evals` bounds the number of
/// coalition evaluations (each one costs a full model inference per
/// background row); when every proper coalition fits the budget the set is
/// enumerated exhaustively and the result is exact up to the solver.
#[derive(Debug, Clone)]
pub struct KernelExplainer {
    pub max_model_evals: usize,
    pub seed: u64,
}

impl Default for KernelExplainer {
    fn default() -> Self {
        KernelExplainer {
            max_model_evals: 1024,
            seed: 42,
        }
    }
}

/// The Shapley kernel weight for a proper coalition of size `s` among `f`
/// features: `(f-1) / (C(f,s) * s * (f-s))`.
pub fn kernel_weight(f: usize, s: usize) -> f64 {
    debug_assert!(s > 0 && s < f);
    (f as f64 - 1.0) / (binomial(f, s) * s as f64 * (f - s) as f64)
}

fn binomial(n: usize, k: usize) -> f64 {
    let k = k.min(n - k);
    let mut c = 1.0;
    for i in 0..k {
        c *= (n - i) as f64 / (i + 1) as f64;
    }
    c
}

impl KernelExplainer {
    pub fn new(max_model_evals: usize, seed: u64) -> Self {
        KernelExplainer {
            max_model_evals,
            seed,
        }
    }

    /// Proper coalitions (masks over features) with their regression weights.
    ///
    /// Exhaustive when `2^f - 2` fits the evaluation budget, with exact
    /// kernel weights. Otherwise coalition sizes are drawn proportional to
    /// the total kernel mass of each size (`w(s) * C(f,s)`, i.e.
    /// `(f-1)/(s*(f-s))`) and subsets uniformly within the size, so sampled
    /// rows carry unit weight and the kernel is honored in expectation.
    fn coalitions(&self, f: usize) -> Vec<(Vec<bool>, f64)> {
        let exhaustive = f < usize::BITS as usize && (1usize << f) - 2 <= self.max_model_evals;
        if exhaustive {
            let mut out = Vec::with_capacity((1usize << f) - 2);
            for s in 1..f {
                let w = kernel_weight(f, s);
                for members in (0..f).combinations(s) {
                    let mut mask = vec![false; f];
                    for i in members {
                        mask[i] = true;
                    }
                    out.push((mask, w));
                }
            }
            return out;
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let size_mass: Vec<f64> = (1..f)
            .map(|s| (f as f64 - 1.0) / (s as f64 * (f - s) as f64))
            .collect();
        let total_mass: f64 = size_mass.iter().sum();
        // Keep the regression overdetermined even under a tiny budget.
        let rows = self.max_model_evals.max(2 * f);
        let mut out = Vec::with_capacity(rows);
        for _ in 0..rows {
            let mut draw = rng.gen::<f64>() * total_mass;
            let mut s = 1;
            for (i, mass) in size_mass.iter().enumerate() {
                s = i + 1;
                draw -= mass;
                if draw <= 0.0 {
                    break;
                }
            }
            let mut mask = vec![false; f];
            for i in index::sample(&mut rng, f, s) {
                mask[i] = true;
            }
            out.push((mask, 1.0));
        }
        out
    }
}

impl AttributionStrategy for KernelExplainer {
    fn explain(
        &self,
        x: ArrayView1<f64>,
        model: &dyn PredictiveModel,
        background: &BackgroundDataset,
    ) -> Result<Explanation, ExplainError> {
        let f = x.len();
        if f != background.width() {
            return Err(ExplainError::WidthMismatch {
                input: f,
                background: background.width(),
            });
        }

        let base_value = expected_prediction(model, background)?;
        if f == 0 {
            return Ok(Explanation {
                base_value,
                contributions: Array1::zeros(0),
            });
        }
        let full = model.predict(x)?;
        let delta = full - base_value;
        if f == 1 {
            // Trivial game: the single feature carries the whole gap.
            return Ok(Explanation {
                base_value,
                contributions: Array1::from_vec(vec![delta]),
            });
        }

        let coalitions = self.coalitions(f);
        log::debug!(
            "[kernel] {} coalition evaluations over {} background samples for {} features",
            coalitions.len(),
            background.len(),
            f
        );

        let values: Vec<f64> = coalitions
            .par_iter()
            .map(|(mask, _)| coalition_value(mask, x, model, background))
            .collect::<Result<Vec<f64>, ExplainError>>()?;

        // Constrained WLS by substitution: the last attribution is derived
        // from `sum(phi) = delta`, leaving f-1 free coefficients.
        let rows = coalitions.len();
        let mut design = Array2::zeros((rows, f - 1));
        let mut response = Array1::zeros(rows);
        for (j, ((mask, weight), v)) in coalitions.iter().zip(&values).enumerate() {
            let sw = weight.sqrt();
            let last = if mask[f - 1] { 1.0 } else { 0.0 };
            for i in 0..f - 1 {
                let zi = if mask[i] { 1.0 } else { 0.0 };
                design[[j, i]] = sw * (zi - last);
            }
            response[j] = sw * (v - base_value - last * delta);
        }

        let solved = design
            .least_squares(&response)
            .map_err(|e| ExplainError::Solve(e.to_string()))?;
        let mut contributions = Array1::zeros(f);
        contributions
            .slice_mut(ndarray::s![..f - 1])
            .assign(&solved.solution);
        contributions[f - 1] = delta - solved.solution.sum();

        Ok(Explanation {
            base_value,
            contributions,
        })
    }
}

/// `v(S)`: model prediction on the hybrid that takes coalition members from
/// `x` and the rest from a background row, averaged over the background.
fn coalition_value(
    mask: &[bool],
    x: ArrayView1<f64>,
    model: &dyn PredictiveModel,
    background: &BackgroundDataset,
) -> Result<f64, ExplainError> {
    let mut hybrid = x.to_owned();
    let mut total = 0.0;
    for row in background.samples().rows() {
        for (i, &present) in mask.iter().enumerate() {
            hybrid[i] = if present { x[i] } else { row[i] };
        }
        total += model.predict(hybrid.view())?;
    }
    Ok(total / background.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelError;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    struct LinearModel {
        weights: Vec<f64>,
    }

    impl PredictiveModel for LinearModel {
        fn predict(&self, x: ArrayView1<f64>) -> Result<f64, ModelError> {
            Ok(self.weights.iter().zip(x.iter()).map(|(w, v)| w * v).sum())
        }

        fn num_features(&self) -> usize {
            self.weights.len()
        }
    }

    struct FailingModel;

    impl PredictiveModel for FailingModel {
        fn predict(&self, _x: ArrayView1<f64>) -> Result<f64, ModelError> {
            Err(ModelError::Evaluation("backend unavailable".into()))
        }

        fn num_features(&self) -> usize {
            2
        }
    }

    #[test]
    fn kernel_weight_is_symmetric_in_coalition_size() {
        for f in [3, 5, 8, 13] {
            for s in 1..f {
                assert_abs_diff_eq!(
                    kernel_weight(f, s),
                    kernel_weight(f, f - s),
                    epsilon = 1e-12
                );
            }
        }
    }

    #[test]
    fn single_feature_attribution_is_the_full_gap() {
        let model = LinearModel { weights: vec![2.0] };
        let background = BackgroundDataset::new(array![[1.0]]).unwrap();
        let explainer = KernelExplainer::default();
        let e = explainer
            .explain(array![4.0].view(), &model, &background)
            .unwrap();
        assert_abs_diff_eq!(e.base_value, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(e.contributions[0], 6.0, epsilon = 1e-12);
    }

    #[test]
    fn linear_model_attributions_are_exact_under_enumeration() {
        let model = LinearModel {
            weights: vec![0.3, 0.1],
        };
        let background = BackgroundDataset::new(array![[0.0, 0.0]]).unwrap();
        let explainer = KernelExplainer::default();
        let e = explainer
            .explain(array![1.0, 3.0].view(), &model, &background)
            .unwrap();
        assert_abs_diff_eq!(e.base_value, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(e.contributions[0], 0.3, epsilon = 1e-9);
        assert_abs_diff_eq!(e.contributions[1], 0.3, epsilon = 1e-9);
    }

    #[test]
    fn additivity_holds_under_sampling() {
        let weights: Vec<f64> = (0..12).map(|i| 0.05 * (i as f64 + 1.0)).collect();
        let model = LinearModel {
            weights: weights.clone(),
        };
        let background =
            BackgroundDataset::new(Array2::from_shape_fn((4, 12), |(r, c)| {
                0.1 * r as f64 - 0.05 * c as f64
            }))
            .unwrap();
        let x = Array1::from_shape_fn(12, |i| 1.0 + 0.25 * i as f64);
        // 2^12 - 2 proper coalitions exceed the budget, forcing sampling.
        let explainer = KernelExplainer::new(600, 7);
        let e = explainer.explain(x.view(), &model, &background).unwrap();
        let prediction = model.predict(x.view()).unwrap();
        assert_abs_diff_eq!(
            e.base_value + e.total_contribution(),
            prediction,
            epsilon = 1e-6
        );
    }

    #[test]
    fn model_failure_aborts_with_no_partial_result() {
        let background = BackgroundDataset::new(array![[0.0, 0.0]]).unwrap();
        let explainer = KernelExplainer::default();
        let err = explainer
            .explain(array![1.0, 2.0].view(), &FailingModel, &background)
            .unwrap_err();
        assert!(matches!(
            err,
            ExplainError::Model(ModelError::Evaluation(_))
        ));
    }
}
