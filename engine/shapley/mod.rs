//! Shapley-value feature attribution.
//!
//! Two interchangeable strategies behind one contract: an exact walk of
//! additive tree ensembles ([`tree::TreeExplainer`]) and a model-agnostic
//! kernel-weighted regression approximation ([`kernel::KernelExplainer`]).
//! Both decompose a single prediction into per-feature contributions that
//! sum to the gap between the prediction and the background expectation.

pub mod kernel;
pub mod tree;

use crate::model::{BackgroundDataset, BackgroundError, ModelError, PredictiveModel};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures during attribution. A partial attribution is never returned:
/// the first failed model evaluation aborts the whole explanation.
#[derive(Error, Debug)]
pub enum ExplainError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Background(#[from] BackgroundError),
    #[error("input vector has {input} features but the background has {background}")]
    WidthMismatch { input: usize, background: usize },
    #[error("exact tree attribution requires a model that exposes tree-ensemble structure")]
    NotATreeModel,
    #[error("weighted least-squares solve failed: {0}")]
    Solve(String),
}

/// The raw output of one attribution run: the background expectation and one
/// contribution per feature, in schema order.
#[derive(Debug, Clone)]
pub struct Explanation {
    pub base_value: f64,
    pub contributions: Array1<f64>,
}

impl Explanation {
    /// Sum of contributions; equals `prediction - base_value` up to the
    /// strategy's approximation error (exactly, for the tree strategy).
    pub fn total_contribution(&self) -> f64 {
        self.contributions.sum()
    }
}

/// One feature's share of a prediction, paired with the raw (display-space)
/// input value. Contributions stay in the model's output units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribution {
    pub feature: String,
    pub input_value: f64,
    pub contribution: f64,
}

/// The single attribution contract both strategies implement.
///
/// `x` is the standardized input the model actually saw; `base_value` is the
/// model's expected prediction over `background`.
pub trait AttributionStrategy: Send + Sync {
    fn explain(
        &self,
        x: ArrayView1<f64>,
        model: &dyn PredictiveModel,
        background: &BackgroundDataset,
    ) -> Result<Explanation, ExplainError>;
}

/// Mean model prediction over the background population, the attribution
/// baseline shared by both strategies.
pub(crate) fn expected_prediction(
    model: &dyn PredictiveModel,
    background: &BackgroundDataset,
) -> Result<f64, ExplainError> {
    let mut total = 0.0;
    for row in background.samples().rows() {
        total += model.predict(row)?;
    }
    Ok(total / background.len() as f64)
}
