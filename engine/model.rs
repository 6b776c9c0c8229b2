//! The predictive-model collaborator and its supporting data.
//!
//! The engine treats the trained model as an opaque, already-loaded function
//! from a standardized feature vector to a risk score or survival curve; it
//! never trains, persists, or deserializes one itself. `TreeEnsemble` is the
//! one concrete model shape the engine understands structurally, because the
//! exact attribution strategy needs to walk its split nodes.

use crate::survival::{CurveError, SurvivalCurve};
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures raised by or about the predictive model.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model evaluation failed: {0}")]
    Evaluation(String),
    #[error("model does not expose a survival curve; configure the task for point risk instead")]
    CurveUnsupported,
    #[error("feature vector has {found} entries but the model expects {expected}")]
    WidthMismatch { found: usize, expected: usize },
    #[error("model returned a malformed survival curve: {0}")]
    MalformedCurve(#[from] CurveError),
    #[error("ensemble has no trees")]
    EmptyEnsemble,
    #[error("tree {tree} is empty")]
    EmptyTree { tree: usize },
    #[error("tree {tree}, node {node}: child index {child} is out of range for {len} nodes")]
    ChildOutOfRange {
        tree: usize,
        node: usize,
        child: usize,
        len: usize,
    },
    #[error("tree {tree}, node {node}: split feature {feature} exceeds model width {width}")]
    SplitFeatureOutOfRange {
        tree: usize,
        node: usize,
        feature: usize,
        width: usize,
    },
    #[error("tree {tree}, node {node}: split threshold is not finite")]
    NonFiniteThreshold { tree: usize, node: usize },
}

/// The opaque collaborator of the whole engine: a deterministic, pure,
/// already-trained predictive model.
///
/// Implementations must be cheap to call many times per request — the
/// sampling attribution strategy evaluates on the order of a thousand hybrid
/// inputs — and safe to share across request-handling threads.
pub trait PredictiveModel: Send + Sync {
    /// Point prediction (risk score) for one standardized feature vector.
    ///
    /// Attribution decomposes this quantity. Models that report risk through
    /// a survival curve should implement `predict` as the point risk at
    /// their reporting horizon so explanations and reported risk agree.
    fn predict(&self, x: ArrayView1<f64>) -> Result<f64, ModelError>;

    /// Survival curve for one standardized feature vector, for models that
    /// produce one. The default declines; tasks configured with a time
    /// horizon require an implementation.
    fn survival_curve(&self, _x: ArrayView1<f64>) -> Result<SurvivalCurve, ModelError> {
        Err(ModelError::CurveUnsupported)
    }

    /// Number of input features the model expects.
    fn num_features(&self) -> usize;

    /// Exposes additive tree-ensemble structure, when the model has it.
    /// Returning `Some` makes the exact attribution strategy available.
    fn ensemble(&self) -> Option<&TreeEnsemble> {
        None
    }
}

/// One node of a binary decision tree. Split nodes route `x[feature] <=
/// threshold` to `left`, otherwise to `right`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// A single decision tree, nodes stored in a flat arena with the root at
/// index 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Evaluates the tree on one feature vector by walking the decision path.
    pub fn evaluate(&self, x: ArrayView1<f64>) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if x[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// How tree outputs combine into the ensemble prediction: summed (gradient
/// boosting) or averaged (random forests).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregation {
    Sum,
    Average,
}

/// An additive ensemble of binary decision trees over standardized inputs.
///
/// Structure is validated once at construction so that tree walks never
/// index out of bounds at prediction or attribution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsemble {
    trees: Vec<Tree>,
    aggregation: Aggregation,
    bias: f64,
    num_features: usize,
}

impl TreeEnsemble {
    pub fn new(
        trees: Vec<Tree>,
        aggregation: Aggregation,
        bias: f64,
        num_features: usize,
    ) -> Result<Self, ModelError> {
        if trees.is_empty() {
            return Err(ModelError::EmptyEnsemble);
        }
        for (t, tree) in trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(ModelError::EmptyTree { tree: t });
            }
            let len = tree.nodes.len();
            for (n, node) in tree.nodes.iter().enumerate() {
                if let Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } = node
                {
                    if *feature >= num_features {
                        return Err(ModelError::SplitFeatureOutOfRange {
                            tree: t,
                            node: n,
                            feature: *feature,
                            width: num_features,
                        });
                    }
                    if !threshold.is_finite() {
                        return Err(ModelError::NonFiniteThreshold { tree: t, node: n });
                    }
                    for child in [*left, *right] {
                        if child >= len {
                            return Err(ModelError::ChildOutOfRange {
                                tree: t,
                                node: n,
                                child,
                                len,
                            });
                        }
                    }
                }
            }
        }
        Ok(TreeEnsemble {
            trees,
            aggregation,
            bias,
            num_features,
        })
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    /// The per-tree scale factor implied by the aggregation mode.
    pub fn tree_scale(&self) -> f64 {
        match self.aggregation {
            Aggregation::Sum => 1.0,
            Aggregation::Average => 1.0 / self.trees.len() as f64,
        }
    }
}

impl PredictiveModel for TreeEnsemble {
    fn predict(&self, x: ArrayView1<f64>) -> Result<f64, ModelError> {
        if x.len() != self.num_features {
            return Err(ModelError::WidthMismatch {
                found: x.len(),
                expected: self.num_features,
            });
        }
        let total: f64 = self.trees.iter().map(|t| t.evaluate(x)).sum();
        Ok(self.bias + total * self.tree_scale())
    }

    fn num_features(&self) -> usize {
        self.num_features
    }

    fn ensemble(&self) -> Option<&TreeEnsemble> {
        Some(self)
    }
}

/// Startup-validation failures for the attribution baseline population.
///
/// A degenerate background prevents the engine from accepting any requests
/// at all; it is never discovered per-request.
#[derive(Error, Debug)]
pub enum BackgroundError {
    #[error("background dataset is empty; attribution needs at least one reference sample")]
    Empty,
    #[error("background sample {row}, column {col} contains a non-finite value")]
    NonFinite { row: usize, col: usize },
    #[error("background has {found} columns but the feature schema defines {expected} features")]
    WidthMismatch { found: usize, expected: usize },
}

/// The reference population (e.g. cluster centroids of the training
/// distribution) used as the expectation baseline for attribution.
///
/// Rows are standardized samples. Loaded once at process start, read-only
/// for the lifetime of the process, shared by all requests.
#[derive(Debug, Clone)]
pub struct BackgroundDataset {
    samples: Array2<f64>,
}

impl BackgroundDataset {
    pub fn new(samples: Array2<f64>) -> Result<Self, BackgroundError> {
        if samples.nrows() == 0 {
            return Err(BackgroundError::Empty);
        }
        for ((row, col), value) in samples.indexed_iter() {
            if !value.is_finite() {
                return Err(BackgroundError::NonFinite { row, col });
            }
        }
        Ok(BackgroundDataset { samples })
    }

    pub fn samples(&self) -> ArrayView2<'_, f64> {
        self.samples.view()
    }

    pub fn len(&self) -> usize {
        self.samples.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.nrows() == 0
    }

    pub fn width(&self) -> usize {
        self.samples.ncols()
    }
}
