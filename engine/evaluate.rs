//! The per-request pipeline and its configuration.
//!
//! A [`RiskEngine`] owns one prediction task: the feature schema, the loaded
//! predictive model, the background population, the time horizon, the tier
//! cutoffs, and the selected attribution strategy. All of it is immutable
//! after construction, so one engine may serve any number of concurrent
//! requests; each `evaluate` call owns its own vectors and result.
//!
//! Startup validation is deliberately front-loaded: a degenerate background,
//! a width mismatch, or an unavailable strategy prevents the engine from
//! being built at all rather than failing per-request.

use crate::model::{BackgroundDataset, BackgroundError, ModelError, PredictiveModel};
use crate::schema::{FeatureSchema, FeatureSpec, SchemaError};
use crate::shapley::kernel::KernelExplainer;
use crate::shapley::tree::TreeExplainer;
use crate::shapley::{Attribution, AttributionStrategy, ExplainError};
use crate::standardize::standardize;
use crate::survival::CurveError;
use crate::tier::{RiskTier, TierCutoffs, TierError, classify};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Any failure across the whole pipeline. Every variant aborts the request
/// (or engine construction) with no partial result.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to read or write task configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML task configuration: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize task configuration to TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Tier(#[from] TierError),
    #[error(transparent)]
    Curve(#[from] CurveError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Background(#[from] BackgroundError),
    #[error(transparent)]
    Explain(#[from] ExplainError),
    #[error("time horizon must be finite and positive, got {0}")]
    InvalidHorizon(f64),
    #[error(
        "task '{task}' requests exact tree attribution but the model does not expose tree-ensemble structure"
    )]
    TreeStrategyUnavailable { task: String },
    #[error("model produced risk {0}, outside the probability range [0, 1]")]
    RiskOutOfRange(f64),
}

/// Which attribution strategy a task uses. `Auto` picks the exact tree walk
/// whenever the model exposes ensemble structure and falls back to kernel
/// sampling otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StrategyChoice {
    TreeExact,
    KernelSampling,
    #[default]
    Auto,
}

fn default_max_model_evals() -> usize {
    1024
}

fn default_sampling_seed() -> u64 {
    42
}

/// Everything that defines one prediction task, fixed at configuration time.
///
/// Serialized as human-readable TOML so deployed tasks can be inspected and
/// diffed. The trained model itself is a separately loaded collaborator and
/// is never part of this artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    /// Ordered feature list; order fixes the layout of every vector the
    /// task touches, including the background dataset's columns.
    pub features: Vec<FeatureSpec>,
    /// `Some(h)`: the model must emit a survival curve, resolved at `h`.
    /// `None`: the model's scalar prediction is used as the risk directly.
    pub horizon: Option<f64>,
    pub cutoffs: TierCutoffs,
    #[serde(default)]
    pub strategy: StrategyChoice,
    /// Evaluation budget for the sampling strategy; ignored by the exact one.
    #[serde(default = "default_max_model_evals")]
    pub max_model_evals: usize,
    #[serde(default = "default_sampling_seed")]
    pub sampling_seed: u64,
}

impl TaskConfig {
    /// Loads a task configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Saves the task configuration as pretty-printed TOML.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;
        Ok(())
    }
}

/// The fully assembled answer for one request. Either every field is
/// populated and the additivity invariant holds, or no result is produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskResult {
    pub risk_probability: f64,
    pub survival_probability: f64,
    pub tier: RiskTier,
    /// The model's expected prediction over the background population.
    pub base_value: f64,
    /// Sorted by descending absolute contribution. `input_value` fields are
    /// raw (unscaled) measurements for display; contributions stay in the
    /// model's output units.
    pub attributions: Vec<Attribution>,
}

/// One prediction task, ready to serve requests.
pub struct RiskEngine {
    name: String,
    schema: FeatureSchema,
    model: Arc<dyn PredictiveModel>,
    background: BackgroundDataset,
    horizon: Option<f64>,
    cutoffs: TierCutoffs,
    strategy: Box<dyn AttributionStrategy>,
}

impl std::fmt::Debug for RiskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskEngine")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl RiskEngine {
    /// Validates the whole task wiring and freezes it.
    ///
    /// Checks performed here, so that `evaluate` never fails on task-level
    /// inconsistencies: schema validity, cutoff ordering, horizon finiteness,
    /// model and background width against the schema, background degeneracy,
    /// and strategy availability.
    pub fn new(
        config: TaskConfig,
        model: Arc<dyn PredictiveModel>,
        background: BackgroundDataset,
    ) -> Result<Self, EngineError> {
        let schema = FeatureSchema::new(config.features)?;
        let cutoffs = TierCutoffs::new(config.cutoffs.low, config.cutoffs.high)?;
        if let Some(h) = config.horizon {
            if !h.is_finite() || h <= 0.0 {
                return Err(EngineError::InvalidHorizon(h));
            }
        }
        if background.width() != schema.len() {
            return Err(BackgroundError::WidthMismatch {
                found: background.width(),
                expected: schema.len(),
            }
            .into());
        }
        if model.num_features() != schema.len() {
            return Err(ModelError::WidthMismatch {
                found: schema.len(),
                expected: model.num_features(),
            }
            .into());
        }

        let tree_capable = model.ensemble().is_some();
        let strategy: Box<dyn AttributionStrategy> = match config.strategy {
            StrategyChoice::TreeExact if tree_capable => Box::new(TreeExplainer),
            StrategyChoice::TreeExact => {
                return Err(EngineError::TreeStrategyUnavailable { task: config.name });
            }
            StrategyChoice::Auto if tree_capable => Box::new(TreeExplainer),
            StrategyChoice::Auto | StrategyChoice::KernelSampling => Box::new(
                KernelExplainer::new(config.max_model_evals, config.sampling_seed),
            ),
        };

        log::info!(
            "task '{}' ready: {} features, {} background samples, horizon {:?}",
            config.name,
            schema.len(),
            background.len(),
            config.horizon
        );

        Ok(RiskEngine {
            name: config.name,
            schema,
            model,
            background,
            horizon: config.horizon,
            cutoffs,
            strategy,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Runs the full pipeline for one request: validate and order the named
    /// inputs, standardize, infer risk at the task's horizon, classify the
    /// tier, attribute the prediction, and assemble the result. Any failure
    /// in an earlier step aborts the whole pipeline.
    pub fn evaluate(&self, named: &[(String, f64)]) -> Result<RiskResult, EngineError> {
        let raw = self.schema.vector_from_named(named)?;
        let scaled = standardize(&raw, &self.schema);

        let risk = match self.horizon {
            Some(h) => self.model.survival_curve(scaled.values())?.risk_at(h),
            None => self.model.predict(scaled.values())?,
        };
        if !(0.0..=1.0).contains(&risk) {
            return Err(EngineError::RiskOutOfRange(risk));
        }
        let tier = classify(risk, self.cutoffs);

        // Attributions are computed in the model's native input space, then
        // paired with raw values for display.
        let explanation =
            self.strategy
                .explain(scaled.values(), self.model.as_ref(), &self.background)?;
        let mut attributions: Vec<Attribution> = self
            .schema
            .specs()
            .iter()
            .enumerate()
            .map(|(i, spec)| Attribution {
                feature: spec.name.clone(),
                input_value: raw.values()[i],
                contribution: explanation.contributions[i],
            })
            .collect();
        attributions.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));

        log::debug!(
            "task '{}': risk {:.4}, tier {:?}, base {:.4}",
            self.name,
            risk,
            tier,
            explanation.base_value
        );

        Ok(RiskResult {
            risk_probability: risk,
            survival_probability: 1.0 - risk,
            tier,
            base_value: explanation.base_value,
            attributions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn config() -> TaskConfig {
        TaskConfig {
            name: "all_cause".into(),
            features: vec![
                FeatureSpec::continuous("Age", 54.0, 11.0),
                FeatureSpec::categorical("Gender"),
            ],
            horizon: Some(240.0),
            cutoffs: TierCutoffs { low: 0.12, high: 0.24 },
            strategy: StrategyChoice::Auto,
            max_model_evals: 1024,
            sampling_seed: 42,
        }
    }

    #[test]
    fn task_config_round_trips_through_toml() {
        let config = config();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: TaskConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.name, "all_cause");
        assert_eq!(back.features.len(), 2);
        assert_eq!(back.horizon, Some(240.0));
        assert_eq!(back.strategy, StrategyChoice::Auto);
    }

    #[test]
    fn omitted_optional_fields_take_defaults() {
        let text = r#"
            name = "cardio"
            horizon = 240.0

            [[features]]
            name = "Age"
            categorical = false
            mean = 54.0
            std_dev = 11.0

            [cutoffs]
            low = 0.12
            high = 0.24
        "#;
        let config: TaskConfig = toml::from_str(text).unwrap();
        assert_eq!(config.strategy, StrategyChoice::Auto);
        assert_eq!(config.max_model_evals, 1024);
        assert_eq!(config.sampling_seed, 42);
    }

    struct Opaque;
    impl PredictiveModel for Opaque {
        fn predict(&self, _x: ndarray::ArrayView1<f64>) -> Result<f64, ModelError> {
            Ok(0.5)
        }
        fn num_features(&self) -> usize {
            2
        }
    }

    #[test]
    fn construction_rejects_background_width_mismatch() {
        let background = BackgroundDataset::new(Array2::zeros((3, 5))).unwrap();
        let err = RiskEngine::new(config(), Arc::new(Opaque), background).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Background(BackgroundError::WidthMismatch {
                found: 5,
                expected: 2
            })
        ));
    }

    #[test]
    fn construction_rejects_tree_strategy_on_opaque_model() {
        let mut config = config();
        config.strategy = StrategyChoice::TreeExact;
        let background = BackgroundDataset::new(Array2::zeros((3, 2))).unwrap();
        let err = RiskEngine::new(config, Arc::new(Opaque), background).unwrap_err();
        assert!(matches!(err, EngineError::TreeStrategyUnavailable { .. }));
    }

    #[test]
    fn construction_rejects_non_finite_horizon() {
        let mut config = config();
        config.horizon = Some(f64::NAN);
        let background = BackgroundDataset::new(Array2::zeros((3, 2))).unwrap();
        let err = RiskEngine::new(config, Arc::new(Opaque), background).unwrap_err();
        assert!(matches!(err, EngineError::InvalidHorizon(_)));
    }
}
