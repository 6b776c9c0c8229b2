//! Ordinal risk tiers from fixed probability cutoffs.
//!
//! Cutoffs are pre-derived externally (e.g. from a Youden-index analysis of
//! the training cohort) and arrive through task configuration; no statistical
//! estimation happens here. Boundary values belong to the tier above
//! (closed-open intervals).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ordinal classification of a continuous risk probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

#[derive(Error, Debug)]
pub enum TierError {
    #[error(
        "tier cutoffs must satisfy 0 <= low < high <= 1, got low={low}, high={high}"
    )]
    InvalidCutoffs { low: f64, high: f64 },
}

/// The two fixed cutoffs splitting [0, 1] into three tiers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierCutoffs {
    pub low: f64,
    pub high: f64,
}

impl TierCutoffs {
    pub fn new(low: f64, high: f64) -> Result<Self, TierError> {
        if !low.is_finite() || !high.is_finite() || !(0.0..=1.0).contains(&low) || high > 1.0 || low >= high {
            return Err(TierError::InvalidCutoffs { low, high });
        }
        Ok(TierCutoffs { low, high })
    }
}

/// `risk < low -> Low`; `low <= risk < high -> Medium`; `risk >= high -> High`.
pub fn classify(risk: f64, cutoffs: TierCutoffs) -> RiskTier {
    if risk < cutoffs.low {
        RiskTier::Low
    } else if risk < cutoffs.high {
        RiskTier::Medium
    } else {
        RiskTier::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_values_belong_to_the_tier_above() {
        let cutoffs = TierCutoffs::new(0.12, 0.24).unwrap();
        assert_eq!(classify(0.11999, cutoffs), RiskTier::Low);
        assert_eq!(classify(0.12, cutoffs), RiskTier::Medium);
        assert_eq!(classify(0.23999, cutoffs), RiskTier::Medium);
        assert_eq!(classify(0.24, cutoffs), RiskTier::High);
    }

    #[test]
    fn rejects_inverted_or_out_of_range_cutoffs() {
        assert!(TierCutoffs::new(0.5, 0.3).is_err());
        assert!(TierCutoffs::new(-0.1, 0.3).is_err());
        assert!(TierCutoffs::new(0.2, 1.5).is_err());
        assert!(TierCutoffs::new(f64::NAN, 0.5).is_err());
    }
}
