use serde::Deserialize;

use crate::error::{GntErr, Result};

/// Scope of the replacement selection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementStrategy {
    /// Units are ranked and counted independently per hidden layer.
    Layerwise,
    /// Eligible units from all hidden layers are pooled into one ranking.
    ///
    /// Selects nothing when `pinned_layer` is set.
    Networkwise,
}

/// Scheme used to compute the uniform bound for regenerated weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitKind {
    Default,
    Xavier,
    Lecun,
    Kaiming,
}

/// Statistic driving the per-unit utility estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilMetric {
    /// Mean absolute outgoing weight.
    Weight,
    /// Outgoing weight magnitude times mean absolute activation.
    Contribution,
    /// Inverse mean absolute incoming weight.
    Adaptation,
    /// Contribution measured as deviation from the bias-corrected mean activation.
    ZeroContribution,
    /// Deviation-based contribution normalized by incoming weight magnitude.
    AdaptableContribution,
    /// Deviation from the mean activation normalized by the same layer's incoming weights.
    FeatureByInput,
    /// Sum of the layer parameter's gradient; zero when no gradient is held.
    Gradient,
    /// |grad . param| scaled by inverse mean absolute activation; shrink/grow replacement.
    AbsGradient,
    /// Plain mean activation; coefficient-scaling replacement.
    Output,
    /// Fresh uniform noise every invocation, bypassing the running estimate.
    Random,
}

/// Constructor-time configuration, immutable for the run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GntConfig {
    pub decay_rate: f32,
    /// Replacement rate for the low-utility criterion.
    pub replacement_rate: f32,
    /// Replacement rate for the high-utility criterion.
    pub high_replacement_rate: f32,
    pub strategy: ReplacementStrategy,
    /// Restrict replacement to a single hidden layer; `None` means all layers.
    pub pinned_layer: Option<usize>,
    pub init: InitKind,
    /// Minimum age (steps since last reinit) before a unit is eligible.
    pub maturity_threshold: u32,
    pub util_metric: UtilMetric,
    /// Carry fractional replacement credit across steps instead of Bernoulli promotion.
    pub accumulate: bool,
    /// Scale for high-utility units under the `Output` metric.
    pub big_coef: f32,
    /// Scale for low-utility units under the `Output` metric.
    pub small_coef: f32,
    /// Fixed seed for reproducible selection and regeneration.
    pub seed: Option<u64>,
}

impl Default for GntConfig {
    fn default() -> Self {
        Self {
            decay_rate: 0.99,
            replacement_rate: 1e-4,
            high_replacement_rate: 0.,
            strategy: ReplacementStrategy::Layerwise,
            pinned_layer: None,
            init: InitKind::Kaiming,
            maturity_threshold: 20,
            util_metric: UtilMetric::Contribution,
            accumulate: false,
            big_coef: 1.,
            small_coef: 1.,
            seed: None,
        }
    }
}

impl GntConfig {
    /// Checks that every field is inside its valid range.
    ///
    /// # Returns
    /// `Ok(())` or an `InvalidConfig` error naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if !(self.decay_rate > 0. && self.decay_rate < 1.) {
            return Err(GntErr::InvalidConfig("decay_rate must be in (0, 1)"));
        }
        if !(self.replacement_rate >= 0. && self.replacement_rate.is_finite()) {
            return Err(GntErr::InvalidConfig("replacement_rate must be >= 0"));
        }
        if !(self.high_replacement_rate >= 0. && self.high_replacement_rate.is_finite()) {
            return Err(GntErr::InvalidConfig("high_replacement_rate must be >= 0"));
        }
        if !self.big_coef.is_finite() || !self.small_coef.is_finite() {
            return Err(GntErr::InvalidConfig("coefficients must be finite"));
        }
        Ok(())
    }
}
