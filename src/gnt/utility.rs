use ndarray::{Array1, Array2, Axis};
use rand::Rng;

use super::Gnt;
use crate::config::UtilMetric;
use crate::error::{GntErr, Result};
use crate::net::FeedForwardNet;

const GRAD_EPSILON: f32 = 1e-8;

fn col_mean(batch: &Array2<f32>) -> Result<Array1<f32>> {
    batch
        .mean_axis(Axis(0))
        .ok_or(GntErr::InvalidInput("empty activation batch"))
}

fn col_mean_abs(batch: &Array2<f32>) -> Result<Array1<f32>> {
    col_mean(&batch.mapv(f32::abs))
}

impl Gnt {
    /// Updates one layer's running utility, mean activation and
    /// bias-corrected utility in place from the layer's activation batch.
    ///
    /// Every unit's statistics are recomputed on every call, independent of
    /// whether anything is later selected. Ages must have been advanced
    /// beforehand so the bias correction `1 - decay^age` is nonzero.
    pub fn update_utility(
        &mut self,
        net: &FeedForwardNet,
        layer_idx: usize,
        features: &Array2<f32>,
    ) -> Result<()> {
        let decay = self.cfg.decay_rate;

        self.util[layer_idx] *= decay;
        let bias_correction = self.ages[layer_idx].mapv(|age| 1. - decay.powf(age));

        let f_mean = col_mean(features)?;
        self.mean_feature_act[layer_idx] *= decay;
        self.mean_feature_act[layer_idx] -= &(-(1. - decay) * &f_mean);
        let bias_corrected_act = &self.mean_feature_act[layer_idx] / &bias_correction;

        let current = net.layer(layer_idx);
        let next = net.layer(layer_idx + 1);
        // Outgoing magnitude per unit: mean |w| over the next layer's rows.
        let output_weight_mag = col_mean(&next.weights().mapv(f32::abs))?;
        let input_weight_mag = current
            .weights()
            .mapv(f32::abs)
            .mean_axis(Axis(1))
            .ok_or(GntErr::InvalidInput("layer has no incoming weights"))?;

        let width = self.util[layer_idx].len();
        let new_util: Array1<f32> = match self.cfg.util_metric {
            UtilMetric::Weight => output_weight_mag,
            UtilMetric::Contribution => output_weight_mag * col_mean_abs(features)?,
            UtilMetric::Adaptation => input_weight_mag.mapv(|m| 1. / m),
            UtilMetric::ZeroContribution => {
                let deviation = (features - &bias_corrected_act).mapv(f32::abs);
                output_weight_mag * col_mean(&deviation)?
            }
            UtilMetric::AdaptableContribution => {
                let deviation = (features - &bias_corrected_act).mapv(f32::abs);
                output_weight_mag * col_mean(&deviation)? / input_weight_mag
            }
            UtilMetric::FeatureByInput => {
                let deviation = (features - &bias_corrected_act).mapv(f32::abs);
                col_mean(&deviation)? / input_weight_mag
            }
            UtilMetric::Gradient => {
                // Whole-parameter gradient sum, broadcast to every unit; a
                // coarse signal, kept as such. Zero when no gradient is held.
                let g = net.grad_stats(layer_idx).map(|(sum, _)| sum).unwrap_or(0.);
                Array1::from_elem(width, g)
            }
            UtilMetric::AbsGradient => match net.grad_stats(layer_idx) {
                Some((_, grad_dot_param)) => {
                    let denom = col_mean_abs(features)? + GRAD_EPSILON;
                    denom.mapv(|d| grad_dot_param.abs() / d)
                }
                None => Array1::zeros(width),
            },
            UtilMetric::Output => f_mean.clone(),
            UtilMetric::Random => Array1::zeros(width),
        };

        self.util[layer_idx].scaled_add(1. - decay, &new_util);
        self.bias_corrected_util[layer_idx] = &self.util[layer_idx] / &bias_correction;

        if self.cfg.util_metric == UtilMetric::Random {
            // Fresh noise every invocation, bypassing the running estimate.
            let noise = Array1::from_shape_fn(width, |_| self.rng.random::<f32>());
            self.bias_corrected_util[layer_idx] = noise;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::activation::ActFn;
    use crate::config::GntConfig;

    fn tracked(metric: UtilMetric) -> (FeedForwardNet, Gnt) {
        let net = FeedForwardNet::new(&[3, 4, 2], ActFn::Relu, Some(13)).unwrap();
        let cfg = GntConfig {
            util_metric: metric,
            seed: Some(13),
            ..Default::default()
        };
        let gnt = Gnt::new(&net, cfg).unwrap();
        (net, gnt)
    }

    #[test]
    fn test_bias_correction_in_unit_interval() {
        let (net, mut gnt) = tracked(UtilMetric::Contribution);
        let features = Array2::<f32>::ones((5, 4));

        for step in 1..=50 {
            gnt.ages[0] += 1.;
            gnt.update_utility(&net, 0, &features).unwrap();

            let bc = 1. - gnt.cfg.decay_rate.powf(step as f32);
            assert!(bc > 0. && bc <= 1.);
            assert!(gnt.bias_corrected_utility(0).iter().all(|u| u.is_finite()));
        }
    }

    #[test]
    fn test_mean_activation_tracks_batch_mean() {
        let (net, mut gnt) = tracked(UtilMetric::Contribution);
        let features = Array2::<f32>::from_elem((8, 4), 2.0);

        for _ in 0..1000 {
            gnt.ages[0] += 1.;
            gnt.update_utility(&net, 0, &features).unwrap();
        }

        // Long-run decayed mean of a constant signal converges to it.
        assert!(gnt.mean_activation(0).iter().all(|m| (m - 2.0).abs() < 1e-2));
    }

    #[test]
    fn test_gradient_metric_without_gradient_is_zero() {
        let (net, mut gnt) = tracked(UtilMetric::Gradient);
        let features = Array2::<f32>::ones((5, 4));

        gnt.ages[0] += 1.;
        gnt.update_utility(&net, 0, &features).unwrap();

        assert!(gnt.utility(0).iter().all(|&u| u == 0.));
    }

    #[test]
    fn test_random_metric_regenerates_noise() {
        let (net, mut gnt) = tracked(UtilMetric::Random);
        let features = Array2::<f32>::ones((5, 4));

        gnt.ages[0] += 1.;
        gnt.update_utility(&net, 0, &features).unwrap();
        let first = gnt.bias_corrected_utility(0).to_owned();

        gnt.ages[0] += 1.;
        gnt.update_utility(&net, 0, &features).unwrap();
        let second = gnt.bias_corrected_utility(0).to_owned();

        assert_ne!(first, second);
        assert!(first.iter().all(|&u| (0. ..1.).contains(&u)));
    }

    #[test]
    fn test_weight_metric_uses_outgoing_magnitude() {
        let (mut net, mut gnt) = tracked(UtilMetric::Weight);
        net.layer_mut(1).weights.fill(0.5);
        let features = Array2::<f32>::ones((5, 4));

        gnt.ages[0] += 1.;
        gnt.update_utility(&net, 0, &features).unwrap();

        // util = (1 - decay) * 0.5, bias correction (1 - decay) cancels.
        assert!(gnt
            .bias_corrected_utility(0)
            .iter()
            .all(|&u| (u - 0.5).abs() < 1e-6));
    }
}
