use log::debug;
use ndarray::Array1;
use rand::Rng;

use super::{Criterion, Gnt};
use crate::config::UtilMetric;
use crate::error::{GntErr, Result};
use crate::net::FeedForwardNet;

impl Gnt {
    /// Overwrites the selected units' weights in place.
    ///
    /// The effect depends on the configured utility metric: `AbsGradient`
    /// shrinks or grows the incoming weights, `Output` rescales them by the
    /// configured coefficients, and every other metric redraws the incoming
    /// row uniformly within the layer bound, compensates the downstream bias
    /// for the lost contribution and zeroes the outgoing column. Ages of
    /// selected units reset to zero in every mode.
    ///
    /// # Arguments
    /// * `net` - The network, mutated in place.
    /// * `selected` - Unit indices per hidden layer, as returned by
    ///   [`select_features`](Self::select_features).
    /// * `counts` - Number of selected units per hidden layer.
    /// * `criterion` - Which selection pass these units came from.
    pub fn regenerate(
        &mut self,
        net: &mut FeedForwardNet,
        selected: &[Vec<usize>],
        counts: &[usize],
        criterion: Criterion,
    ) -> Result<()> {
        if selected.len() != self.num_hidden_layers || counts.len() != self.num_hidden_layers {
            return Err(GntErr::ShapeMismatch {
                what: "selection",
                got: selected.len(),
                expected: self.num_hidden_layers,
            });
        }

        let decay = self.cfg.decay_rate;

        for i in 0..self.num_hidden_layers {
            if counts[i] == 0 {
                continue;
            }
            let (current, next) = net.layer_pair_mut(i);

            match self.cfg.util_metric {
                UtilMetric::AbsGradient => {
                    let scale = match criterion {
                        Criterion::High => 0.8,
                        Criterion::Low => 1.2,
                    };
                    for &u in &selected[i] {
                        current.weights.row_mut(u).mapv_inplace(|w| w * scale);
                        current.biases[u] *= scale;
                    }
                    current.weights.mapv_inplace(|w| w.clamp(-2., 2.));
                    current.biases.mapv_inplace(|b| b.clamp(-2., 2.));
                }
                UtilMetric::Output => {
                    let coef = match criterion {
                        Criterion::High => self.cfg.big_coef,
                        Criterion::Low => self.cfg.small_coef,
                    };
                    for &u in &selected[i] {
                        current.weights.row_mut(u).mapv_inplace(|w| w * coef);
                        current.biases[u] *= coef;
                    }
                    current.weights.mapv_inplace(|w| w.clamp(-5., 5.));
                    current.biases.mapv_inplace(|b| b.clamp(-10., 10.));
                }
                _ => {
                    let dist = self.dists[i];
                    for &u in &selected[i] {
                        let fresh = Array1::from_shape_fn(current.in_features(), |_| {
                            self.rng.sample(dist)
                        });
                        current.weights.row_mut(u).assign(&fresh);
                        current.biases[u] = 0.;
                    }

                    // Fold each removed unit's expected contribution into the
                    // downstream bias, then cut the outgoing column.
                    for &u in &selected[i] {
                        let correction = self.mean_feature_act[i][u]
                            / (1. - decay.powf(self.ages[i][u]));
                        let outgoing = next.weights.column(u).to_owned();
                        next.biases.scaled_add(correction, &outgoing);
                    }
                    for &u in &selected[i] {
                        next.weights.column_mut(u).fill(0.);
                    }
                }
            }

            for &u in &selected[i] {
                self.ages[i][u] = 0.;
            }
            debug!(
                "criterion {criterion}: regenerated {} unit(s) in layer {i}",
                counts[i]
            );
        }

        Ok(())
    }
}
