use ndarray::{Array1, Array2, Zip};

use super::Optimizer;
use crate::error::{GntErr, Result};
use crate::net::FeedForwardNet;

/// First moment, second moment and step count for one layer's parameters,
/// shaped like the parameters themselves.
///
/// Step counts are per element rather than global so a reinitialized unit
/// restarts its bias correction from zero.
#[derive(Debug, Clone)]
pub struct ParamMoments {
    pub exp_avg_w: Array2<f32>,
    pub exp_avg_sq_w: Array2<f32>,
    pub step_w: Array2<f32>,
    pub exp_avg_b: Array1<f32>,
    pub exp_avg_sq_b: Array1<f32>,
    pub step_b: Array1<f32>,
}

impl ParamMoments {
    fn zeros(out_features: usize, in_features: usize) -> Self {
        Self {
            exp_avg_w: Array2::zeros((out_features, in_features)),
            exp_avg_sq_w: Array2::zeros((out_features, in_features)),
            step_w: Array2::zeros((out_features, in_features)),
            exp_avg_b: Array1::zeros(out_features),
            exp_avg_sq_b: Array1::zeros(out_features),
            step_b: Array1::zeros(out_features),
        }
    }
}

/// Adam optimizer with per-element step counts.
#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    moments: Vec<ParamMoments>,
}

impl Adam {
    /// Creates a new `Adam` optimizer sized for the given network.
    ///
    /// # Arguments
    /// * `net` - The network whose parameters this instance will update.
    /// * `learning_rate` - The small coefficient that modulates the amount of
    ///   training per update.
    /// * `beta1`, `beta2`, `epsilon` - Hyperparameters to the optimization
    ///   algorithm.
    ///
    /// # Returns
    /// A new `Adam` instance.
    pub fn new(
        net: &FeedForwardNet,
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    ) -> Self {
        let moments = (0..=net.num_hidden_layers())
            .map(|idx| {
                let layer = net.layer(idx);
                ParamMoments::zeros(layer.out_features(), layer.in_features())
            })
            .collect();

        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            moments,
        }
    }

    /// Creates a new `Adam` with the usual hyperparameter defaults.
    pub fn with_defaults(net: &FeedForwardNet, learning_rate: f32) -> Self {
        Self::new(net, learning_rate, 0.9, 0.999, 1e-8)
    }
}

fn adam_update(p: &mut f32, g: f32, v: &mut f32, s: &mut f32, t: &mut f32, hp: (f32, f32, f32, f32)) {
    let (lr, b1, b2, eps) = hp;

    *t += 1.;
    *v = b1 * *v + (1. - b1) * g;
    *s = b2 * *s + (1. - b2) * g.powi(2);

    let bc1 = 1. - b1.powf(*t);
    let bc2 = 1. - b2.powf(*t);
    let step_size = lr * bc2.sqrt() / bc1;

    *p -= step_size * *v / (s.sqrt() + eps);
}

impl Optimizer for Adam {
    fn step(&mut self, net: &mut FeedForwardNet) -> Result<()> {
        let hp = (self.learning_rate, self.beta1, self.beta2, self.epsilon);

        for (layer, m) in net.layers_mut().iter_mut().zip(&mut self.moments) {
            let gw = layer
                .grad_weights
                .as_ref()
                .ok_or(GntErr::InvalidInput("missing gradients; run backward first"))?;
            let gb = layer
                .grad_biases
                .as_ref()
                .ok_or(GntErr::InvalidInput("missing gradients; run backward first"))?;

            Zip::from(&mut layer.weights)
                .and(gw)
                .and(&mut m.exp_avg_w)
                .and(&mut m.exp_avg_sq_w)
                .and(&mut m.step_w)
                .for_each(|p, &g, v, s, t| adam_update(p, g, v, s, t, hp));

            Zip::from(&mut layer.biases)
                .and(gb)
                .and(&mut m.exp_avg_b)
                .and(&mut m.exp_avg_sq_b)
                .and(&mut m.step_b)
                .for_each(|p, &g, v, s, t| adam_update(p, g, v, s, t, hp));
        }

        Ok(())
    }

    fn moment_state_mut(&mut self) -> Option<&mut [ParamMoments]> {
        Some(&mut self.moments)
    }
}
