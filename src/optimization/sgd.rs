use super::Optimizer;
use crate::error::{GntErr, Result};
use crate::net::FeedForwardNet;

/// Plain stochastic gradient descent. Holds no per-parameter state.
#[derive(Debug)]
pub struct Sgd {
    learning_rate: f32,
}

impl Sgd {
    /// Creates a new `Sgd`.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of
    ///   training per update.
    ///
    /// # Returns
    /// A new `Sgd` instance.
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, net: &mut FeedForwardNet) -> Result<()> {
        let lr = self.learning_rate;

        for layer in net.layers_mut() {
            let gw = layer
                .grad_weights
                .as_ref()
                .ok_or(GntErr::InvalidInput("missing gradients; run backward first"))?;
            let gb = layer
                .grad_biases
                .as_ref()
                .ok_or(GntErr::InvalidInput("missing gradients; run backward first"))?;

            layer.weights.scaled_add(-lr, gw);
            layer.biases.scaled_add(-lr, gb);
        }

        Ok(())
    }
}
