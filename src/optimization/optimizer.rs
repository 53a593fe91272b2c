use crate::error::Result;
use crate::net::FeedForwardNet;

use super::ParamMoments;

/// Defines the strategy for updating network parameters from stored gradients.
pub trait Optimizer {
    /// Applies one update step using the gradients held by the network.
    ///
    /// # Arguments
    /// * `net` - The network whose parameters are updated in place.
    ///
    /// # Returns
    /// An error if the network holds no gradients.
    fn step(&mut self, net: &mut FeedForwardNet) -> Result<()>;

    /// Per-layer moment state, exposed only by adaptive optimizers.
    ///
    /// Callers that reinitialize units use this to invalidate the momentum
    /// of the affected parameters; plain gradient descent has none.
    fn moment_state_mut(&mut self) -> Option<&mut [ParamMoments]> {
        None
    }
}
