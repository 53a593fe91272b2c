mod regen;
mod reset;
mod selector;
mod utility;

pub use selector::Criterion;

use ndarray::{Array1, Array2, ArrayView1};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::Uniform;

use crate::config::{GntConfig, InitKind};
use crate::error::{GntErr, Result};
use crate::net::FeedForwardNet;
use crate::optimization::Optimizer;

/// Generate-and-Test: tracks the utility of every hidden unit and
/// periodically reinitializes mature, low-utility units (and optionally
/// reinforces high-utility ones) to preserve plasticity during online
/// training.
///
/// The tracker state is sized once from the network at construction and
/// never resized. Each call to [`gen_and_test`](Self::gen_and_test) takes an
/// exclusive borrow of the network and optimizer; no other component may
/// touch their weight or moment storage during the call.
pub struct Gnt {
    cfg: GntConfig,
    num_hidden_layers: usize,

    // Per hidden layer, one entry per unit.
    util: Vec<Array1<f32>>,
    bias_corrected_util: Vec<Array1<f32>>,
    ages: Vec<Array1<f32>>,
    mean_feature_act: Vec<Array1<f32>>,

    // Fractional replacement credit, [low, high] per layer and globally.
    accumulated: Vec<[f32; 2]>,
    accumulated_total: [f32; 2],

    bounds: Vec<f32>,
    dists: Vec<Uniform<f32>>,

    rng: StdRng,
}

impl Gnt {
    /// Creates a new `Gnt` sized for the given network.
    ///
    /// # Arguments
    /// * `net` - The network whose hidden units will be tracked.
    /// * `cfg` - Constructor-time configuration, immutable for the run.
    ///
    /// # Returns
    /// A new `Gnt` instance, or an error if the configuration is invalid.
    pub fn new(net: &FeedForwardNet, cfg: GntConfig) -> Result<Self> {
        cfg.validate()?;

        let n = net.num_hidden_layers();
        let widths: Vec<usize> = (0..n).map(|i| net.layer(i).out_features()).collect();

        let bounds = compute_bounds(net, cfg.init);
        let dists = bounds[..n]
            .iter()
            .map(|&b| {
                Uniform::new(-b, b)
                    .map_err(|_| GntErr::InvalidConfig("reinit bound must be positive"))
            })
            .collect::<Result<Vec<_>>>()?;

        let rng = match cfg.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            cfg,
            num_hidden_layers: n,
            util: widths.iter().map(|&w| Array1::zeros(w)).collect(),
            bias_corrected_util: widths.iter().map(|&w| Array1::zeros(w)).collect(),
            ages: widths.iter().map(|&w| Array1::zeros(w)).collect(),
            mean_feature_act: widths.iter().map(|&w| Array1::zeros(w)).collect(),
            accumulated: vec![[0.; 2]; n],
            accumulated_total: [0.; 2],
            bounds,
            dists,
            rng,
        })
    }

    /// Runs one generate-and-test cycle: a low-utility replacement pass
    /// followed by an independent high-utility pass, each selecting units,
    /// regenerating their weights and invalidating the matching optimizer
    /// state.
    ///
    /// # Arguments
    /// * `net` - The network, mutated in place.
    /// * `opt` - The optimizer whose moment state (if any) is invalidated for
    ///   regenerated units.
    /// * `features` - One post-activation batch per hidden layer, in forward
    ///   order.
    ///
    /// # Returns
    /// An error if `features` does not match the network's hidden layers;
    /// nothing is mutated in that case.
    pub fn gen_and_test<O: Optimizer>(
        &mut self,
        net: &mut FeedForwardNet,
        opt: &mut O,
        features: &[Array2<f32>],
    ) -> Result<()> {
        self.validate_features(net, features)?;

        for criterion in [Criterion::Low, Criterion::High] {
            let (selected, counts) = self.select_features(net, features, criterion)?;
            self.regenerate(net, &selected, &counts, criterion)?;
            self.reset_optimizer(opt, &selected, &counts)?;
        }

        Ok(())
    }

    /// Steps since last reinitialization, one entry per unit.
    pub fn ages(&self, layer: usize) -> ArrayView1<'_, f32> {
        self.ages[layer].view()
    }

    /// The decayed running utility estimate, one entry per unit.
    pub fn utility(&self, layer: usize) -> ArrayView1<'_, f32> {
        self.util[layer].view()
    }

    /// The utility estimate adjusted for decay startup bias.
    pub fn bias_corrected_utility(&self, layer: usize) -> ArrayView1<'_, f32> {
        self.bias_corrected_util[layer].view()
    }

    /// The decayed running mean of each unit's output.
    pub fn mean_activation(&self, layer: usize) -> ArrayView1<'_, f32> {
        self.mean_feature_act[layer].view()
    }

    /// The uniform reinitialization bound per hidden layer, with a final
    /// entry for the output layer.
    pub fn bounds(&self) -> &[f32] {
        &self.bounds
    }

    /// Layers excluded by the single-layer pin do not participate at all.
    fn layer_excluded(&self, layer_idx: usize) -> bool {
        match self.cfg.pinned_layer {
            Some(pinned) => layer_idx != pinned,
            None => false,
        }
    }

    fn validate_features(&self, net: &FeedForwardNet, features: &[Array2<f32>]) -> Result<()> {
        if features.len() != self.num_hidden_layers {
            return Err(GntErr::ShapeMismatch {
                what: "activations",
                got: features.len(),
                expected: self.num_hidden_layers,
            });
        }

        for (idx, batch) in features.iter().enumerate() {
            let expected = net.layer(idx).out_features();
            if batch.ncols() != expected {
                return Err(GntErr::ShapeMismatch {
                    what: "activation batch width",
                    got: batch.ncols(),
                    expected,
                });
            }
            if batch.nrows() == 0 {
                return Err(GntErr::InvalidInput("empty activation batch"));
            }
        }

        Ok(())
    }
}

/// Uniform bound for freshly drawn incoming weights, per hidden layer, plus
/// the output layer's bound.
///
/// Self-normalizing activations force the lecun scheme regardless of `init`.
fn compute_bounds(net: &FeedForwardNet, init: InitKind) -> Vec<f32> {
    let act = net.activation();
    let init = if act.is_self_normalizing() {
        InitKind::Lecun
    } else {
        init
    };

    let n = net.num_hidden_layers();
    let mut bounds: Vec<f32> = (0..n)
        .map(|i| {
            let fan_in = net.layer(i).in_features() as f32;
            let fan_out = net.layer(i).out_features() as f32;
            match init {
                InitKind::Default => (1. / fan_in).sqrt(),
                InitKind::Xavier => act.gain() * (6. / (fan_in + fan_out)).sqrt(),
                InitKind::Lecun => (3. / fan_in).sqrt(),
                InitKind::Kaiming => act.gain() * (3. / fan_in).sqrt(),
            }
        })
        .collect();

    bounds.push((3. / net.layer(n).in_features() as f32).sqrt());
    bounds
}
