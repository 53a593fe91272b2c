use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_rand::RandomExt;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::Uniform;

use crate::activation::ActFn;
use crate::error::{GntErr, Result};

/// One hidden linear transformation: `out_features` rows of incoming weights
/// plus a bias vector. Gradients are written by [`FeedForwardNet::backward`].
pub struct DenseLayer {
    pub(crate) in_features: usize,
    pub(crate) out_features: usize,
    // Shape: out x in.
    pub(crate) weights: Array2<f32>,
    pub(crate) biases: Array1<f32>,
    pub(crate) grad_weights: Option<Array2<f32>>,
    pub(crate) grad_biases: Option<Array1<f32>>,
}

impl DenseLayer {
    fn new(in_features: usize, out_features: usize, bound: f32, rng: &mut StdRng) -> Result<Self> {
        let dist = Uniform::new(-bound, bound)
            .map_err(|_| GntErr::InvalidConfig("weight init bound must be positive"))?;
        let weights = Array2::random_using((out_features, in_features), dist, rng);

        Ok(Self {
            in_features,
            out_features,
            weights,
            biases: Array1::zeros(out_features),
            grad_weights: None,
            grad_biases: None,
        })
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    pub fn weights(&self) -> ArrayView2<'_, f32> {
        self.weights.view()
    }

    pub fn biases(&self) -> ArrayView1<'_, f32> {
        self.biases.view()
    }
}

/// A fully-connected network of alternating linear and activation layers.
///
/// Hidden layers apply the configured activation; the output layer is linear.
/// Forward passes cache the per-layer weighted sums and hidden activation
/// batches, which [`backward`](Self::backward) and the generate-and-test core
/// consume.
pub struct FeedForwardNet {
    layers: Vec<DenseLayer>,
    act: ActFn,
    input: Array2<f32>,
    weighted_sums: Vec<Array2<f32>>,
    activations: Vec<Array2<f32>>,
}

impl FeedForwardNet {
    /// Creates a new network with kaiming-uniform weights and zero biases.
    ///
    /// # Arguments
    /// * `dims` - Layer widths, input first; needs at least one hidden layer.
    /// * `act` - Activation applied after each hidden linear layer.
    /// * `seed` - Fixed seed for reproducible initialization.
    ///
    /// # Returns
    /// A new `FeedForwardNet` or an error if `dims` is too short.
    pub fn new(dims: &[usize], act: ActFn, seed: Option<u64>) -> Result<Self> {
        if dims.len() < 3 {
            return Err(GntErr::InvalidInput(
                "network needs at least one hidden layer",
            ));
        }
        if dims.iter().any(|&d| d == 0) {
            return Err(GntErr::InvalidInput("layer widths must be nonzero"));
        }

        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };

        let n_layers = dims.len() - 1;
        let mut layers = Vec::with_capacity(n_layers);
        for idx in 0..n_layers {
            // Output layer stays linear, so no gain there.
            let gain = if idx + 1 < n_layers { act.gain() } else { 1. };
            let bound = gain * (3. / dims[idx] as f32).sqrt();
            layers.push(DenseLayer::new(dims[idx], dims[idx + 1], bound, &mut rng)?);
        }

        Ok(Self {
            layers,
            act,
            input: Array2::zeros((0, 0)),
            weighted_sums: Vec::new(),
            activations: Vec::new(),
        })
    }

    pub fn num_hidden_layers(&self) -> usize {
        self.layers.len() - 1
    }

    pub fn activation(&self) -> ActFn {
        self.act
    }

    pub fn layer(&self, idx: usize) -> &DenseLayer {
        &self.layers[idx]
    }

    pub fn layer_mut(&mut self, idx: usize) -> &mut DenseLayer {
        &mut self.layers[idx]
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [DenseLayer] {
        &mut self.layers
    }

    /// Simultaneous mutable access to hidden layer `idx` and its downstream
    /// layer, for bias compensation and outgoing-weight edits.
    pub(crate) fn layer_pair_mut(&mut self, idx: usize) -> (&mut DenseLayer, &mut DenseLayer) {
        let (head, tail) = self.layers.split_at_mut(idx + 1);
        (&mut head[idx], &mut tail[0])
    }

    /// Makes a forward pass, caching weighted sums and hidden activations.
    ///
    /// # Arguments
    /// * `x` - Input batch, one sample per row.
    ///
    /// # Returns
    /// The output batch, or a shape error if `x` does not match the input width.
    pub fn forward(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.layers[0].in_features {
            return Err(GntErr::ShapeMismatch {
                what: "input",
                got: x.ncols(),
                expected: self.layers[0].in_features,
            });
        }

        self.input = x.to_owned();
        self.weighted_sums.clear();
        self.activations.clear();

        let n_layers = self.layers.len();
        let mut a = x.to_owned();
        for (idx, layer) in self.layers.iter().enumerate() {
            let z = a.dot(&layer.weights.t()) + &layer.biases;
            self.weighted_sums.push(z.clone());

            if idx + 1 < n_layers {
                a = z.mapv(|v| self.act.f(v));
                self.activations.push(a.clone());
            } else {
                a = z;
            }
        }

        Ok(a)
    }

    /// The cached post-activation batches of the hidden layers, one per layer,
    /// in forward order. Empty before the first forward pass.
    pub fn hidden_activations(&self) -> &[Array2<f32>] {
        &self.activations
    }

    /// Backpropagates the mean-squared-error loss of the last forward pass,
    /// storing per-layer gradients.
    ///
    /// # Arguments
    /// * `y` - Target batch matching the cached forward output shape.
    ///
    /// # Returns
    /// The batch loss, or an error if no forward pass is cached or shapes differ.
    pub fn backward(&mut self, y: ArrayView2<f32>) -> Result<f32> {
        let n_layers = self.layers.len();
        if self.weighted_sums.len() != n_layers {
            return Err(GntErr::InvalidInput("backward requires a forward pass first"));
        }

        let out = &self.weighted_sums[n_layers - 1];
        if out.dim() != y.dim() {
            return Err(GntErr::ShapeMismatch {
                what: "targets",
                got: y.ncols(),
                expected: out.ncols(),
            });
        }

        let diff = out - &y;
        let loss = diff.mapv(|v| v.powi(2)).mean().unwrap_or_default();
        let mut delta = diff * (2. / out.len() as f32);

        for idx in (0..n_layers).rev() {
            if idx + 1 < n_layers {
                // Hidden deltas pick up the activation derivative.
                delta = delta.dot(&self.layers[idx + 1].weights);
                delta.zip_mut_with(&self.weighted_sums[idx], |d, &z| *d *= self.act.df(z));
            }

            let upstream = if idx == 0 {
                self.input.view()
            } else {
                self.activations[idx - 1].view()
            };

            let layer = &mut self.layers[idx];
            layer.grad_weights = Some(delta.t().dot(&upstream));
            layer.grad_biases = Some(delta.sum_axis(Axis(0)));
        }

        Ok(loss)
    }

    /// Gradient statistics for the parameter at `flat_idx` in the interleaved
    /// flat ordering `[w0, b0, w1, b1, ...]`.
    ///
    /// # Returns
    /// `(grad_sum, grad_dot_param)`, or `None` when no gradient is held.
    pub fn grad_stats(&self, flat_idx: usize) -> Option<(f32, f32)> {
        let layer = self.layers.get(flat_idx / 2)?;
        if flat_idx % 2 == 0 {
            let g = layer.grad_weights.as_ref()?;
            Some((g.sum(), (g * &layer.weights).sum()))
        } else {
            let g = layer.grad_biases.as_ref()?;
            Some((g.sum(), (g * &layer.biases).sum()))
        }
    }
}
