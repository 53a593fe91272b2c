use serde::Deserialize;

/// Activation function applied between hidden linear layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActFn {
    Linear,
    Sigmoid,
    Tanh,
    Relu,
    LeakyRelu,
    Elu,
    Swish,
    Selu,
}
use ActFn::*;

const LEAKY_SLOPE: f32 = 0.01;
const SELU_LAMBDA: f32 = 1.050_701;
const SELU_ALPHA: f32 = 1.673_263_2;

impl ActFn {
    pub fn f(&self, z: f32) -> f32 {
        match self {
            Linear => z,
            Sigmoid => 1. / (1. + (-z).exp()),
            Tanh => z.tanh(),
            Relu => z.max(0.),
            LeakyRelu => {
                if z > 0. {
                    z
                } else {
                    LEAKY_SLOPE * z
                }
            }
            Elu => {
                if z > 0. {
                    z
                } else {
                    z.exp_m1()
                }
            }
            Swish => z / (1. + (-z).exp()),
            Selu => {
                if z > 0. {
                    SELU_LAMBDA * z
                } else {
                    SELU_LAMBDA * SELU_ALPHA * z.exp_m1()
                }
            }
        }
    }

    pub fn df(&self, z: f32) -> f32 {
        match self {
            Linear => 1.,
            Sigmoid => {
                let s = self.f(z);
                s * (1. - s)
            }
            Tanh => 1. - z.tanh().powi(2),
            Relu => {
                if z > 0. {
                    1.
                } else {
                    0.
                }
            }
            LeakyRelu => {
                if z > 0. {
                    1.
                } else {
                    LEAKY_SLOPE
                }
            }
            Elu => {
                if z > 0. {
                    1.
                } else {
                    z.exp()
                }
            }
            Swish => {
                let s = 1. / (1. + (-z).exp());
                s + z * s * (1. - s)
            }
            Selu => {
                if z > 0. {
                    SELU_LAMBDA
                } else {
                    SELU_LAMBDA * SELU_ALPHA * z.exp()
                }
            }
        }
    }

    /// Initialization gain for this nonlinearity.
    ///
    /// `Elu` and `Swish` use the relu gain.
    pub fn gain(&self) -> f32 {
        match self {
            Linear | Sigmoid => 1.,
            Tanh => 5. / 3.,
            Relu | Elu | Swish => 2f32.sqrt(),
            LeakyRelu => (2. / (1. + LEAKY_SLOPE.powi(2))).sqrt(),
            Selu => 0.75,
        }
    }

    /// Self-normalizing activations keep their own initialization scheme.
    pub fn is_self_normalizing(&self) -> bool {
        matches!(self, Selu)
    }
}
