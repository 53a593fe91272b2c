mod activation;
mod config;
mod error;
mod gnt;
mod net;
mod optimization;

pub use activation::ActFn;
pub use config::{GntConfig, InitKind, ReplacementStrategy, UtilMetric};
pub use error::{GntErr, Result};
pub use gnt::{Criterion, Gnt};
pub use net::{DenseLayer, FeedForwardNet};
pub use optimization::{Adam, Optimizer, ParamMoments, Sgd};
