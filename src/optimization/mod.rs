mod adam;
mod optimizer;
mod sgd;

pub use adam::{Adam, ParamMoments};
pub use optimizer::Optimizer;
pub use sgd::Sgd;
