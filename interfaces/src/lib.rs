pub mod baseline;
pub mod defs;
pub mod empty;

pub use baseline::LinearEstimator;
pub use defs::{BoardBlock, BoardSourceSpec, Estimator};
pub use empty::ConstantEstimator;
