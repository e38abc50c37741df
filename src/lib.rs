mod categories;
mod node;
mod predict;

#[cfg(test)]
mod testing;

// Modules
pub mod binning;
pub mod booster;
pub mod constants;
pub mod data;
pub mod device;
pub mod errors;
pub mod gradient;
pub mod grower;
pub mod histogram;
pub mod metric;
pub mod objective;
pub mod sampler;
pub mod splitter;
pub mod tree;
pub mod utils;

// Individual classes, and functions
pub use booster::{EvalSet, FitOptions, GradientBooster, MultiStrategy, TreeMethod};
pub use data::Matrix;
pub use device::Device;
pub use errors::{BoostError, BoostWarning};
pub use objective::{BuiltinObjective, CustomObjective, Link, Objective};
