//! Errors
//!
//! Custom error types used throughout the `histgbm` crate.
use std::fmt;
use thiserror::Error;

/// Errors that can occur while training, predicting or persisting a booster.
#[derive(Debug, Error)]
pub enum BoostError {
    /// Malformed gradient or hessian returned by a custom objective.
    #[error("{0}")]
    ShapeMismatch(String),
    /// Custom objective returned the wrong number of output columns.
    #[error(
        "The number of columns in the gradient/hessian ({found}) should be equal to the number of targets/classes ({expected})."
    )]
    OutputDimension { expected: usize, found: usize },
    /// Configuration combination that no tree method implements.
    #[error("Only the hist tree method is supported for building multi-target trees, {0} was requested.")]
    StrategyUnsupported(String),
    /// Configuration combination not implemented for the requested device.
    #[error("GPU is not yet supported for {0}.")]
    DeviceUnsupported(String),
    /// Requested device ordinal does not exist.
    #[error("Invalid device ordinal {ordinal}, {available} cuda device(s) available.")]
    InvalidDeviceOrdinal { ordinal: usize, available: usize },
    /// Device differs from the one the training session was started on.
    #[error("Device changed from {0} to {1} during a training session, reset the booster to train on a new device.")]
    DeviceChanged(String, String),
    /// Feature layout differs from the one the training session was started on.
    #[error("Feature types do not match the training session: {0}")]
    FeatureTypeMismatch(String),
    /// Continuing a session would require recomputing the bin map.
    #[error("Bin boundaries would need to be recomputed for feature {0}: {1}")]
    IncompatibleBins(usize, String),
    /// A feature has more cut values than a bin index can address.
    #[error("Feature {0} has {1} cut values, more than a 16 bit bin index can address.")]
    TooManyBins(usize, usize),
    /// Labels do not form the expected set of classes.
    #[error("Invalid classes inferred from unique values of `y`. Expected: {0}, got {1}")]
    InvalidClasses(String, String),
    /// Categorical feature holds a value that is not a valid category code.
    #[error("Feature {0} is categorical, but value {1} is not a non-negative integer category code below {2}.")]
    InvalidCategory(usize, f64, u32),
    /// Custom objective callable was not attached.
    #[error("The custom objective `{0}` has no callable attached, set it again with `set_objective`.")]
    MissingCustomObjective(String),
    /// Inconsistent lengths between data, labels, weights or margins.
    #[error("Mismatched data dimensions: {0}")]
    DataShape(String),
    /// Unable to write model to file.
    #[error("Unable to write model to file: {0}")]
    UnableToWrite(String),
    /// Unable to read model from file.
    #[error("Unable to read model from a file {0}")]
    UnableToRead(String),
    /// NaN value found in data when missing was expected.
    #[error("The value {0} is set to missing, but a NaN value was found in the data.")]
    NANValueFound(f64),
    /// Invalid value parsing.
    #[error("Invalid value {0} passed for {1}, expected one of {2}.")]
    ParseString(String, String, String),
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
}

/// Non-fatal conditions raised during training.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoostWarning {
    /// A custom objective returned flattened 1-D gradient/hessian arrays.
    LegacyShape { n_rows: usize, n_outputs: usize },
}

impl fmt::Display for BoostWarning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BoostWarning::LegacyShape { n_rows, n_outputs } => write!(
                f,
                "The gradient and hessian of a custom objective are required to be (n_samples, n_targets) = ({}, {}), \
                 a flattened array was reshaped in compatibility mode.",
                n_rows, n_outputs
            ),
        }
    }
}
