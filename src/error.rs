use thiserror::Error;

/// Errors raised while evaluating a dosing schedule.
///
/// Input errors are always raised before any trajectory is simulated.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("number of samples must be positive, but is {0}")]
    InvalidSampleCount(usize),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("failed to construct variate distribution: {0}")]
    Variate(String),

    #[error("failed to seed random number generator: {0}")]
    Seed(String),
}
