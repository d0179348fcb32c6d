use thiserror::Error;

/// Error type for invalid operations.
///
/// Every variant is raised synchronously at the point of detection.
/// Inputs are static, so none of these are retried internally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkfluxError {
    /// Malformed grid, invalid filter specification or inconsistent inputs
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    /// An expected time step is missing from a dataset during aggregation
    #[error("No data for time step {0}")]
    DataGap(String),
    /// A window or segment is longer than the series it is applied to
    #[error("Insufficient data for {context}: at least {required} samples required, got {available}")]
    InsufficientData {
        context: String,
        required: usize,
        available: usize,
    },
    /// Series used together in a regression share no time keys
    #[error("Series cannot be aligned: {0}")]
    DataAlignment(String),
    /// Division by zero or an invalid argument in a derived formula
    #[error("Numeric domain error: {0}")]
    NumericDomain(String),
}

impl SinkfluxError {
    pub fn insufficient(context: &str, required: usize, available: usize) -> Self {
        SinkfluxError::InsufficientData {
            context: context.to_string(),
            required,
            available,
        }
    }
}

/// Convenience type for `Result<T, SinkfluxError>`.
pub type SinkfluxResult<T> = Result<T, SinkfluxError>;
