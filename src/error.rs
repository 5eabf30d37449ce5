//! Error types for the alignment subsystem.
//!
//! Three layers, matching how far each failure is allowed to travel:
//!
//! - **`StatsError`**: raised by the derived accessors of
//!   [`SignalStatistics`](crate::analysis::statistics::SignalStatistics) when
//!   too few samples exist to define a quantity. Always absorbed by the peak
//!   classifier; never reaches the caller of `align()`.
//! - **`AlignError`**: what `align()` can return. Either a caller mistake
//!   (`Configuration`) or a failure from the scanning engine or positioner
//!   (`Collaborator`), which is forwarded untouched.
//! - **`ConfigError`**: loading/validating the layered configuration.
//!
//! Protocol violations in the document stream (nested scan-start, events for
//! an unknown descriptor) are not errors at all: the collector logs and
//! absorbs them.

use thiserror::Error;

/// Convenience alias for results from the alignment controller.
pub type AlignResult<T> = std::result::Result<T, AlignError>;

/// Failure of a derived statistic.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    /// Not enough data to define the requested quantity (no samples, zero
    /// total weight, or non-physical negative spread).
    #[error("Insufficient data to compute {quantity}")]
    InsufficientData {
        /// Name of the accessor that failed
        quantity: &'static str,
    },
}

impl StatsError {
    pub(crate) fn insufficient(quantity: &'static str) -> Self {
        StatsError::InsufficientData { quantity }
    }
}

/// Errors surfaced by [`AlignmentController::align`](crate::experiment::align::AlignmentController::align).
#[derive(Error, Debug)]
pub enum AlignError {
    /// Invalid request: unknown feature, unknown device, bad point count.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Scanning engine or positioner failure, propagated unchanged.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

/// Errors from loading or validating [`AlignConfig`](crate::config::AlignConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Figment could not read or extract the layered configuration
    #[error("Configuration error: {0}")]
    Load(#[from] Box<figment::Error>),

    /// Configuration parsed but holds an invalid value
    #[error("Configuration validation error: {0}")]
    Validation(String),
}

impl From<figment::Error> for ConfigError {
    fn from(value: figment::Error) -> Self {
        ConfigError::Load(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_message() {
        let err = StatsError::insufficient("centroid");
        assert_eq!(err.to_string(), "Insufficient data to compute centroid");
    }

    #[test]
    fn test_collaborator_error_is_transparent() {
        let err: AlignError = anyhow::anyhow!("axis 2 following error").into();
        assert_eq!(err.to_string(), "axis 2 following error");
        assert!(matches!(err, AlignError::Collaborator(_)));
    }
}
