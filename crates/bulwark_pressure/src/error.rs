//! # Pressure Error Types

use thiserror::Error;

/// Errors raised while configuring the pressure controller.
///
/// Runtime failures (a dead sampler, a cleanup that does not converge) are not
/// errors: the monitor handles them itself by disabling or restarting.
#[derive(Error, Debug)]
pub enum PressureError {
    /// No memory sampler passed its validity check.
    #[error("no valid memory sampler among {tried} candidates")]
    SamplerUnavailable {
        /// Number of candidates tried.
        tried: usize,
    },

    /// Configuration values are inconsistent.
    #[error("invalid pressure configuration: {0}")]
    InvalidConfig(String),

    /// Config file could not be read.
    #[error("failed to read pressure config: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// Config file is not valid TOML for [`PressureConfig`](crate::PressureConfig).
    #[error("failed to parse pressure config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Result type for pressure controller setup.
pub type PressureResult<T> = Result<T, PressureError>;
