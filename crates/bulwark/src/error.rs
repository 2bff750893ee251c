//! # Runtime Error Types

use bulwark_core::PoolError;
use bulwark_pressure::PressureError;
use thiserror::Error;

/// Why a session could not start.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// The pressure monitor is in emergency mode.
    #[error("session refused: memory pressure emergency in progress")]
    EmergencyMode,

    /// A session is already running.
    #[error("a session is already active")]
    AlreadyActive,

    /// The runtime is shutting down.
    #[error("session refused: runtime is shutting down")]
    ShuttingDown,
}

/// Errors surfaced by the runtime.
#[derive(Error, Debug)]
pub enum BulwarkError {
    /// Pool setup or lookup failed.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Pressure controller setup failed.
    #[error(transparent)]
    Pressure(#[from] PressureError),

    /// Session gate refused.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Runtime config file could not be read.
    #[error("failed to read runtime config: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// Runtime config file is not valid TOML.
    #[error("failed to parse runtime config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Result type for runtime operations.
pub type BulwarkResult<T> = Result<T, BulwarkError>;
