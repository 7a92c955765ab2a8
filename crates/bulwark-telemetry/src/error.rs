//! Telemetry error types.

/// Errors from logging setup.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Invalid level, directive or format name.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A global subscriber is already installed.
    #[error("initialization error: {0}")]
    InitError(String),

    /// The log directory could not be created.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
