//! Error types for the space server host.

use location_service::ConfigValidationError;

/// Server operation errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The location service refused its configuration
    #[error("Location service error: {0}")]
    Location(#[from] ConfigValidationError),

    /// Link-related errors such as a drain task that died
    #[error("Network error: {0}")]
    Network(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}
