//! Error types for the location service.
//!
//! None of these escape the [`LocationService`](crate::LocationService)
//! façade: conflicting or late inputs are expected from benign races between
//! removal, migration and in-flight updates, so the façade logs them and
//! reports `false`. The record store returns them as values so lower-level
//! callers and tests can tell the cases apart.

use crate::types::ObjectId;

/// Reasons a record-store operation was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    /// The object is not tracked by this server
    #[error("Unknown object {0}")]
    UnknownObject(ObjectId),

    /// The object is already tracked with the same or stronger authority
    #[error("Object {0} is already tracked")]
    DuplicateObject(ObjectId),

    /// The operation would downgrade or bypass local authority
    #[error("Object {0} is owned locally")]
    NotAuthoritative(ObjectId),

    /// A replicated record older than the stored state
    #[error("Stale update for object {object}: seqno {seqno} < {current}")]
    StaleUpdate {
        object: ObjectId,
        seqno: u64,
        current: u64,
    },
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
