//! Location Service Configuration
//!
//! Explicit configuration structures passed to the service and policy
//! constructors. Both are serde-loadable so a host can embed them in its own
//! configuration file.

use crate::error::ConfigValidationError;
use serde::{Deserialize, Serialize};

fn default_max_updates_per_message() -> u32 {
    64
}

/// Tuning for the location update policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePolicyConfig {
    /// Maximum per-object records in one bulk update message
    #[serde(default = "default_max_updates_per_message")]
    pub max_updates_per_message: u32,
    /// Evict a destination after this many consecutive ticks of failed sends.
    /// `None` keeps retrying forever.
    #[serde(default)]
    pub max_consecutive_failures: Option<u32>,
}

impl Default for UpdatePolicyConfig {
    fn default() -> Self {
        Self {
            max_updates_per_message: default_max_updates_per_message(),
            max_consecutive_failures: None,
        }
    }
}

impl UpdatePolicyConfig {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.max_updates_per_message == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "max_updates_per_message must be > 0".to_string(),
            ));
        }
        if self.max_consecutive_failures == Some(0) {
            return Err(ConfigValidationError::InvalidValue(
                "max_consecutive_failures must be > 0 when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the location service façade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationServiceConfig {
    #[serde(default)]
    pub policy: UpdatePolicyConfig,
    /// Drop a removed object from every interest set immediately instead of
    /// leaving unsubscription to the session layer. Queued updates for the
    /// object are still delivered either way.
    #[serde(default)]
    pub unsubscribe_on_remove: bool,
}

impl LocationServiceConfig {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.policy.validate()
    }
}
