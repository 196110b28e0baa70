//! Configuration management for the space server.
//!
//! This module handles loading, validation, and conversion of server configuration
//! from TOML files and command-line arguments.

use location_service::{LocationServiceConfig, ServerId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Default tick interval for serde deserialization
fn default_tick_interval() -> u64 {
    50 // 20 ticks per second
}

fn default_server_id() -> u32 {
    1
}

fn default_stats_interval() -> u64 {
    10
}

fn default_channel_capacity() -> usize {
    32
}

fn default_drain_interval() -> u64 {
    100
}

fn default_drain_burst() -> usize {
    4
}

fn default_peers() -> Vec<u32> {
    vec![2, 3]
}

fn default_local_objects() -> usize {
    200
}

fn default_replica_objects() -> usize {
    50
}

fn default_object_hosts() -> usize {
    8
}

fn default_subscriptions_per_host() -> usize {
    25
}

fn default_region_extent() -> f64 {
    1000.0
}

fn default_max_speed() -> f64 {
    20.0
}

fn default_move_fraction() -> f64 {
    0.25
}

fn default_migration_chance() -> f64 {
    0.02
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server identity and tick settings
    pub server: ServerSettings,
    /// Location service tuning, passed through to the service unchanged
    #[serde(default)]
    pub location: LocationServiceConfig,
    /// Outbound peer links
    #[serde(default)]
    pub transport: TransportSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
    /// Synthetic load driving the service
    #[serde(default)]
    pub simulation: SimulationSettings,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Identifier of this space server in the cluster
    #[serde(default = "default_server_id")]
    pub server_id: u32,
    /// Interval between location service ticks in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Interval between statistics reports in seconds
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

/// Outbound link configuration.
///
/// Every destination gets a bounded channel drained at a fixed rate, so a
/// slow peer produces backpressure instead of unbounded buffering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Capacity of each destination channel, in messages
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// How often each link drains its channel, in milliseconds
    #[serde(default = "default_drain_interval")]
    pub drain_interval_ms: u64,
    /// Messages taken per drain
    #[serde(default = "default_drain_burst")]
    pub drain_burst: usize,
    /// Peer space servers replicating from this one
    #[serde(default = "default_peers")]
    pub peers: Vec<u32>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            drain_interval_ms: default_drain_interval(),
            drain_burst: default_drain_burst(),
            peers: default_peers(),
        }
    }
}

/// Logging system configuration.
///
/// Controls log output format and level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

/// Synthetic workload configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettings {
    #[serde(default = "default_local_objects")]
    pub local_objects: usize,
    #[serde(default = "default_replica_objects")]
    pub replica_objects: usize,
    #[serde(default = "default_object_hosts")]
    pub object_hosts: usize,
    #[serde(default = "default_subscriptions_per_host")]
    pub subscriptions_per_host: usize,
    /// Half the edge length of the cubic region objects move in
    #[serde(default = "default_region_extent")]
    pub region_extent: f64,
    #[serde(default = "default_max_speed")]
    pub max_speed: f64,
    /// Share of local objects that change velocity each tick
    #[serde(default = "default_move_fraction")]
    pub move_fraction: f64,
    /// Per-tick chance that a local object migrates away or a migrated one returns
    #[serde(default = "default_migration_chance")]
    pub migration_chance: f64,
    /// Fixed RNG seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            local_objects: default_local_objects(),
            replica_objects: default_replica_objects(),
            object_hosts: default_object_hosts(),
            subscriptions_per_host: default_subscriptions_per_host(),
            region_extent: default_region_extent(),
            max_speed: default_max_speed(),
            move_fraction: default_move_fraction(),
            migration_chance: default_migration_chance(),
            seed: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                server_id: default_server_id(),
                tick_interval_ms: default_tick_interval(),
                stats_interval_secs: default_stats_interval(),
            },
            location: LocationServiceConfig::default(),
            transport: TransportSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
            simulation: SimulationSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file, creating it with defaults if missing.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.tick_interval_ms == 0 {
            return Err("server.tick_interval_ms must be greater than 0".to_string());
        }
        if self.server.stats_interval_secs == 0 {
            return Err("server.stats_interval_secs must be greater than 0".to_string());
        }

        if self.transport.channel_capacity == 0 {
            return Err("transport.channel_capacity must be greater than 0".to_string());
        }
        if self.transport.drain_interval_ms == 0 || self.transport.drain_burst == 0 {
            return Err("transport drain interval and burst must be greater than 0".to_string());
        }
        if self.transport.peers.contains(&self.server.server_id) {
            return Err(format!(
                "transport.peers must not contain this server's own id {}",
                self.server.server_id
            ));
        }

        if !(self.simulation.region_extent > 0.0) {
            return Err("simulation.region_extent must be positive".to_string());
        }
        if self.simulation.max_speed < 0.0 {
            return Err("simulation.max_speed must not be negative".to_string());
        }
        for (name, value) in [
            ("move_fraction", self.simulation.move_fraction),
            ("migration_chance", self.simulation.migration_chance),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("simulation.{name} must be within 0.0..=1.0"));
            }
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        self.to_service_config().validate().map_err(|e| e.to_string())
    }

    pub fn server_id(&self) -> ServerId {
        ServerId(self.server.server_id)
    }

    /// Peer servers as typed ids.
    pub fn peers(&self) -> Vec<ServerId> {
        self.transport.peers.iter().copied().map(ServerId).collect()
    }

    /// Configuration consumed by the location service.
    pub fn to_service_config(&self) -> LocationServiceConfig {
        self.location.clone()
    }
}
