//! # Space Server - Main Entry Point
//!
//! Hosts a [`location_service::LocationService`] for one space server node.
//! This entry point handles CLI parsing, configuration loading, and
//! application lifecycle management.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! space_server
//!
//! # Specify custom configuration and identity
//! space_server --config node2.toml --server-id 2
//!
//! # Run for a minute with JSON logs
//! space_server --duration 60 --json-logs
//! ```
//!
//! ## Configuration
//!
//! The server loads configuration from a TOML file (default: `space_server.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## Signal Handling
//!
//! The server handles graceful shutdown on:
//! - SIGINT (Ctrl+C)
//! - SIGTERM (Unix systems)

use tracing::error;

mod app;
mod cli;
mod config;
mod error;
mod logging;
mod signals;
mod simulation;
mod transport;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Runs the space server until shutdown.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    // Parse CLI arguments first
    let args = CliArgs::parse();

    // Load configuration to get logging settings
    let mut logging = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default()
        .logging;
    if let Some(level) = &args.log_level {
        logging.level = level.clone();
    }

    // Setup logging before anything else
    if let Err(e) = logging::setup_logging(&logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

// Re-export main types for potential library usage
pub use app::Application as SpaceServerApp;
pub use cli::CliArgs as SpaceServerArgs;
pub use config::{
    AppConfig as SpaceServerConfig, LoggingSettings, ServerSettings, SimulationSettings, TransportSettings,
};
pub use error::ServerError;
pub use simulation::{Simulation, StepReport};
pub use transport::{ChannelSink, LinkReport, PeerLink, SinkStats};
