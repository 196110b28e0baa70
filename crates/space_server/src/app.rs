//! Main application logic and lifecycle management.
//!
//! This module contains the core `Application` struct that wires the location
//! service to its outbound links, drives the tick loop and handles shutdown.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    error::ServerError,
    logging::display_banner,
    signals::{setup_signal_handlers, spawn_merciless_shutdown},
    simulation::Simulation,
    transport::{ChannelSink, LinkReport, PeerLink},
};
use location_service::{LocationService, ServerId, Time};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Upper bound on ticks spent draining queued updates during shutdown.
const MAX_DRAIN_TICKS: u32 = 40;

/// Main application struct.
///
/// Owns the location service (and through it the transport sink), the
/// simulation feeding it and the drain tasks of every outbound link.
pub struct Application {
    config: AppConfig,
    service: LocationService<ChannelSink>,
    simulation: Simulation,
    links: Vec<PeerLink>,
    duration: Option<Duration>,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// Loads configuration (creating a default file if missing), applies CLI
    /// overrides, validates the result and opens one link per peer server
    /// and object host.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }
        if let Some(server_id) = args.server_id {
            config.server.server_id = server_id;
        }

        if let Err(e) = config.validate() {
            return Err(ServerError::Config(format!("Configuration validation failed: {e}")).into());
        } else {
            info!("✅ Configuration loaded and validated successfully");
        }

        display_banner();

        Ok(Self::from_config(config, args.duration)?)
    }

    /// Builds the application from an already validated configuration.
    pub fn from_config(config: AppConfig, duration: Option<Duration>) -> Result<Self, ServerError> {
        let mut sink = ChannelSink::new();
        let mut links = Vec::new();
        let capacity = config.transport.channel_capacity;

        let peers = config.peers();
        for peer in &peers {
            let rx = sink.connect_server(*peer, capacity);
            links.push(PeerLink::spawn(peer.to_string(), rx, &config.transport));
        }

        let simulation = Simulation::new(config.simulation.clone(), peers);
        for host in simulation.hosts() {
            let rx = sink.connect_host(*host, capacity);
            links.push(PeerLink::spawn(format!("host-{host}"), rx, &config.transport));
        }

        let service = LocationService::new(config.to_service_config(), sink)?;

        info!(
            "🛰️ Space server {} with {} outbound links",
            config.server_id(),
            links.len()
        );

        Ok(Self {
            config,
            service,
            simulation,
            links,
            duration,
        })
    }

    /// Runs the tick loop until a shutdown signal or the configured duration.
    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting space server {}", self.config.server_id());
        self.log_configuration_summary();

        let started = Instant::now();
        let now = || Time::from_secs_f64(started.elapsed().as_secs_f64());
        self.simulation.populate(&mut self.service, now());

        let mut tick = tokio::time::interval(Duration::from_millis(self.config.server.tick_interval_ms));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stats = tokio::time::interval(Duration::from_secs(self.config.server.stats_interval_secs));
        stats.tick().await;

        let deadline = self.duration;
        let stop_after = async move {
            match deadline {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(stop_after);
        let shutdown = setup_signal_handlers();
        tokio::pin!(shutdown);

        info!("✅ Space server is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.simulation.step(&mut self.service, now());
                    self.service.service();
                }
                _ = stats.tick() => {
                    self.log_stats();
                }
                result = &mut shutdown => {
                    if let Err(e) = result {
                        error!("❌ Signal handling failed: {e}");
                    }
                    spawn_merciless_shutdown();
                    break;
                }
                _ = &mut stop_after => {
                    info!("⏱️ Run duration elapsed");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Drains queued updates, closes every link and reports final statistics.
    async fn shutdown(mut self) {
        info!("🛑 Beginning graceful shutdown...");

        info!("⏳ Phase 1: Draining outstanding location updates...");
        let interval = Duration::from_millis(self.config.server.tick_interval_ms);
        let mut ticks = 0;
        while self.service.policy().total_outstanding() > 0 && ticks < MAX_DRAIN_TICKS {
            self.service.service();
            tokio::time::sleep(interval).await;
            ticks += 1;
        }
        let left = self.service.policy().total_outstanding();
        if left > 0 {
            warn!("⏰ {} updates still queued after {} drain ticks", left, ticks);
        } else {
            info!("✅ All location updates handed to the transport");
        }

        info!("🧹 Phase 2: Closing links...");
        self.service.sink_mut().disconnect_all();
        self.log_stats();

        let timeout = Duration::from_millis(self.config.transport.drain_interval_ms)
            * (self.config.transport.channel_capacity as u32 + 2);
        let mut reports = Vec::new();
        for link in std::mem::take(&mut self.links) {
            match link.finish_within(timeout).await {
                Ok(report) => reports.push(report),
                Err(e) => warn!("❌ {}", e),
            }
        }
        log_link_reports(&reports);

        info!("✅ Space server {} shutdown complete", self.config.server_id());
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        let peers: Vec<String> = self.config.peers().iter().map(ServerId::to_string).collect();
        info!("📋 Configuration Summary:");
        info!("  🆔 Server: {}", self.config.server_id());
        info!("  ⏱️ Tick interval: {}ms", self.config.server.tick_interval_ms);
        info!(
            "  📦 Max updates per message: {}",
            self.config.location.policy.max_updates_per_message
        );
        match self.config.location.policy.max_consecutive_failures {
            Some(limit) => info!("  🚫 Evict after {} failed ticks", limit),
            None => info!("  🔁 Failed destinations retried indefinitely"),
        }
        info!("  🌐 Peers: [{}]", peers.join(", "));
        info!(
            "  🧪 Simulation: {} local, {} replicas, {} object hosts",
            self.config.simulation.local_objects,
            self.config.simulation.replica_objects,
            self.config.simulation.object_hosts
        );
    }

    fn log_stats(&self) {
        let stats = self.service.stats();
        let sink = self.service.sink().stats();
        info!(
            "📊 {} objects | {} ticks | {} messages ({} updates) | {} queued | {} failed sends ({} backpressure, {} unreachable) | {} evicted",
            self.service.store().len(),
            stats.ticks,
            stats.messages_sent,
            stats.updates_sent,
            self.service.policy().total_outstanding(),
            stats.send_failures,
            sink.backpressured,
            sink.unreachable,
            stats.destinations_evicted
        );
    }
}

fn log_link_reports(reports: &[LinkReport]) {
    info!("📊 Final Link Statistics:");
    for report in reports {
        info!(
            "  - {}: {} messages, {} updates, {} bytes",
            report.peer, report.messages, report.updates, report.bytes
        );
    }
    let bytes: u64 = reports.iter().map(|report| report.bytes).sum();
    info!("  - Total delivered: {} bytes", bytes);
}
