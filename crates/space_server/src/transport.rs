//! # Channel Transport
//!
//! In-process stand-in for the space server's outbound links. Each
//! destination gets a bounded `tokio::sync::mpsc` channel and a drain task
//! that consumes it at a configured rate, so a slow link produces the same
//! backpressure a congested network connection would.
//!
//! [`ChannelSink`] implements the non-blocking send contract:
//! a full channel refuses the message (it stays queued in the location
//! service), a closed channel refuses it and logs a warning.

use crate::config::TransportSettings;
use crate::error::ServerError;
use location_service::{BulkLocationUpdate, ObjectId, ServerId, TransportSink};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Counters kept by [`ChannelSink`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    pub accepted: u64,
    /// Refused because the destination channel was full
    pub backpressured: u64,
    /// Refused because the destination is closed or was never connected
    pub unreachable: u64,
}

/// Transport sink backed by one bounded channel per destination.
#[derive(Debug, Default)]
pub struct ChannelSink {
    servers: HashMap<ServerId, mpsc::Sender<BulkLocationUpdate>>,
    hosts: HashMap<ObjectId, mpsc::Sender<BulkLocationUpdate>>,
    stats: SinkStats,
}

impl ChannelSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a channel to a peer space server and returns its receiving end.
    pub fn connect_server(&mut self, server: ServerId, capacity: usize) -> mpsc::Receiver<BulkLocationUpdate> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.servers.insert(server, tx);
        rx
    }

    /// Opens a channel to an object host and returns its receiving end.
    pub fn connect_host(&mut self, host: ObjectId, capacity: usize) -> mpsc::Receiver<BulkLocationUpdate> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.hosts.insert(host, tx);
        rx
    }

    /// Drops the sending side so the link's drain task can finish.
    pub fn disconnect_all(&mut self) {
        self.servers.clear();
        self.hosts.clear();
    }

    pub fn stats(&self) -> &SinkStats {
        &self.stats
    }
}

fn offer<D>(
    links: &HashMap<D, mpsc::Sender<BulkLocationUpdate>>,
    destination: &D,
    message: &BulkLocationUpdate,
    stats: &mut SinkStats,
) -> bool
where
    D: Eq + Hash + Display,
{
    let Some(tx) = links.get(destination) else {
        debug!("No link to {}, deferring {} updates", destination, message.len());
        stats.unreachable += 1;
        return false;
    };

    match tx.try_send(message.clone()) {
        Ok(()) => {
            stats.accepted += 1;
            true
        }
        Err(TrySendError::Full(_)) => {
            stats.backpressured += 1;
            false
        }
        Err(TrySendError::Closed(_)) => {
            warn!("Link to {} is closed, {} updates stay queued", destination, message.len());
            stats.unreachable += 1;
            false
        }
    }
}

impl TransportSink<ServerId> for ChannelSink {
    fn try_send(&mut self, destination: &ServerId, message: &BulkLocationUpdate) -> bool {
        offer(&self.servers, destination, message, &mut self.stats)
    }
}

impl TransportSink<ObjectId> for ChannelSink {
    fn try_send(&mut self, destination: &ObjectId, message: &BulkLocationUpdate) -> bool {
        offer(&self.hosts, destination, message, &mut self.stats)
    }
}

/// What a link delivered over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    pub peer: String,
    pub messages: u64,
    pub updates: u64,
    /// JSON-encoded size of everything delivered
    pub bytes: u64,
}

/// Drain task consuming one destination channel.
#[derive(Debug)]
pub struct PeerLink {
    peer: String,
    handle: JoinHandle<LinkReport>,
}

impl PeerLink {
    /// Spawns a task draining up to `drain_burst` messages every
    /// `drain_interval_ms`. It finishes once every sender is gone and the
    /// channel is empty.
    pub fn spawn(
        peer: impl Into<String>,
        mut rx: mpsc::Receiver<BulkLocationUpdate>,
        settings: &TransportSettings,
    ) -> Self {
        let peer = peer.into();
        let interval = Duration::from_millis(settings.drain_interval_ms.max(1));
        let burst = settings.drain_burst.max(1);
        let mut report = LinkReport {
            peer: peer.clone(),
            ..Default::default()
        };

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            'drain: loop {
                ticker.tick().await;
                for _ in 0..burst {
                    match rx.try_recv() {
                        Ok(message) => report.record(&message),
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => break 'drain,
                    }
                }
            }
            debug!(
                "Link to {} closed after {} messages ({} bytes)",
                report.peer, report.messages, report.bytes
            );
            report
        });

        Self { peer, handle }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Waits for the drain task to finish and returns its report.
    pub async fn finish(self) -> Result<LinkReport, ServerError> {
        self.handle
            .await
            .map_err(|e| ServerError::Network(format!("link to {} failed: {}", self.peer, e)))
    }

    /// Waits up to `timeout` for the drain task, aborting it afterwards.
    pub async fn finish_within(self, timeout: Duration) -> Result<LinkReport, ServerError> {
        let peer = self.peer.clone();
        let abort = self.handle.abort_handle();
        match tokio::time::timeout(timeout, self.finish()).await {
            Ok(result) => result,
            Err(_) => {
                abort.abort();
                info!("⏰ Link to {} did not drain within {:?}", peer, timeout);
                Err(ServerError::Network(format!("link to {peer} timed out")))
            }
        }
    }
}

impl LinkReport {
    fn record(&mut self, message: &BulkLocationUpdate) {
        self.messages += 1;
        self.updates += message.len() as u64;
        match serde_json::to_vec(message) {
            Ok(encoded) => self.bytes += encoded.len() as u64,
            Err(e) => warn!("Failed to encode update for {}: {}", self.peer, e),
        }
    }
}
