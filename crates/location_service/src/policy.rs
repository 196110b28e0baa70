//! # Location Update Policy
//!
//! Decides when and to whom location deltas are pushed. The policy owns two
//! subscriber indices, one for peer space servers and one for object hosts,
//! plus the transport sink. It is the only component that calls
//! [`TransportSink::try_send`].
//!
//! Updates are recorded as outstanding the moment an object changes and are
//! shipped on the next [`LocationUpdatePolicy::service`] tick, cut into
//! batches of at most `max_updates_per_message` records. A failed send is
//! not retried within the same tick.
//!
//! ## Replica updates
//!
//! Peer servers learn about an object from its authority, never from another
//! replica, so replica changes only reach object-host subscribers.

use crate::config::UpdatePolicyConfig;
use crate::error::ConfigValidationError;
use crate::store::{ObjectRecord, TrackingKind};
use crate::subscription::{Destination, FlushReport, SubscriberIndex, UpdateInfo};
use crate::transport::TransportSink;
use crate::types::{ObjectId, ServerId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Who a subscription is held for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subscriber {
    /// A peer space server replicating objects from this one
    Server(ServerId),
    /// An object host subscribed on behalf of one of its objects
    ObjectHost(ObjectId),
}

impl From<ServerId> for Subscriber {
    fn from(server: ServerId) -> Self {
        Subscriber::Server(server)
    }
}

impl From<ObjectId> for Subscriber {
    fn from(object: ObjectId) -> Self {
        Subscriber::ObjectHost(object)
    }
}

impl std::fmt::Display for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subscriber::Server(server) => write!(f, "{}", server),
            Subscriber::ObjectHost(object) => write!(f, "host-of-{}", object),
        }
    }
}

/// Running counters kept by the policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStats {
    pub ticks: u64,
    pub messages_sent: u64,
    pub updates_sent: u64,
    /// Sends refused by the transport
    pub send_failures: u64,
    /// Destinations dropped after draining
    pub destinations_collected: u64,
    pub destinations_evicted: u64,
    /// Outstanding updates thrown away by eviction
    pub updates_discarded: u64,
}

impl PolicyStats {
    fn record<D>(&mut self, report: &FlushReport<D>) {
        self.messages_sent += report.messages_sent as u64;
        self.updates_sent += report.updates_sent as u64;
        self.send_failures += report.failed.len() as u64;
        self.destinations_collected += report.collected as u64;
    }
}

/// Result of one [`LocationUpdatePolicy::service`] tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub servers: FlushReport<ServerId>,
    pub object_hosts: FlushReport<ObjectId>,
    /// Destinations of either kind evicted this tick
    pub evicted: usize,
}

impl FlushSummary {
    pub fn messages_sent(&self) -> usize {
        self.servers.messages_sent + self.object_hosts.messages_sent
    }

    pub fn updates_sent(&self) -> usize {
        self.servers.updates_sent + self.object_hosts.updates_sent
    }

    pub fn failures(&self) -> usize {
        self.servers.failed.len() + self.object_hosts.failed.len()
    }
}

/// Batching, coalescing update distributor.
#[derive(Debug)]
pub struct LocationUpdatePolicy<S> {
    server_subscriptions: SubscriberIndex<ServerId>,
    object_subscriptions: SubscriberIndex<ObjectId>,
    sink: S,
    config: UpdatePolicyConfig,
    stats: PolicyStats,
}

impl<S> LocationUpdatePolicy<S>
where
    S: TransportSink<ServerId> + TransportSink<ObjectId>,
{
    pub fn new(config: UpdatePolicyConfig, sink: S) -> Result<Self, ConfigValidationError> {
        config.validate()?;
        Ok(Self {
            server_subscriptions: SubscriberIndex::new(),
            object_subscriptions: SubscriberIndex::new(),
            sink,
            config,
            stats: PolicyStats::default(),
        })
    }

    pub fn subscribe(&mut self, subscriber: Subscriber, object: ObjectId) -> bool {
        match subscriber {
            Subscriber::Server(server) => self.server_subscriptions.subscribe(server, object),
            Subscriber::ObjectHost(host) => self.object_subscriptions.subscribe(host, object),
        }
    }

    pub fn unsubscribe(&mut self, subscriber: Subscriber, object: &ObjectId) -> bool {
        match subscriber {
            Subscriber::Server(server) => self.server_subscriptions.unsubscribe(server, object),
            Subscriber::ObjectHost(host) => self.object_subscriptions.unsubscribe(host, object),
        }
    }

    pub fn unsubscribe_all(&mut self, subscriber: Subscriber) -> usize {
        match subscriber {
            Subscriber::Server(server) => self.server_subscriptions.unsubscribe_all(server),
            Subscriber::ObjectHost(host) => self.object_subscriptions.unsubscribe_all(host),
        }
    }

    /// Records the current state of `record` as outstanding for every
    /// subscriber that should see it. Returns the number of destinations.
    pub fn object_updated(&mut self, record: &ObjectRecord) -> usize {
        let update = UpdateInfo::from(record);
        let mut queued = self.object_subscriptions.record_update(&record.id, &update);
        if record.tracking != TrackingKind::Replica {
            queued += self.server_subscriptions.record_update(&record.id, &update);
        }
        queued
    }

    /// Drops a removed object from every interest set. Updates already
    /// queued for it are still delivered.
    pub fn object_removed(&mut self, object: &ObjectId) -> usize {
        self.server_subscriptions.purge_object(object) + self.object_subscriptions.purge_object(object)
    }

    /// Flushes outstanding updates to every destination.
    pub fn service(&mut self) -> FlushSummary {
        let max_batch = self.config.max_updates_per_message as usize;
        self.stats.ticks += 1;

        let servers = self.server_subscriptions.flush(max_batch, &mut self.sink);
        let object_hosts = self.object_subscriptions.flush(max_batch, &mut self.sink);
        self.stats.record(&servers);
        self.stats.record(&object_hosts);

        let mut evicted = 0;
        if let Some(limit) = self.config.max_consecutive_failures {
            evicted += evict_failing(&mut self.server_subscriptions, &servers.failed, limit, &mut self.stats);
            evicted += evict_failing(&mut self.object_subscriptions, &object_hosts.failed, limit, &mut self.stats);
        }

        let summary = FlushSummary {
            servers,
            object_hosts,
            evicted,
        };
        if summary.messages_sent() > 0 || summary.failures() > 0 {
            debug!(
                "Tick {}: {} messages ({} updates) sent, {} failed sends, {} evicted",
                self.stats.ticks,
                summary.messages_sent(),
                summary.updates_sent(),
                summary.failures(),
                evicted
            );
        }
        summary
    }
}

impl<S> LocationUpdatePolicy<S> {
    pub fn server_subscriptions(&self) -> &SubscriberIndex<ServerId> {
        &self.server_subscriptions
    }

    pub fn object_subscriptions(&self) -> &SubscriberIndex<ObjectId> {
        &self.object_subscriptions
    }

    pub fn is_subscribed(&self, subscriber: Subscriber, object: &ObjectId) -> bool {
        match subscriber {
            Subscriber::Server(server) => self.server_subscriptions.is_subscribed(&server, object),
            Subscriber::ObjectHost(host) => self.object_subscriptions.is_subscribed(&host, object),
        }
    }

    /// Outstanding updates across both indices.
    pub fn total_outstanding(&self) -> usize {
        self.server_subscriptions.total_outstanding() + self.object_subscriptions.total_outstanding()
    }

    pub fn config(&self) -> &UpdatePolicyConfig {
        &self.config
    }

    pub fn stats(&self) -> &PolicyStats {
        &self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

fn evict_failing<D: Destination>(
    index: &mut SubscriberIndex<D>,
    failed: &[D],
    limit: u32,
    stats: &mut PolicyStats,
) -> usize {
    let mut evicted = 0;
    for dest in failed {
        if index.consecutive_failures(dest) < limit {
            continue;
        }
        if let Some(info) = index.evict(*dest) {
            warn!(
                "Evicting {} after {} failed ticks, discarding {} updates and {} subscriptions",
                dest,
                info.consecutive_failures(),
                info.outstanding_updates().len(),
                info.subscribed_to().len()
            );
            stats.destinations_evicted += 1;
            stats.updates_discarded += info.outstanding_updates().len() as u64;
            evicted += 1;
        }
    }
    evicted
}
