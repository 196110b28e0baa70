//! # Synthetic Workload
//!
//! Drives a [`LocationService`] the way a live space server would: objects
//! wander around the region, peers replicate them, object hosts subscribe to
//! what they care about, and objects occasionally migrate to a neighbour and
//! come back.

use crate::config::SimulationSettings;
use location_service::{
    BoundingSphere, BulkLocationUpdate, LocationService, LocationUpdateRecord, ObjectId, ObjectState,
    ServerId, Time, TimedMotionVector, TransportSink, Vector3,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

/// What one simulation step did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    pub moved: usize,
    pub migrated_away: usize,
    pub migrated_back: usize,
    pub replica_updates: usize,
}

/// Randomised object movement and migration.
#[derive(Debug)]
pub struct Simulation {
    settings: SimulationSettings,
    rng: StdRng,
    peers: Vec<ServerId>,
    local: Vec<ObjectId>,
    replicas: Vec<ObjectId>,
    /// Objects currently owned by a peer after migrating away
    migrated: Vec<ObjectId>,
    hosts: Vec<ObjectId>,
}

impl Simulation {
    pub fn new(settings: SimulationSettings, peers: Vec<ServerId>) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let hosts = (0..settings.object_hosts).map(|_| ObjectId::new()).collect();
        Self {
            settings,
            rng,
            peers,
            local: Vec::new(),
            replicas: Vec::new(),
            migrated: Vec::new(),
            hosts,
        }
    }

    /// Object hosts that will subscribe; each needs an outbound link.
    pub fn hosts(&self) -> &[ObjectId] {
        &self.hosts
    }

    pub fn local_objects(&self) -> &[ObjectId] {
        &self.local
    }

    /// Creates the initial objects and subscriptions.
    pub fn populate<S>(&mut self, service: &mut LocationService<S>, now: Time)
    where
        S: TransportSink<ServerId> + TransportSink<ObjectId>,
    {
        for _ in 0..self.settings.local_objects {
            let id = ObjectId::new();
            let state = self.random_state(now);
            if service.add_local_object(id, state) {
                self.local.push(id);
            }
        }
        for _ in 0..self.settings.replica_objects {
            let id = ObjectId::new();
            let state = self.random_state(now);
            if service.add_replica_object(id, state) {
                self.replicas.push(id);
            }
        }

        // every peer replicates every local object
        for peer in &self.peers {
            for object in &self.local {
                service.subscribe(*peer, *object);
            }
        }

        let mut watchable: Vec<ObjectId> = self.local.iter().chain(self.replicas.iter()).copied().collect();
        for host in &self.hosts {
            watchable.shuffle(&mut self.rng);
            for object in watchable.iter().take(self.settings.subscriptions_per_host) {
                service.subscribe(*host, *object);
            }
        }

        info!(
            "🌌 Populated {} local objects, {} replicas, {} peers, {} object hosts",
            self.local.len(),
            self.replicas.len(),
            self.peers.len(),
            self.hosts.len()
        );
    }

    /// Advances the world to `now`.
    pub fn step<S>(&mut self, service: &mut LocationService<S>, now: Time) -> StepReport
    where
        S: TransportSink<ServerId> + TransportSink<ObjectId>,
    {
        let mut report = StepReport::default();

        for object in self.local.clone() {
            if !self.rng.gen_bool(self.settings.move_fraction) {
                continue;
            }
            let Some(position) = service.location(&object, now) else {
                continue;
            };
            let motion = TimedMotionVector::new(now, self.clamp(position), self.random_velocity());
            if service.update_local_location(&object, motion) {
                report.moved += 1;
            }
        }

        report.replica_updates = self.replicate_from_peers(service, now);

        if !self.local.is_empty() && self.rng.gen_bool(self.settings.migration_chance) {
            let index = self.rng.gen_range(0..self.local.len());
            let object = self.local.swap_remove(index);
            if self.migrate_away(service, object, now) {
                report.migrated_away += 1;
            }
        }
        if !self.migrated.is_empty() && self.rng.gen_bool(self.settings.migration_chance) {
            let index = self.rng.gen_range(0..self.migrated.len());
            let object = self.migrated.swap_remove(index);
            if self.migrate_back(service, object, now) {
                report.migrated_back += 1;
            }
        }

        report
    }

    /// Hands `object` to a peer: removed here, then tracked as a replica.
    fn migrate_away<S>(&mut self, service: &mut LocationService<S>, object: ObjectId, now: Time) -> bool
    where
        S: TransportSink<ServerId> + TransportSink<ObjectId>,
    {
        let Some(record) = service.object(&object) else {
            return false;
        };
        let state = record.state();
        if !service.remove_local_object(&object) {
            return false;
        }
        for peer in &self.peers {
            service.unsubscribe(*peer, &object);
        }
        if service.add_replica_object(object, state) {
            debug!("{} migrated away at {}s", object, now.as_secs_f64());
            self.migrated.push(object);
        }
        true
    }

    /// Takes `object` back; the local add replaces the replica.
    fn migrate_back<S>(&mut self, service: &mut LocationService<S>, object: ObjectId, now: Time) -> bool
    where
        S: TransportSink<ServerId> + TransportSink<ObjectId>,
    {
        let state = match service.object(&object) {
            Some(record) => record.state(),
            None => self.random_state(now),
        };
        if !service.add_local_object(object, state) {
            return false;
        }
        for peer in &self.peers {
            service.subscribe(*peer, object);
        }
        debug!("{} migrated back at {}s", object, now.as_secs_f64());
        self.local.push(object);
        true
    }

    /// Feeds replica movement as if it arrived from the owning peers.
    fn replicate_from_peers<S>(&mut self, service: &mut LocationService<S>, now: Time) -> usize
    where
        S: TransportSink<ServerId> + TransportSink<ObjectId>,
    {
        let Some(from) = self.peers.first().copied() else {
            return 0;
        };
        let remote: Vec<ObjectId> = self.replicas.iter().chain(self.migrated.iter()).copied().collect();
        let mut message = BulkLocationUpdate::default();
        for object in &remote {
            if !self.rng.gen_bool(self.settings.move_fraction) {
                continue;
            }
            let Some(record) = service.object(object) else {
                continue;
            };
            let mut update = LocationUpdateRecord::from(record);
            update.seqno = record.seqno + 1;
            let position = record.location.extrapolate(now);
            update.location = TimedMotionVector::new(now, position, self.random_velocity());
            message.push(update);
        }
        if message.is_empty() {
            return 0;
        }
        service.apply_bulk_update(from, &message)
    }

    fn random_state(&mut self, now: Time) -> ObjectState {
        let extent = self.settings.region_extent;
        let position = Vector3::new(
            self.rng.gen_range(-extent..extent),
            self.rng.gen_range(-extent..extent),
            self.rng.gen_range(-extent..extent),
        );
        let radius = self.rng.gen_range(0.5..10.0);
        ObjectState::new(
            TimedMotionVector::new(now, position, self.random_velocity()),
            BoundingSphere::centered(radius),
        )
        .with_mesh(format!("meerkat:///models/{}.dae", self.rng.gen_range(0..16)))
    }

    fn random_velocity(&mut self) -> Vector3 {
        let speed = self.settings.max_speed;
        if speed <= 0.0 {
            return Vector3::ZERO;
        }
        Vector3::new(
            self.rng.gen_range(-speed..=speed),
            self.rng.gen_range(-speed..=speed),
            self.rng.gen_range(-speed..=speed),
        )
    }

    /// Keeps a predicted position inside the region.
    fn clamp(&self, position: Vector3) -> Vector3 {
        let extent = self.settings.region_extent;
        Vector3::new(
            position.x.clamp(-extent, extent),
            position.y.clamp(-extent, extent),
            position.z.clamp(-extent, extent),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelSink;
    use location_service::{LocationServiceConfig, TrackingKind};

    fn settings() -> SimulationSettings {
        SimulationSettings {
            local_objects: 20,
            replica_objects: 5,
            object_hosts: 2,
            subscriptions_per_host: 4,
            move_fraction: 1.0,
            migration_chance: 1.0,
            seed: Some(7),
            ..Default::default()
        }
    }

    fn service() -> LocationService<ChannelSink> {
        LocationService::new(LocationServiceConfig::default(), ChannelSink::new()).unwrap()
    }

    #[test]
    fn test_populate_subscribes_peers_and_hosts() {
        let mut service = service();
        let mut simulation = Simulation::new(settings(), vec![ServerId(2), ServerId(3)]);
        simulation.populate(&mut service, Time::ZERO);

        assert_eq!(service.store().len(), 25);
        let servers = service.policy().server_subscriptions();
        assert_eq!(servers.subscriptions_of(&ServerId(2)).count(), 20);
        let hosts = service.policy().object_subscriptions();
        for host in simulation.hosts() {
            assert_eq!(hosts.subscriptions_of(host).count(), 4);
        }
    }

    #[test]
    fn test_step_moves_and_migrates() {
        let mut service = service();
        let mut simulation = Simulation::new(settings(), vec![ServerId(2)]);
        simulation.populate(&mut service, Time::ZERO);

        let first = simulation.step(&mut service, Time::from_secs_f64(0.05));
        assert_eq!(first.moved, 20);
        assert_eq!(first.replica_updates, 5);
        assert_eq!(first.migrated_away, 1);
        assert_eq!(first.migrated_back, 1);

        // everything that migrated came straight back
        assert_eq!(simulation.local_objects().len(), 20);
        for object in simulation.local_objects() {
            assert_eq!(service.tracking(object), Some(TrackingKind::Local));
            assert!(service.policy().server_subscriptions().is_subscribed(&ServerId(2), object));
        }
    }

    #[test]
    fn test_no_peers_means_no_inbound_replication() {
        let mut service = service();
        let mut simulation = Simulation::new(settings(), vec![]);
        simulation.populate(&mut service, Time::ZERO);

        let report = simulation.step(&mut service, Time::from_secs_f64(0.05));
        assert_eq!(report.replica_updates, 0);
        assert_eq!(service.policy().server_subscriptions().destination_count(), 0);
    }
}
