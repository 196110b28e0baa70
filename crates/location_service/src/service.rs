//! # Location Service
//!
//! The façade the simulation and protocol layers talk to. Every inbound
//! change goes through the same three steps: the record store is updated,
//! listeners are notified, and the update policy queues the new state for
//! current subscribers. Adds only reach listeners; subscribers hear about an
//! object from its first change. [`LocationService::service`] drives the
//! periodic flush.
//!
//! Conflicting or late inputs (updates for removed objects, duplicate adds,
//! replica operations on locally owned objects) come from benign races
//! between servers. They are logged and reported as `false`; nothing here
//! returns an error for them.

use crate::config::LocationServiceConfig;
use crate::error::{ConfigValidationError, LocationError};
use crate::listener::{ListenerFilter, ListenerId, ListenerRegistry, LocationChange, LocationEvent};
use crate::messages::BulkLocationUpdate;
use crate::policy::{FlushSummary, LocationUpdatePolicy, PolicyStats, Subscriber};
use crate::store::{AddOutcome, ObjectRecord, ObjectRecordStore, ObjectState, TrackingKind};
use crate::transport::TransportSink;
use crate::types::{
    BoundingSphere, ObjectId, Quaternion, ServerId, Time, TimedMotionQuaternion, TimedMotionVector, Vector3,
};
use tracing::{debug, info, warn};

/// Location tracking and update distribution for one space server.
pub struct LocationService<S> {
    store: ObjectRecordStore,
    policy: LocationUpdatePolicy<S>,
    listeners: ListenerRegistry,
    config: LocationServiceConfig,
}

impl<S> std::fmt::Debug for LocationService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationService")
            .field("objects", &self.store.len())
            .field("listeners", &self.listeners.len())
            .field("config", &self.config)
            .finish()
    }
}

impl<S> LocationService<S>
where
    S: TransportSink<ServerId> + TransportSink<ObjectId>,
{
    pub fn new(config: LocationServiceConfig, sink: S) -> Result<Self, ConfigValidationError> {
        config.validate()?;
        let policy = LocationUpdatePolicy::new(config.policy.clone(), sink)?;
        info!(
            "📍 Location service ready (max {} updates per message, unsubscribe on remove: {})",
            config.policy.max_updates_per_message, config.unsubscribe_on_remove
        );
        Ok(Self {
            store: ObjectRecordStore::new(),
            policy,
            listeners: ListenerRegistry::new(),
            config,
        })
    }

    // Local objects

    /// Starts tracking an object this server is authoritative for.
    ///
    /// A replica of the same object is replaced: listeners see the replica
    /// removed and the local object added. Existing subscribers are not sent
    /// anything until the object changes.
    pub fn add_local_object(&mut self, id: ObjectId, state: ObjectState) -> bool {
        let outcome = self.store.add_local(id, state.clone());
        self.finish_add(id, state, TrackingKind::Local, outcome)
    }

    /// Starts tracking a synthetic aggregate object owned by this server.
    pub fn add_local_aggregate_object(&mut self, id: ObjectId, state: ObjectState) -> bool {
        let outcome = self.store.add_local_aggregate(id, state.clone());
        self.finish_add(id, state, TrackingKind::Aggregate, outcome)
    }

    pub fn remove_local_object(&mut self, id: &ObjectId) -> bool {
        self.remove_object(id, true)
    }

    pub fn update_local_location(&mut self, id: &ObjectId, location: TimedMotionVector) -> bool {
        self.update_object(id, true, LocationChange::Location(location))
    }

    pub fn update_local_orientation(&mut self, id: &ObjectId, orientation: TimedMotionQuaternion) -> bool {
        self.update_object(id, true, LocationChange::Orientation(orientation))
    }

    pub fn update_local_bounds(&mut self, id: &ObjectId, bounds: BoundingSphere) -> bool {
        self.update_object(id, true, LocationChange::Bounds(bounds))
    }

    pub fn update_local_mesh(&mut self, id: &ObjectId, mesh: impl Into<String>) -> bool {
        self.update_object(id, true, LocationChange::Mesh(mesh.into()))
    }

    pub fn update_local_physics(&mut self, id: &ObjectId, physics: impl Into<String>) -> bool {
        self.update_object(id, true, LocationChange::Physics(physics.into()))
    }

    // Replicas

    /// Starts caching an object owned by another server.
    ///
    /// Never overrides a local object; a repeated add is a no-op.
    pub fn add_replica_object(&mut self, id: ObjectId, state: ObjectState) -> bool {
        let outcome = self.store.add_replica(id, state.clone());
        self.finish_add(id, state, TrackingKind::Replica, outcome)
    }

    pub fn remove_replica_object(&mut self, id: &ObjectId) -> bool {
        self.remove_object(id, false)
    }

    pub fn update_replica_location(&mut self, id: &ObjectId, location: TimedMotionVector) -> bool {
        self.update_object(id, false, LocationChange::Location(location))
    }

    pub fn update_replica_orientation(&mut self, id: &ObjectId, orientation: TimedMotionQuaternion) -> bool {
        self.update_object(id, false, LocationChange::Orientation(orientation))
    }

    pub fn update_replica_bounds(&mut self, id: &ObjectId, bounds: BoundingSphere) -> bool {
        self.update_object(id, false, LocationChange::Bounds(bounds))
    }

    pub fn update_replica_mesh(&mut self, id: &ObjectId, mesh: impl Into<String>) -> bool {
        self.update_object(id, false, LocationChange::Mesh(mesh.into()))
    }

    pub fn update_replica_physics(&mut self, id: &ObjectId, physics: impl Into<String>) -> bool {
        self.update_object(id, false, LocationChange::Physics(physics.into()))
    }

    /// Applies a batch received from peer server `from` to the replicas it
    /// describes. Records for unknown or locally owned objects are skipped,
    /// as are records from `from` older than the last one it sent. Returns
    /// how many were applied.
    pub fn apply_bulk_update(&mut self, from: ServerId, message: &BulkLocationUpdate) -> usize {
        let mut applied = 0;
        for update in &message.updates {
            let before = match self.store.get(&update.object) {
                Some(record) => record.state(),
                None => {
                    debug!("{} sent an update for untracked object {}", from, update.object);
                    continue;
                }
            };
            let record = match self.store.apply_record(from, update) {
                Ok(record) => record,
                Err(e) => {
                    debug!("Skipping update from {}: {}", from, e);
                    continue;
                }
            };
            for change in changes_between(&before, record) {
                self.listeners
                    .notify(&LocationEvent::new(record.id, record.tracking, change));
            }
            self.policy.object_updated(record);
            applied += 1;
        }
        debug!("Applied {}/{} updates from {}", applied, message.len(), from);
        applied
    }

    // Subscriptions

    pub fn subscribe(&mut self, subscriber: impl Into<Subscriber>, object: ObjectId) -> bool {
        self.policy.subscribe(subscriber.into(), object)
    }

    /// Already queued updates for `object` are still delivered.
    pub fn unsubscribe(&mut self, subscriber: impl Into<Subscriber>, object: &ObjectId) -> bool {
        self.policy.unsubscribe(subscriber.into(), object)
    }

    pub fn unsubscribe_all(&mut self, subscriber: impl Into<Subscriber>) -> usize {
        self.policy.unsubscribe_all(subscriber.into())
    }

    /// Periodic tick: ships outstanding updates.
    pub fn service(&mut self) -> FlushSummary {
        self.policy.service()
    }

    fn finish_add(
        &mut self,
        id: ObjectId,
        state: ObjectState,
        tracking: TrackingKind,
        outcome: Result<AddOutcome, LocationError>,
    ) -> bool {
        match outcome {
            Ok(AddOutcome::Inserted) => {}
            Ok(AddOutcome::Replaced(previous)) => {
                debug!("{} {} replaced by {} copy", previous, id, tracking);
                self.listeners
                    .notify(&LocationEvent::new(id, previous, LocationChange::Removed));
            }
            Err(LocationError::DuplicateObject(_)) if tracking == TrackingKind::Replica => {
                debug!("Replica {} already tracked", id);
                return false;
            }
            Err(e) => {
                warn!("Ignoring {} add: {}", tracking, e);
                return false;
            }
        }

        self.listeners
            .notify(&LocationEvent::new(id, tracking, LocationChange::Added(state)));
        true
    }

    fn remove_object(&mut self, id: &ObjectId, local: bool) -> bool {
        match self.store.tracking(id) {
            None => {
                debug!("Ignoring removal of untracked object {}", id);
                return false;
            }
            Some(tracking) if tracking.is_authoritative() != local => {
                warn!("Ignoring {} removal of {} object {}", expected(local), tracking, id);
                return false;
            }
            Some(_) => {}
        }

        let Some(record) = self.store.remove(id) else {
            return false;
        };
        self.listeners
            .notify(&LocationEvent::new(*id, record.tracking, LocationChange::Removed));
        if self.config.unsubscribe_on_remove {
            let purged = self.policy.object_removed(id);
            debug!("Removed {} from {} interest sets", id, purged);
        }
        true
    }

    fn update_object(&mut self, id: &ObjectId, local: bool, change: LocationChange) -> bool {
        match self.store.tracking(id) {
            None => {
                warn!("Ignoring {:?} update for unknown object {}", change.kind(), id);
                return false;
            }
            Some(tracking) if tracking.is_authoritative() != local => {
                warn!(
                    "Ignoring {} {:?} update for {} object {}",
                    expected(local),
                    change.kind(),
                    tracking,
                    id
                );
                return false;
            }
            Some(_) => {}
        }

        let result = match &change {
            LocationChange::Location(location) => self.store.update_location(id, *location),
            LocationChange::Orientation(orientation) => self.store.update_orientation(id, *orientation),
            LocationChange::Bounds(bounds) => self.store.update_bounds(id, *bounds),
            LocationChange::Mesh(mesh) => self.store.update_mesh(id, mesh.clone()),
            LocationChange::Physics(physics) => self.store.update_physics(id, physics.clone()),
            LocationChange::Added(_) | LocationChange::Removed => return false,
        };
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("Update rejected: {}", e);
                return false;
            }
        };

        self.listeners
            .notify(&LocationEvent::new(*id, record.tracking, change));
        self.policy.object_updated(record);
        true
    }
}

impl<S> LocationService<S> {
    pub fn add_listener<F>(&mut self, filter: ListenerFilter, callback: F) -> ListenerId
    where
        F: FnMut(&LocationEvent) + Send + 'static,
    {
        self.listeners.add_listener(filter, callback)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove_listener(id)
    }

    // Queries

    pub fn object(&self, id: &ObjectId) -> Option<&ObjectRecord> {
        self.store.get(id)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.store.contains(id)
    }

    pub fn tracking(&self, id: &ObjectId) -> Option<TrackingKind> {
        self.store.tracking(id)
    }

    /// Predicted position of `id` at `at`.
    pub fn location(&self, id: &ObjectId, at: Time) -> Option<Vector3> {
        self.store.location(id, at)
    }

    pub fn orientation(&self, id: &ObjectId, at: Time) -> Option<Quaternion> {
        self.store.orientation(id, at)
    }

    pub fn store(&self) -> &ObjectRecordStore {
        &self.store
    }

    pub fn policy(&self) -> &LocationUpdatePolicy<S> {
        &self.policy
    }

    pub fn stats(&self) -> &PolicyStats {
        self.policy.stats()
    }

    pub fn config(&self) -> &LocationServiceConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        self.policy.sink()
    }

    pub fn sink_mut(&mut self) -> &mut S {
        self.policy.sink_mut()
    }
}

fn expected(local: bool) -> &'static str {
    if local {
        "local"
    } else {
        "replica"
    }
}

/// Per-field changes between a record's previous state and its current one.
fn changes_between(before: &ObjectState, after: &ObjectRecord) -> Vec<LocationChange> {
    let mut changes = Vec::new();
    if before.location != after.location {
        changes.push(LocationChange::Location(after.location));
    }
    if before.orientation != after.orientation {
        changes.push(LocationChange::Orientation(after.orientation));
    }
    if before.bounds != after.bounds {
        changes.push(LocationChange::Bounds(after.bounds));
    }
    if before.mesh != after.mesh {
        changes.push(LocationChange::Mesh(after.mesh.clone()));
    }
    if before.physics != after.physics {
        changes.push(LocationChange::Physics(after.physics.clone()));
    }
    changes
}
