//! # Object Record Store
//!
//! Single source of truth for per-object spatial, mesh and physics state on
//! this space server. Pure data plus accessors; fan-out to listeners and
//! subscribers happens in the [`LocationService`](crate::LocationService).
//!
//! Authority rules:
//!
//! - A local add overwrites a stale replica (local authority wins)
//! - A replica add never overwrites a local or aggregate object
//! - Updates for unknown objects are refused, so a late update never
//!   resurrects an object removed moments earlier

use crate::error::LocationError;
use crate::messages::LocationUpdateRecord;
use crate::types::{
    BoundingSphere, ObjectId, Quaternion, ServerId, Time, TimedMotionQuaternion, TimedMotionVector, Vector3,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How this server relates to an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingKind {
    /// Authoritative copy owned by this server
    Local,
    /// Synthetic object owned by this server (e.g. a spatial summary)
    Aggregate,
    /// Cached copy whose authority lives on another server
    Replica,
}

impl TrackingKind {
    /// Whether this server is the authority for the object.
    pub fn is_authoritative(&self) -> bool {
        matches!(self, TrackingKind::Local | TrackingKind::Aggregate)
    }
}

impl std::fmt::Display for TrackingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackingKind::Local => write!(f, "local"),
            TrackingKind::Aggregate => write!(f, "aggregate"),
            TrackingKind::Replica => write!(f, "replica"),
        }
    }
}

/// Properties an object is created with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectState {
    pub location: TimedMotionVector,
    pub orientation: TimedMotionQuaternion,
    pub bounds: BoundingSphere,
    /// Mesh URI, opaque to this service
    pub mesh: String,
    /// Physics profile, opaque to this service
    pub physics: String,
}

impl ObjectState {
    /// State with an identity orientation and no mesh or physics descriptor.
    pub fn new(location: TimedMotionVector, bounds: BoundingSphere) -> Self {
        Self {
            location,
            orientation: TimedMotionQuaternion::stationary(location.time, Quaternion::IDENTITY),
            bounds,
            mesh: String::new(),
            physics: String::new(),
        }
    }

    pub fn with_orientation(mut self, orientation: TimedMotionQuaternion) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_mesh(mut self, mesh: impl Into<String>) -> Self {
        self.mesh = mesh.into();
        self
    }

    pub fn with_physics(mut self, physics: impl Into<String>) -> Self {
        self.physics = physics.into();
        self
    }
}

/// Everything this server knows about one object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    pub id: ObjectId,
    pub location: TimedMotionVector,
    pub orientation: TimedMotionQuaternion,
    pub bounds: BoundingSphere,
    pub mesh: String,
    pub physics: String,
    pub tracking: TrackingKind,
    /// Bumped on every mutation; for replicas fed from the authority this is
    /// the authority's sequence number.
    pub seqno: u64,
    /// Server whose records this replica last applied. Sequence numbers are
    /// only comparable between records from the same authority.
    pub authority: Option<ServerId>,
}

impl ObjectRecord {
    fn new(id: ObjectId, state: ObjectState, tracking: TrackingKind) -> Self {
        Self {
            id,
            location: state.location,
            orientation: state.orientation,
            bounds: state.bounds,
            mesh: state.mesh,
            physics: state.physics,
            tracking,
            seqno: 0,
            authority: None,
        }
    }

    /// Snapshot of the record's mutable state.
    pub fn state(&self) -> ObjectState {
        ObjectState {
            location: self.location,
            orientation: self.orientation,
            bounds: self.bounds,
            mesh: self.mesh.clone(),
            physics: self.physics.clone(),
        }
    }

    fn touch(&mut self) {
        self.seqno = self.seqno.wrapping_add(1);
    }
}

/// Result of a successful add.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The object was not tracked before
    Inserted,
    /// A stale record of the given kind was overwritten
    Replaced(TrackingKind),
}

/// Per-object record storage for one space server.
#[derive(Debug, Default)]
pub struct ObjectRecordStore {
    objects: HashMap<ObjectId, ObjectRecord>,
}

impl ObjectRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object this server is authoritative for.
    ///
    /// Refused if the object is already local or aggregate here. A replica
    /// record is overwritten: the object migrated to this server.
    pub fn add_local(&mut self, id: ObjectId, state: ObjectState) -> Result<AddOutcome, LocationError> {
        self.add_authoritative(id, state, TrackingKind::Local)
    }

    /// Adds a synthetic aggregate object owned by this server.
    pub fn add_local_aggregate(&mut self, id: ObjectId, state: ObjectState) -> Result<AddOutcome, LocationError> {
        self.add_authoritative(id, state, TrackingKind::Aggregate)
    }

    fn add_authoritative(
        &mut self,
        id: ObjectId,
        state: ObjectState,
        tracking: TrackingKind,
    ) -> Result<AddOutcome, LocationError> {
        let outcome = match self.objects.get(&id) {
            Some(existing) if existing.tracking.is_authoritative() => {
                return Err(LocationError::DuplicateObject(id));
            }
            Some(existing) => AddOutcome::Replaced(existing.tracking),
            None => AddOutcome::Inserted,
        };
        self.objects.insert(id, ObjectRecord::new(id, state, tracking));
        Ok(outcome)
    }

    /// Adds a cached copy of an object owned by another server.
    ///
    /// Never downgrades local authority; a repeated replica add is a no-op.
    pub fn add_replica(&mut self, id: ObjectId, state: ObjectState) -> Result<AddOutcome, LocationError> {
        match self.objects.get(&id) {
            Some(existing) if existing.tracking.is_authoritative() => Err(LocationError::NotAuthoritative(id)),
            Some(_) => Err(LocationError::DuplicateObject(id)),
            None => {
                self.objects.insert(id, ObjectRecord::new(id, state, TrackingKind::Replica));
                Ok(AddOutcome::Inserted)
            }
        }
    }

    /// Removes an object regardless of its tracking kind.
    pub fn remove(&mut self, id: &ObjectId) -> Option<ObjectRecord> {
        self.objects.remove(id)
    }

    pub fn update_location(&mut self, id: &ObjectId, location: TimedMotionVector) -> Result<&ObjectRecord, LocationError> {
        self.mutate(id, |record| record.location = location)
    }

    pub fn update_orientation(
        &mut self,
        id: &ObjectId,
        orientation: TimedMotionQuaternion,
    ) -> Result<&ObjectRecord, LocationError> {
        self.mutate(id, |record| record.orientation = orientation)
    }

    pub fn update_bounds(&mut self, id: &ObjectId, bounds: BoundingSphere) -> Result<&ObjectRecord, LocationError> {
        self.mutate(id, |record| record.bounds = bounds)
    }

    pub fn update_mesh(&mut self, id: &ObjectId, mesh: String) -> Result<&ObjectRecord, LocationError> {
        self.mutate(id, |record| record.mesh = mesh)
    }

    pub fn update_physics(&mut self, id: &ObjectId, physics: String) -> Result<&ObjectRecord, LocationError> {
        self.mutate(id, |record| record.physics = physics)
    }

    fn mutate<F>(&mut self, id: &ObjectId, apply: F) -> Result<&ObjectRecord, LocationError>
    where
        F: FnOnce(&mut ObjectRecord),
    {
        let record = self.objects.get_mut(id).ok_or(LocationError::UnknownObject(*id))?;
        apply(record);
        record.touch();
        Ok(record)
    }

    /// Applies a full record received from `from`, the object's authority.
    ///
    /// Only replicas accept remote records. Records from the current
    /// authority that are older than the stored sequence number are refused;
    /// a record from a different server re-anchors the replica on that
    /// server's sequence, since a migrated object restarts its count.
    pub fn apply_record(
        &mut self,
        from: ServerId,
        update: &LocationUpdateRecord,
    ) -> Result<&ObjectRecord, LocationError> {
        let record = self
            .objects
            .get_mut(&update.object)
            .ok_or(LocationError::UnknownObject(update.object))?;

        if record.tracking != TrackingKind::Replica {
            return Err(LocationError::NotAuthoritative(update.object));
        }
        if record.authority == Some(from) && update.seqno < record.seqno {
            return Err(LocationError::StaleUpdate {
                object: update.object,
                seqno: update.seqno,
                current: record.seqno,
            });
        }

        record.location = update.location;
        record.orientation = update.orientation;
        record.bounds = update.bounds;
        record.mesh.clone_from(&update.mesh);
        record.physics.clone_from(&update.physics);
        record.seqno = update.seqno;
        record.authority = Some(from);
        Ok(record)
    }

    /// Predicted position of an object at `at`.
    pub fn location(&self, id: &ObjectId, at: Time) -> Option<Vector3> {
        self.objects.get(id).map(|record| record.location.extrapolate(at))
    }

    /// Predicted orientation of an object at `at`.
    pub fn orientation(&self, id: &ObjectId, at: Time) -> Option<Quaternion> {
        self.objects.get(id).map(|record| record.orientation.extrapolate(at))
    }

    pub fn get(&self, id: &ObjectId) -> Option<&ObjectRecord> {
        self.objects.get(id)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    pub fn tracking(&self, id: &ObjectId) -> Option<TrackingKind> {
        self.objects.get(id).map(|record| record.tracking)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
