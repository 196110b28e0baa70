//! Wire messages produced by the update policy.
//!
//! A [`BulkLocationUpdate`] is what a destination receives on each
//! successful send: an ordered batch of per-object records, each carrying the
//! latest coalesced state of one object.

use crate::store::ObjectRecord;
use crate::subscription::UpdateInfo;
use crate::types::{BoundingSphere, ObjectId, TimedMotionQuaternion, TimedMotionVector};
use serde::{Deserialize, Serialize};

/// Latest known state of one object, as shipped to a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdateRecord {
    pub object: ObjectId,
    /// Sequence number of the authority's record; receivers drop older ones
    pub seqno: u64,
    pub location: TimedMotionVector,
    pub orientation: TimedMotionQuaternion,
    pub bounds: BoundingSphere,
    pub mesh: String,
    pub physics: String,
}

impl LocationUpdateRecord {
    pub fn new(object: ObjectId, info: &UpdateInfo) -> Self {
        Self {
            object,
            seqno: info.seqno,
            location: info.location,
            orientation: info.orientation,
            bounds: info.bounds,
            mesh: info.mesh.clone(),
            physics: info.physics.clone(),
        }
    }
}

impl From<&ObjectRecord> for LocationUpdateRecord {
    fn from(record: &ObjectRecord) -> Self {
        Self::new(record.id, &UpdateInfo::from(record))
    }
}

/// Batch of location updates for a single destination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkLocationUpdate {
    pub updates: Vec<LocationUpdateRecord>,
}

impl BulkLocationUpdate {
    pub fn push(&mut self, record: LocationUpdateRecord) {
        self.updates.push(record);
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Ids of the objects in this batch, in order.
    pub fn objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.updates.iter().map(|record| record.object)
    }
}

impl FromIterator<LocationUpdateRecord> for BulkLocationUpdate {
    fn from_iter<I: IntoIterator<Item = LocationUpdateRecord>>(iter: I) -> Self {
        Self {
            updates: iter.into_iter().collect(),
        }
    }
}
