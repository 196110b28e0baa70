//! Shared fixtures for unit and scenario tests.

use crate::messages::BulkLocationUpdate;
use crate::store::ObjectState;
use crate::subscription::{Destination, UpdateInfo};
use crate::transport::TransportSink;
use crate::types::{BoundingSphere, Time, TimedMotionQuaternion, TimedMotionVector, Vector3};
use std::collections::HashSet;
use std::fmt::Display;

/// Pending update whose position is `(x, 0, 0)`.
pub(crate) fn update_at(x: f64) -> UpdateInfo {
    UpdateInfo {
        location: TimedMotionVector::stationary(Time::ZERO, Vector3::new(x, 0.0, 0.0)),
        orientation: TimedMotionQuaternion::default(),
        bounds: BoundingSphere::centered(1.0),
        mesh: String::new(),
        physics: String::new(),
        seqno: 0,
    }
}

/// Object state at `position` moving with `velocity`, anchored at `time`.
pub(crate) fn moving_state(time: Time, position: Vector3, velocity: Vector3) -> ObjectState {
    ObjectState::new(TimedMotionVector::new(time, position, velocity), BoundingSphere::centered(1.0))
}

pub(crate) fn state_at(x: f64) -> ObjectState {
    moving_state(Time::ZERO, Vector3::new(x, 0.0, 0.0), Vector3::ZERO)
}

/// Sink that records accepted batches and fails according to a script.
///
/// Destinations are keyed by their `Display` form so one sink serves both
/// server and object-host destinations.
#[derive(Debug, Default)]
pub(crate) struct ScriptedSink {
    attempts: usize,
    fail_on_attempts: HashSet<usize>,
    rejected: HashSet<String>,
    offline: bool,
    sent: Vec<(String, BulkLocationUpdate)>,
}

impl ScriptedSink {
    pub(crate) fn always_accept() -> Self {
        Self::default()
    }

    /// Fails the given 1-based attempt numbers.
    pub(crate) fn fail_on_calls(attempts: impl IntoIterator<Item = usize>) -> Self {
        Self {
            fail_on_attempts: attempts.into_iter().collect(),
            ..Self::default()
        }
    }

    pub(crate) fn reject_destinations<D: Display>(dests: impl IntoIterator<Item = D>) -> Self {
        Self {
            rejected: dests.into_iter().map(|dest| dest.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Rejects every send while offline.
    pub(crate) fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    pub(crate) fn clear_script(&mut self) {
        self.fail_on_attempts.clear();
        self.rejected.clear();
        self.offline = false;
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts
    }

    pub(crate) fn sent_to<D: Display>(&self, dest: &D) -> Vec<BulkLocationUpdate> {
        let key = dest.to_string();
        self.sent
            .iter()
            .filter(|(to, _)| *to == key)
            .map(|(_, batch)| batch.clone())
            .collect()
    }

    pub(crate) fn total_sent(&self) -> usize {
        self.sent.len()
    }
}

impl<D: Destination> TransportSink<D> for ScriptedSink {
    fn try_send(&mut self, destination: &D, message: &BulkLocationUpdate) -> bool {
        self.attempts += 1;
        let key = destination.to_string();
        if self.offline || self.fail_on_attempts.contains(&self.attempts) || self.rejected.contains(&key) {
            return false;
        }
        self.sent.push((key, message.clone()));
        true
    }
}
