//! # Subscriber Index
//!
//! Forward and reverse subscription maps plus the per-destination queue of
//! coalesced, not-yet-sent updates.
//!
//! One generic index serves both destination kinds: remote space servers
//! (`SubscriberIndex<ServerId>`) and object hosts subscribed on behalf of an
//! object (`SubscriberIndex<ObjectId>`).
//!
//! ## Lifecycle of a destination
//!
//! ```text
//! NoSubscription -> Subscribed -> {pending, clean} -> (unsubscribe) -> Draining -> Gone
//! ```
//!
//! A destination is only dropped by [`SubscriberIndex::flush`] once it has
//! neither subscriptions nor outstanding updates, so unsubscribing never
//! discards data that was already queued.

use crate::messages::{BulkLocationUpdate, LocationUpdateRecord};
use crate::store::ObjectRecord;
use crate::transport::TransportSink;
use crate::types::{BoundingSphere, ObjectId, TimedMotionQuaternion, TimedMotionVector};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::ops::Bound;
use tracing::{debug, trace};

/// Identity of an update destination.
///
/// Blanket-implemented for every orderable, hashable, printable `Copy` type.
pub trait Destination: Copy + Ord + Hash + Debug + Display {}

impl<T: Copy + Ord + Hash + Debug + Display> Destination for T {}

/// Latest pending state of one object for one destination.
///
/// Repeated updates before a flush overwrite this in place; intermediate
/// values are never replayed.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateInfo {
    pub location: TimedMotionVector,
    pub orientation: TimedMotionQuaternion,
    pub bounds: BoundingSphere,
    pub mesh: String,
    pub physics: String,
    pub seqno: u64,
}

impl From<&ObjectRecord> for UpdateInfo {
    fn from(record: &ObjectRecord) -> Self {
        Self {
            location: record.location,
            orientation: record.orientation,
            bounds: record.bounds,
            mesh: record.mesh.clone(),
            physics: record.physics.clone(),
            seqno: record.seqno,
        }
    }
}

/// Subscription and queue state for a single destination.
#[derive(Debug, Default)]
pub struct SubscriberInfo {
    subscribed_to: BTreeSet<ObjectId>,
    outstanding_updates: BTreeMap<ObjectId, UpdateInfo>,
    consecutive_failures: u32,
}

impl SubscriberInfo {
    pub fn subscribed_to(&self) -> &BTreeSet<ObjectId> {
        &self.subscribed_to
    }

    pub fn outstanding_updates(&self) -> &BTreeMap<ObjectId, UpdateInfo> {
        &self.outstanding_updates
    }

    /// Ticks in a row that ended with a failed send and no successful one.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn is_garbage(&self) -> bool {
        self.subscribed_to.is_empty() && self.outstanding_updates.is_empty()
    }
}

/// Outcome of one [`SubscriberIndex::flush`] pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport<D> {
    /// Batches accepted by the sink
    pub messages_sent: usize,
    /// Records contained in the accepted batches
    pub updates_sent: usize,
    /// Destinations whose send failed this pass
    pub failed: Vec<D>,
    /// Destinations garbage-collected at the end of the pass
    pub collected: usize,
}

impl<D> Default for FlushReport<D> {
    fn default() -> Self {
        Self {
            messages_sent: 0,
            updates_sent: 0,
            failed: Vec::new(),
            collected: 0,
        }
    }
}

/// Bidirectional subscription index over destinations of type `D`.
#[derive(Debug)]
pub struct SubscriberIndex<D: Destination> {
    subscribers: BTreeMap<D, SubscriberInfo>,
    object_subscribers: HashMap<ObjectId, BTreeSet<D>>,
}

impl<D: Destination> Default for SubscriberIndex<D> {
    fn default() -> Self {
        Self {
            subscribers: BTreeMap::new(),
            object_subscribers: HashMap::new(),
        }
    }
}

impl<D: Destination> SubscriberIndex<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `dest` to `object`. Returns `false` if it already was.
    pub fn subscribe(&mut self, dest: D, object: ObjectId) -> bool {
        let added = self.subscribers.entry(dest).or_default().subscribed_to.insert(object);
        self.object_subscribers.entry(object).or_default().insert(dest);
        if added {
            trace!("{} subscribed to {}", dest, object);
        }
        added
    }

    /// Removes one subscription in both directions.
    ///
    /// Updates for `object` already queued for `dest` stay queued and are
    /// delivered by the next flush.
    pub fn unsubscribe(&mut self, dest: D, object: &ObjectId) -> bool {
        let removed = self
            .subscribers
            .get_mut(&dest)
            .map(|info| info.subscribed_to.remove(object))
            .unwrap_or(false);
        self.remove_reverse(object, &dest);
        if removed {
            trace!("{} unsubscribed from {}", dest, object);
        }
        removed
    }

    /// Unsubscribes `dest` from everything it tracks.
    ///
    /// The destination is flushed once more if it still has outstanding
    /// updates and is collected afterwards. Returns the number of
    /// subscriptions removed.
    pub fn unsubscribe_all(&mut self, dest: D) -> usize {
        let Some(info) = self.subscribers.get_mut(&dest) else {
            return 0;
        };
        let objects = std::mem::take(&mut info.subscribed_to);
        for object in &objects {
            Self::remove_reverse_in(&mut self.object_subscribers, object, &dest);
        }
        debug!(
            "{} unsubscribed from {} objects ({} updates left to drain)",
            dest,
            objects.len(),
            info.outstanding_updates.len()
        );
        objects.len()
    }

    /// Drops `object` from every destination's interest set.
    ///
    /// Outstanding updates for the object are kept and drained. Returns the
    /// number of destinations that were subscribed.
    pub fn purge_object(&mut self, object: &ObjectId) -> usize {
        let Some(dests) = self.object_subscribers.remove(object) else {
            return 0;
        };
        for dest in &dests {
            if let Some(info) = self.subscribers.get_mut(dest) {
                info.subscribed_to.remove(object);
            }
        }
        dests.len()
    }

    /// Removes `dest` immediately, discarding its outstanding updates.
    pub fn evict(&mut self, dest: D) -> Option<SubscriberInfo> {
        let info = self.subscribers.remove(&dest)?;
        for object in &info.subscribed_to {
            Self::remove_reverse_in(&mut self.object_subscribers, object, &dest);
        }
        Some(info)
    }

    /// Queues the latest state of `object` for each of its subscribers.
    ///
    /// An existing pending entry is overwritten, so subscribers only ever see
    /// the newest value. Without subscribers nothing is queued. Returns the
    /// number of destinations the update was queued for.
    pub fn record_update(&mut self, object: &ObjectId, update: &UpdateInfo) -> usize {
        let Some(dests) = self.object_subscribers.get(object) else {
            return 0;
        };
        for dest in dests {
            let Some(info) = self.subscribers.get_mut(dest) else {
                continue;
            };
            match info.outstanding_updates.entry(*object) {
                Entry::Occupied(mut pending) => pending.get_mut().clone_from(update),
                Entry::Vacant(slot) => {
                    slot.insert(update.clone());
                }
            }
        }
        dests.len()
    }

    /// Ships outstanding updates through `sink`.
    ///
    /// Each destination's queue is cut into batches of at most `max_batch`
    /// records in object-id order. Batches are sent one after another until
    /// the queue is empty or a send fails; the failed batch and everything
    /// after it stay queued for the next call. Only the prefix the sink
    /// accepted is removed. Destinations left without subscriptions or
    /// outstanding updates are collected at the end.
    pub fn flush<S>(&mut self, max_batch: usize, sink: &mut S) -> FlushReport<D>
    where
        S: TransportSink<D> + ?Sized,
    {
        let max_batch = max_batch.max(1);
        let mut report = FlushReport::default();

        for (dest, info) in self.subscribers.iter_mut() {
            if info.outstanding_updates.is_empty() {
                continue;
            }

            let mut last_shipped: Option<ObjectId> = None;
            let mut failed = false;
            loop {
                let pending = match last_shipped {
                    Some(cursor) => info
                        .outstanding_updates
                        .range((Bound::Excluded(cursor), Bound::Unbounded)),
                    None => info.outstanding_updates.range::<ObjectId, _>(..),
                };
                let batch: BulkLocationUpdate = pending
                    .take(max_batch)
                    .map(|(object, update)| LocationUpdateRecord::new(*object, update))
                    .collect();
                if batch.is_empty() {
                    break;
                }

                if !sink.try_send(dest, &batch) {
                    failed = true;
                    break;
                }
                report.messages_sent += 1;
                report.updates_sent += batch.len();
                last_shipped = batch.updates.last().map(|record| record.object);
            }

            if let Some(cursor) = last_shipped {
                let mut remaining = info.outstanding_updates.split_off(&cursor);
                remaining.remove(&cursor);
                info.outstanding_updates = remaining;
                info.consecutive_failures = 0;
            } else if failed {
                info.consecutive_failures = info.consecutive_failures.saturating_add(1);
            }

            if failed {
                debug!(
                    "Send to {} failed, {} updates deferred",
                    dest,
                    info.outstanding_updates.len()
                );
                report.failed.push(*dest);
            }
        }

        let before = self.subscribers.len();
        self.subscribers.retain(|_, info| !info.is_garbage());
        report.collected = before - self.subscribers.len();
        report
    }

    fn remove_reverse(&mut self, object: &ObjectId, dest: &D) {
        Self::remove_reverse_in(&mut self.object_subscribers, object, dest);
    }

    fn remove_reverse_in(reverse: &mut HashMap<ObjectId, BTreeSet<D>>, object: &ObjectId, dest: &D) {
        if let Some(dests) = reverse.get_mut(object) {
            dests.remove(dest);
            if dests.is_empty() {
                reverse.remove(object);
            }
        }
    }

    // Queries

    /// Number of destinations currently tracked, including draining ones.
    pub fn destination_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn has_destination(&self, dest: &D) -> bool {
        self.subscribers.contains_key(dest)
    }

    pub fn info(&self, dest: &D) -> Option<&SubscriberInfo> {
        self.subscribers.get(dest)
    }

    pub fn is_subscribed(&self, dest: &D, object: &ObjectId) -> bool {
        self.subscribers
            .get(dest)
            .map(|info| info.subscribed_to.contains(object))
            .unwrap_or(false)
    }

    pub fn subscribers_of(&self, object: &ObjectId) -> impl Iterator<Item = D> + '_ {
        self.object_subscribers.get(object).into_iter().flatten().copied()
    }

    pub fn subscriptions_of(&self, dest: &D) -> impl Iterator<Item = ObjectId> + '_ {
        self.subscribers
            .get(dest)
            .into_iter()
            .flat_map(|info| info.subscribed_to.iter().copied())
    }

    pub fn outstanding_count(&self, dest: &D) -> usize {
        self.subscribers
            .get(dest)
            .map(|info| info.outstanding_updates.len())
            .unwrap_or(0)
    }

    pub fn pending_update(&self, dest: &D, object: &ObjectId) -> Option<&UpdateInfo> {
        self.subscribers.get(dest)?.outstanding_updates.get(object)
    }

    pub fn total_outstanding(&self) -> usize {
        self.subscribers.values().map(|info| info.outstanding_updates.len()).sum()
    }

    pub fn consecutive_failures(&self, dest: &D) -> u32 {
        self.subscribers
            .get(dest)
            .map(|info| info.consecutive_failures)
            .unwrap_or(0)
    }

    /// Number of objects with at least one subscriber.
    pub fn watched_object_count(&self) -> usize {
        self.object_subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{update_at, ScriptedSink};
    use crate::types::ServerId;

    fn ids(n: usize) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = (0..n).map(|_| ObjectId::new()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_subscribe_is_idempotent_and_bidirectional() {
        let mut index = SubscriberIndex::new();
        let object = ObjectId::new();

        assert!(index.subscribe(ServerId(1), object));
        assert!(!index.subscribe(ServerId(1), object));
        assert!(index.subscribe(ServerId(2), object));

        assert!(index.is_subscribed(&ServerId(1), &object));
        let subscribers: Vec<_> = index.subscribers_of(&object).collect();
        assert_eq!(subscribers, vec![ServerId(1), ServerId(2)]);
        assert_eq!(index.subscriptions_of(&ServerId(1)).collect::<Vec<_>>(), vec![object]);
    }

    #[test]
    fn test_update_without_subscribers_is_dropped() {
        let mut index: SubscriberIndex<ServerId> = SubscriberIndex::new();
        let object = ObjectId::new();

        assert_eq!(index.record_update(&object, &update_at(1.0)), 0);
        assert_eq!(index.total_outstanding(), 0);
        assert_eq!(index.destination_count(), 0);
    }

    #[test]
    fn test_updates_coalesce_to_latest() {
        let mut index = SubscriberIndex::new();
        let object = ObjectId::new();
        index.subscribe(ServerId(1), object);

        for x in 1..=5 {
            index.record_update(&object, &update_at(x as f64));
        }

        assert_eq!(index.outstanding_count(&ServerId(1)), 1);
        let pending = index.pending_update(&ServerId(1), &object).unwrap();
        assert_eq!(pending.location.position.x, 5.0);
    }

    #[test]
    fn test_unsubscribe_keeps_queued_update() {
        let mut index = SubscriberIndex::new();
        let object = ObjectId::new();
        index.subscribe(ServerId(1), object);
        index.record_update(&object, &update_at(1.0));

        assert!(index.unsubscribe(ServerId(1), &object));
        assert_eq!(index.subscribers_of(&object).count(), 0);
        assert_eq!(index.watched_object_count(), 0);
        assert!(index.has_destination(&ServerId(1)));

        let mut sink = ScriptedSink::always_accept();
        let report = index.flush(10, &mut sink);
        assert_eq!(report.updates_sent, 1);
        assert_eq!(sink.sent_to(&ServerId(1)).len(), 1);
        assert!(!index.has_destination(&ServerId(1)));
    }

    #[test]
    fn test_update_after_unsubscribe_is_not_queued() {
        let mut index = SubscriberIndex::new();
        let object = ObjectId::new();
        index.subscribe(ServerId(1), object);
        index.unsubscribe(ServerId(1), &object);

        assert_eq!(index.record_update(&object, &update_at(2.0)), 0);
        assert_eq!(index.outstanding_count(&ServerId(1)), 0);
    }

    #[test]
    fn test_flush_splits_into_capped_batches() {
        let mut index = SubscriberIndex::new();
        let objects = ids(7);
        for object in &objects {
            index.subscribe(ServerId(1), *object);
            index.record_update(object, &update_at(1.0));
        }

        let mut sink = ScriptedSink::always_accept();
        let report = index.flush(3, &mut sink);

        let batches = sink.sent_to(&ServerId(1));
        assert_eq!(batches.iter().map(|b| b.len()).collect::<Vec<_>>(), vec![3, 3, 1]);
        let shipped: Vec<ObjectId> = batches.iter().flat_map(|b| b.objects()).collect();
        assert_eq!(shipped, objects);
        assert_eq!(report.messages_sent, 3);
        assert_eq!(report.updates_sent, 7);
        assert_eq!(index.outstanding_count(&ServerId(1)), 0);
        // still subscribed, so it survives the pass
        assert!(index.has_destination(&ServerId(1)));
    }

    #[test]
    fn test_failed_batch_and_rest_remain_outstanding() {
        let mut index = SubscriberIndex::new();
        let objects = ids(6);
        for object in &objects {
            index.subscribe(ServerId(1), *object);
            index.record_update(object, &update_at(1.0));
        }

        let mut sink = ScriptedSink::fail_on_calls([2]);
        let report = index.flush(2, &mut sink);

        assert_eq!(report.messages_sent, 1);
        assert_eq!(report.failed, vec![ServerId(1)]);
        assert_eq!(sink.attempts(), 2);
        let remaining: Vec<ObjectId> = index
            .info(&ServerId(1))
            .unwrap()
            .outstanding_updates()
            .keys()
            .copied()
            .collect();
        assert_eq!(remaining, objects[2..].to_vec());
        // progress was made, so this is not a failed tick
        assert_eq!(index.consecutive_failures(&ServerId(1)), 0);
    }

    #[test]
    fn test_failures_do_not_block_other_destinations() {
        let mut index = SubscriberIndex::new();
        let object = ObjectId::new();
        index.subscribe(ServerId(1), object);
        index.subscribe(ServerId(2), object);
        index.record_update(&object, &update_at(1.0));

        let mut sink = ScriptedSink::reject_destinations([ServerId(1)]);
        let report = index.flush(10, &mut sink);

        assert_eq!(report.failed, vec![ServerId(1)]);
        assert_eq!(sink.sent_to(&ServerId(2)).len(), 1);
        assert_eq!(index.outstanding_count(&ServerId(1)), 1);
        assert_eq!(index.consecutive_failures(&ServerId(1)), 1);

        index.flush(10, &mut sink);
        assert_eq!(index.consecutive_failures(&ServerId(1)), 2);
    }

    #[test]
    fn test_empty_destination_collected_on_flush() {
        let mut index = SubscriberIndex::new();
        let object = ObjectId::new();
        index.subscribe(ServerId(1), object);
        index.unsubscribe(ServerId(1), &object);
        assert_eq!(index.destination_count(), 1);

        let mut sink = ScriptedSink::always_accept();
        let report = index.flush(10, &mut sink);

        assert_eq!(report.collected, 1);
        assert_eq!(index.destination_count(), 0);
        assert_eq!(sink.attempts(), 0);
    }

    #[test]
    fn test_unsubscribe_all_drains_then_collects() {
        let mut index = SubscriberIndex::new();
        let objects = ids(3);
        for object in &objects {
            index.subscribe(ServerId(4), *object);
        }
        index.record_update(&objects[0], &update_at(1.0));

        assert_eq!(index.unsubscribe_all(ServerId(4)), 3);
        assert_eq!(index.watched_object_count(), 0);

        let mut sink = ScriptedSink::always_accept();
        index.flush(10, &mut sink);
        assert_eq!(sink.sent_to(&ServerId(4)).len(), 1);
        assert_eq!(index.destination_count(), 0);
    }

    #[test]
    fn test_purge_object_keeps_outstanding() {
        let mut index = SubscriberIndex::new();
        let object = ObjectId::new();
        index.subscribe(ServerId(1), object);
        index.subscribe(ServerId(2), object);
        index.record_update(&object, &update_at(3.0));

        assert_eq!(index.purge_object(&object), 2);
        assert!(!index.is_subscribed(&ServerId(1), &object));
        assert_eq!(index.total_outstanding(), 2);
    }

    #[test]
    fn test_evict_discards_everything() {
        let mut index = SubscriberIndex::new();
        let object = ObjectId::new();
        index.subscribe(ServerId(1), object);
        index.record_update(&object, &update_at(3.0));

        let evicted = index.evict(ServerId(1)).unwrap();
        assert_eq!(evicted.outstanding_updates().len(), 1);
        assert_eq!(index.destination_count(), 0);
        assert_eq!(index.subscribers_of(&object).count(), 0);
        assert!(index.evict(ServerId(1)).is_none());
    }

    #[test]
    fn test_index_over_object_destinations() {
        let mut index: SubscriberIndex<ObjectId> = SubscriberIndex::new();
        let host = ObjectId::new();
        let object = ObjectId::new();
        index.subscribe(host, object);
        index.record_update(&object, &update_at(1.0));

        let mut sink = ScriptedSink::always_accept();
        index.flush(10, &mut sink);
        assert_eq!(sink.sent_to(&host).len(), 1);
    }
}
