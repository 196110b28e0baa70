use crate::test_support::{moving_state, state_at, ScriptedSink};
use crate::*;

fn service() -> LocationService<ScriptedSink> {
    LocationService::new(LocationServiceConfig::default(), ScriptedSink::always_accept()).unwrap()
}

fn bulk(records: impl IntoIterator<Item = LocationUpdateRecord>) -> BulkLocationUpdate {
    records.into_iter().collect()
}

#[test]
fn test_local_then_replica_add_keeps_local_state() {
    let mut service = service();
    let object = ObjectId::new();

    assert!(service.add_local_object(object, state_at(1.0)));
    assert!(!service.add_replica_object(object, state_at(50.0)));

    assert_eq!(service.tracking(&object), Some(TrackingKind::Local));
    assert_eq!(service.location(&object, Time::ZERO), Some(Vector3::new(1.0, 0.0, 0.0)));
}

#[test]
fn test_migration_away_and_back() {
    let mut service = service();
    let object = ObjectId::new();
    let host = ObjectId::new();
    service.add_local_object(object, state_at(0.0));
    service.subscribe(host, object);

    // object leaves: remove locally, track as a replica of the new owner
    assert!(service.remove_local_object(&object));
    assert!(service.add_replica_object(object, state_at(10.0)));
    assert_eq!(service.tracking(&object), Some(TrackingKind::Replica));

    // object comes back and local authority wins over the replica
    assert!(service.add_local_object(object, state_at(20.0)));
    assert_eq!(service.tracking(&object), Some(TrackingKind::Local));
    assert!(service.policy().is_subscribed(Subscriber::ObjectHost(host), &object));

    // neither add ships anything; the next local change does
    assert_eq!(service.service().messages_sent(), 0);
    service.update_local_location(&object, TimedMotionVector::stationary(Time::ZERO, Vector3::new(21.0, 0.0, 0.0)));
    service.service();
    let shipped: Vec<f64> = service
        .sink()
        .sent_to(&host)
        .iter()
        .flat_map(|batch| batch.updates.iter().map(|record| record.location.position.x))
        .collect();
    assert_eq!(shipped, vec![21.0]);
}

#[test]
fn test_stale_bulk_records_are_ignored() {
    let mut service = service();
    let object = ObjectId::new();
    service.add_replica_object(object, state_at(0.0));

    let mut fresh = LocationUpdateRecord::from(service.object(&object).unwrap());
    fresh.seqno = 10;
    fresh.location = TimedMotionVector::stationary(Time::ZERO, Vector3::new(10.0, 0.0, 0.0));
    assert_eq!(service.apply_bulk_update(ServerId(3), &bulk([fresh.clone()])), 1);

    let mut stale = fresh.clone();
    stale.seqno = 9;
    stale.location = TimedMotionVector::stationary(Time::ZERO, Vector3::new(9.0, 0.0, 0.0));
    assert_eq!(service.apply_bulk_update(ServerId(3), &bulk([stale])), 0);

    assert_eq!(service.location(&object, Time::ZERO), Some(Vector3::new(10.0, 0.0, 0.0)));
    assert_eq!(service.object(&object).unwrap().seqno, 10);
}

#[test]
fn test_bulk_update_from_new_authority_after_migration() {
    let mut service = service();
    let object = ObjectId::new();
    let host = ObjectId::new();
    service.add_replica_object(object, state_at(0.0));
    service.subscribe(host, object);

    let mut record = LocationUpdateRecord::from(service.object(&object).unwrap());
    record.seqno = 40;
    assert_eq!(service.apply_bulk_update(ServerId(1), &bulk([record.clone()])), 1);

    // server 2 took the object over and numbers its records from scratch
    record.seqno = 1;
    record.location = TimedMotionVector::stationary(Time::ZERO, Vector3::new(99.0, 0.0, 0.0));
    assert_eq!(service.apply_bulk_update(ServerId(2), &bulk([record])), 1);

    assert_eq!(service.location(&object, Time::ZERO), Some(Vector3::new(99.0, 0.0, 0.0)));
    assert_eq!(service.object(&object).unwrap().authority, Some(ServerId(2)));
    service.service();
    let last = service.sink().sent_to(&host).pop().unwrap();
    assert_eq!(last.updates[0].location.position.x, 99.0);
}

#[test]
fn test_bulk_update_skips_local_and_unknown_objects() {
    let mut service = service();
    let local = ObjectId::new();
    let replica = ObjectId::new();
    service.add_local_object(local, state_at(0.0));
    service.add_replica_object(replica, state_at(0.0));

    let mut records = vec![
        LocationUpdateRecord::from(service.object(&local).unwrap()),
        LocationUpdateRecord::from(service.object(&replica).unwrap()),
    ];
    let mut unknown = records[1].clone();
    unknown.object = ObjectId::new();
    records.push(unknown);
    for record in &mut records {
        record.seqno = 1;
        record.bounds = BoundingSphere::centered(7.0);
    }

    assert_eq!(service.apply_bulk_update(ServerId(3), &bulk(records)), 1);
    assert_eq!(service.object(&local).unwrap().bounds.radius, 1.0);
    assert_eq!(service.object(&replica).unwrap().bounds.radius, 7.0);
    assert_eq!(service.store().len(), 2);
}

#[test]
fn test_replica_updates_reach_hosts_not_servers() {
    let mut service = service();
    let object = ObjectId::new();
    let host = ObjectId::new();
    service.add_replica_object(object, state_at(0.0));
    service.subscribe(ServerId(4), object);
    service.subscribe(host, object);

    let mut record = LocationUpdateRecord::from(service.object(&object).unwrap());
    record.seqno = 2;
    record.location = TimedMotionVector::stationary(Time::ZERO, Vector3::new(2.0, 0.0, 0.0));
    service.apply_bulk_update(ServerId(3), &bulk([record]));
    service.update_replica_orientation(
        &object,
        TimedMotionQuaternion::stationary(Time::ZERO, Quaternion::from_axis_angle(Vector3::new(0.0, 1.0, 0.0), 1.0)),
    );

    let summary = service.service();
    assert_eq!(summary.servers.messages_sent, 0);
    assert_eq!(summary.object_hosts.updates_sent, 1);
    assert!(service.sink().sent_to(&ServerId(4)).is_empty());
    assert_eq!(service.sink().sent_to(&host).len(), 1);
}

#[test]
fn test_extrapolated_location_follows_velocity() {
    let mut service = service();
    let object = ObjectId::new();
    service.add_local_object(
        object,
        moving_state(Time::from_secs_f64(1.0), Vector3::new(1.0, 0.0, 0.0), Vector3::new(2.0, 0.0, 0.0)),
    );

    let at = service.location(&object, Time::from_secs_f64(3.0)).unwrap();
    assert!((at.x - 5.0).abs() < 1e-9);
    let before = service.location(&object, Time::ZERO).unwrap();
    assert!((before.x + 1.0).abs() < 1e-9);
}
