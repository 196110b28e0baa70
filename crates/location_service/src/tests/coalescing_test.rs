use crate::test_support::{state_at, ScriptedSink};
use crate::*;
use proptest::prelude::*;
use std::collections::HashMap;

fn service_with_cap(cap: u32) -> LocationService<ScriptedSink> {
    let config = LocationServiceConfig {
        policy: UpdatePolicyConfig {
            max_updates_per_message: cap,
            max_consecutive_failures: None,
        },
        unsubscribe_on_remove: false,
    };
    LocationService::new(config, ScriptedSink::always_accept()).unwrap()
}

fn at_x(x: f64) -> TimedMotionVector {
    TimedMotionVector::stationary(Time::ZERO, Vector3::new(x, 0.0, 0.0))
}

#[test]
fn test_no_update_without_subscription() {
    let mut service = service_with_cap(10);
    let object = ObjectId::new();
    service.add_local_object(object, state_at(0.0));

    service.update_local_location(&object, at_x(1.0));
    service.update_local_bounds(&object, BoundingSphere::centered(2.0));

    assert_eq!(service.policy().total_outstanding(), 0);
    let summary = service.service();
    assert_eq!(summary.messages_sent(), 0);
    assert_eq!(service.sink().attempts(), 0);
}

#[test]
fn test_add_does_not_push_to_existing_subscribers() {
    let mut service = service_with_cap(10);
    let object = ObjectId::new();
    let host = ObjectId::new();
    service.subscribe(ServerId(1), object);
    service.subscribe(host, object);

    assert!(service.add_local_object(object, state_at(0.0)));
    assert_eq!(service.policy().total_outstanding(), 0);

    let summary = service.service();
    assert_eq!(summary.messages_sent(), 0);
    assert_eq!(service.sink().attempts(), 0);

    // the first real change is what goes out
    service.update_local_location(&object, at_x(4.0));
    assert_eq!(service.service().messages_sent(), 2);
}

#[test]
fn test_mixed_field_updates_collapse_into_one_record() {
    let mut service = service_with_cap(10);
    let object = ObjectId::new();
    service.add_local_object(object, state_at(0.0));
    service.subscribe(ServerId(1), object);

    service.update_local_location(&object, at_x(3.0));
    service.update_local_bounds(&object, BoundingSphere::centered(9.0));
    service.update_local_mesh(&object, "meerkat:///rock.dae");

    service.service();
    let batches = service.sink().sent_to(&ServerId(1));
    assert_eq!(batches.len(), 1);
    let record = &batches[0].updates[0];
    assert_eq!(record.location.position.x, 3.0);
    assert_eq!(record.bounds.radius, 9.0);
    assert_eq!(record.mesh, "meerkat:///rock.dae");
    assert_eq!(record.seqno, 3);
}

proptest! {
    #[test]
    fn coalesced_update_carries_last_value(xs in prop::collection::vec(-1000.0f64..1000.0, 1..40)) {
        let mut service = service_with_cap(8);
        let object = ObjectId::new();
        service.add_local_object(object, state_at(0.0));
        service.subscribe(ServerId(1), object);

        for x in &xs {
            service.update_local_location(&object, at_x(*x));
        }
        prop_assert_eq!(service.policy().total_outstanding(), 1);

        service.service();
        let batches = service.sink().sent_to(&ServerId(1));
        prop_assert_eq!(batches.len(), 1);
        prop_assert_eq!(batches[0].len(), 1);
        prop_assert_eq!(batches[0].updates[0].location.position.x, *xs.last().unwrap());
    }

    #[test]
    fn one_record_per_object_per_flush(
        steps in prop::collection::vec((0usize..6, -100.0f64..100.0), 1..60),
        cap in 1u32..4,
    ) {
        let mut service = service_with_cap(cap);
        let objects: Vec<ObjectId> = (0..6).map(|_| ObjectId::new()).collect();
        for object in &objects {
            service.add_local_object(*object, state_at(0.0));
            service.subscribe(ServerId(5), *object);
        }

        let mut latest = HashMap::new();
        for (index, x) in &steps {
            service.update_local_location(&objects[*index], at_x(*x));
            latest.insert(objects[*index], *x);
        }
        prop_assert_eq!(service.policy().total_outstanding(), latest.len());

        service.service();
        let batches = service.sink().sent_to(&ServerId(5));
        prop_assert!(batches.iter().all(|batch| batch.len() <= cap as usize));

        let shipped: Vec<LocationUpdateRecord> = batches.into_iter().flat_map(|batch| batch.updates).collect();
        prop_assert_eq!(shipped.len(), latest.len());
        for record in &shipped {
            prop_assert_eq!(Some(&record.location.position.x), latest.get(&record.object));
        }
        prop_assert_eq!(service.policy().total_outstanding(), 0);
    }
}
