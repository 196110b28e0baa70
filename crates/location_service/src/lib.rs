//! # Location Service
//!
//! Space-side location replication and update distribution. Each space
//! server tracks the position, orientation, bounds, mesh and physics state of
//! the objects it owns, caches replicas of objects owned elsewhere, and
//! decides when and to whom state changes are pushed.
//!
//! ## Core Features
//!
//! - **Single authority**: at most one authoritative copy of an object per server
//! - **Coalescing**: repeated updates before a flush collapse to the latest value
//! - **Batching**: per-destination messages are capped in record count
//! - **Backpressure**: a refused send stays queued and is retried next tick
//! - **Listeners**: filtered, typed events for in-process consumers
//!
//! ## Architecture Overview
//!
//! - [`store`] - per-object records and the authority rules
//! - [`subscription`] - forward and reverse subscription maps with pending updates
//! - [`policy`] - the periodic flush into [`BulkLocationUpdate`] messages
//! - [`service`] - the façade tying store, listeners and policy together
//! - [`transport`] - the non-blocking send contract the policy consumes
//!
//! ## Quick Start Example
//!
//! ```rust
//! use location_service::*;
//!
//! #[derive(Default)]
//! struct Outbox(Vec<String>);
//!
//! impl<D: std::fmt::Display> TransportSink<D> for Outbox {
//!     fn try_send(&mut self, destination: &D, message: &BulkLocationUpdate) -> bool {
//!         self.0.push(format!("{} <- {} updates", destination, message.len()));
//!         true
//!     }
//! }
//!
//! let mut service = LocationService::new(LocationServiceConfig::default(), Outbox::default())?;
//!
//! let ship = ObjectId::new();
//! let start = TimedMotionVector::new(Time::ZERO, Vector3::ZERO, Vector3::new(1.0, 0.0, 0.0));
//! service.add_local_object(ship, ObjectState::new(start, BoundingSphere::centered(5.0)));
//! service.subscribe(ServerId(2), ship);
//!
//! let moved = TimedMotionVector::new(Time::from_secs_f64(1.0), Vector3::new(1.0, 0.0, 0.0), Vector3::ZERO);
//! service.update_local_location(&ship, moved);
//!
//! let summary = service.service();
//! assert_eq!(summary.messages_sent(), 1);
//! assert_eq!(service.sink().0, vec!["server-2 <- 1 updates".to_string()]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod listener;
pub mod messages;
pub mod policy;
pub mod service;
pub mod store;
pub mod subscription;
pub mod transport;
pub mod types;

#[cfg(test)]
mod test_support;

// scenario tests
#[cfg(test)]
mod tests;

pub use config::{LocationServiceConfig, UpdatePolicyConfig};
pub use error::{ConfigValidationError, LocationError};
pub use listener::{EventKind, ListenerFilter, ListenerId, LocationChange, LocationEvent};
pub use messages::{BulkLocationUpdate, LocationUpdateRecord};
pub use policy::{FlushSummary, LocationUpdatePolicy, PolicyStats, Subscriber};
pub use service::LocationService;
pub use store::{AddOutcome, ObjectRecord, ObjectRecordStore, ObjectState, TrackingKind};
pub use subscription::{Destination, FlushReport, SubscriberIndex, SubscriberInfo, UpdateInfo};
pub use transport::TransportSink;
pub use types::*;

/// Returns a build info string with the crate version.
pub fn build_info() -> String {
    format!("Location Service v{}", env!("CARGO_PKG_VERSION"))
}
