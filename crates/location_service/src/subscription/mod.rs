//! Subscription tracking and per-destination update queues.

mod index;

pub use index::{Destination, FlushReport, SubscriberIndex, SubscriberInfo, UpdateInfo};
