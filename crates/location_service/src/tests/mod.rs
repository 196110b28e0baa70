//! Scenario tests for the location service
//!
//! These drive the public façade end to end against a scripted transport:
//! - Coalescing and subscription gating
//! - Authority rules across local, replica and migrated objects
//! - Batch delivery, partial failure, draining and eviction
//! - Listener filtering for aggregates

#[cfg(test)]
pub mod coalescing_test;

#[cfg(test)]
pub mod authority_test;
