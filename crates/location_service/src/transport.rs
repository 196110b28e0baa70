//! Transport sink contract consumed by the update policy.
//!
//! The sink is a reliable, ordered channel to a destination that must never
//! block: when the destination cannot take more data right now it returns
//! `false` and the policy keeps the batch queued for the next tick.

use crate::messages::BulkLocationUpdate;

/// Non-blocking send to destinations of type `D`.
///
/// The policy needs one implementation per destination kind, so a transport
/// that reaches both space servers and object hosts implements
/// `TransportSink<ServerId>` and `TransportSink<ObjectId>`.
pub trait TransportSink<D> {
    /// Attempts to enqueue `message` for `destination`.
    ///
    /// Returns `true` once the transport has taken ownership of the message,
    /// `false` on backpressure or when the destination is unreachable.
    fn try_send(&mut self, destination: &D, message: &BulkLocationUpdate) -> bool;
}

impl<D, T: TransportSink<D> + ?Sized> TransportSink<D> for &mut T {
    fn try_send(&mut self, destination: &D, message: &BulkLocationUpdate) -> bool {
        (**self).try_send(destination, message)
    }
}

impl<D, T: TransportSink<D> + ?Sized> TransportSink<D> for Box<T> {
    fn try_send(&mut self, destination: &D, message: &BulkLocationUpdate) -> bool {
        (**self).try_send(destination, message)
    }
}
