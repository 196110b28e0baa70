//! # Location Listeners
//!
//! Typed fan-out of object lifecycle and state changes to in-process
//! consumers such as a proximity query handler.
//!
//! Listeners are plain closures registered with a [`ListenerFilter`].
//! Delivery is synchronous, fire-and-forget, in registration order. A
//! listener cannot reach back into the service while it is being notified.
//!
//! ```rust
//! use location_service::listener::{EventKind, ListenerFilter, ListenerRegistry};
//!
//! let mut registry = ListenerRegistry::new();
//! let id = registry.add_listener(
//!     ListenerFilter::all().kinds([EventKind::Location]),
//!     |event| println!("{} moved", event.object),
//! );
//! assert!(registry.remove_listener(id));
//! ```

use crate::store::{ObjectState, TrackingKind};
use crate::types::{BoundingSphere, ObjectId, TimedMotionQuaternion, TimedMotionVector};
use std::collections::HashSet;

/// Discriminant of a [`LocationChange`], used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Added,
    Removed,
    Location,
    Orientation,
    Bounds,
    Mesh,
    Physics,
}

impl EventKind {
    /// Add and remove events, as opposed to state updates.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, EventKind::Added | EventKind::Removed)
    }
}

/// What happened to an object.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationChange {
    Added(ObjectState),
    Removed,
    Location(TimedMotionVector),
    Orientation(TimedMotionQuaternion),
    Bounds(BoundingSphere),
    Mesh(String),
    Physics(String),
}

impl LocationChange {
    pub fn kind(&self) -> EventKind {
        match self {
            LocationChange::Added(_) => EventKind::Added,
            LocationChange::Removed => EventKind::Removed,
            LocationChange::Location(_) => EventKind::Location,
            LocationChange::Orientation(_) => EventKind::Orientation,
            LocationChange::Bounds(_) => EventKind::Bounds,
            LocationChange::Mesh(_) => EventKind::Mesh,
            LocationChange::Physics(_) => EventKind::Physics,
        }
    }
}

/// A change to one object, as seen by listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationEvent {
    pub object: ObjectId,
    pub tracking: TrackingKind,
    pub change: LocationChange,
}

impl LocationEvent {
    pub fn new(object: ObjectId, tracking: TrackingKind, change: LocationChange) -> Self {
        Self {
            object,
            tracking,
            change,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.change.kind()
    }
}

/// Selects which events a listener receives.
///
/// Aggregate objects are always reported when added or removed, but their
/// state updates are only delivered after [`ListenerFilter::with_aggregates`].
#[derive(Debug, Clone, Default)]
pub struct ListenerFilter {
    kinds: Option<HashSet<EventKind>>,
    tracking: Option<HashSet<TrackingKind>>,
    aggregates: bool,
}

impl ListenerFilter {
    /// Every event kind for every tracking kind, aggregate updates excluded.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts delivery to the given event kinds.
    pub fn kinds(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Restricts delivery to objects with the given tracking kinds.
    pub fn tracking(mut self, tracking: impl IntoIterator<Item = TrackingKind>) -> Self {
        self.tracking = Some(tracking.into_iter().collect());
        self
    }

    /// Opts into state updates for aggregate objects.
    pub fn with_aggregates(mut self) -> Self {
        self.aggregates = true;
        self
    }

    pub fn matches(&self, event: &LocationEvent) -> bool {
        let kind = event.kind();
        if event.tracking == TrackingKind::Aggregate && !kind.is_lifecycle() && !self.aggregates {
            return false;
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&kind) {
                return false;
            }
        }
        if let Some(tracking) = &self.tracking {
            if !tracking.contains(&event.tracking) {
                return false;
            }
        }
        true
    }
}

/// Handle returned by [`ListenerRegistry::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Boxed listener callback.
pub type ListenerCallback = Box<dyn FnMut(&LocationEvent) + Send>;

struct Registration {
    id: ListenerId,
    filter: ListenerFilter,
    callback: ListenerCallback,
}

/// Ordered set of registered listeners.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Vec<Registration>,
    next_id: u64,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener<F>(&mut self, filter: ListenerFilter, callback: F) -> ListenerId
    where
        F: FnMut(&LocationEvent) + Send + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push(Registration {
            id,
            filter,
            callback: Box::new(callback),
        });
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|registration| registration.id != id);
        self.listeners.len() != before
    }

    /// Delivers `event` to every matching listener. Returns how many received it.
    pub fn notify(&mut self, event: &LocationEvent) -> usize {
        let mut delivered = 0;
        for registration in self.listeners.iter_mut() {
            if registration.filter.matches(event) {
                (registration.callback)(event);
                delivered += 1;
            }
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
