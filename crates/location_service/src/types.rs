//! # Core Type Definitions
//!
//! Identifiers, timestamps and the motion primitives the location service
//! stores and ships to subscribers.
//!
//! ## Key Types
//!
//! - [`ObjectId`] - Globally unique identifier of a space object
//! - [`ServerId`] - Identifier of a space server in the cluster
//! - [`Time`] - Simulation timestamp in microseconds
//! - [`TimedMotionVector`] - Position + velocity anchored at a time, extrapolated linearly
//! - [`TimedMotionQuaternion`] - Orientation + angular velocity anchored at a time
//! - [`BoundingSphere`] - Bounds relative to the object's position
//!
//! [`Vector3`] and [`Quaternion`] are the serialized shapes; the arithmetic
//! behind them is done in `glam`'s double-precision types.

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an object in the space.
///
/// Wraps a UUID so object ids cannot be confused with server ids. The id is
/// immutable for the lifetime of the object, including across migrations
/// between space servers.
///
/// # Examples
///
/// ```rust
/// use location_service::ObjectId;
///
/// let id = ObjectId::from_str("550e8400-e29b-41d4-a716-446655440000")?;
/// println!("Object: {}", id);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub Uuid);

impl ObjectId {
    /// Creates a new random object ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses an object ID from its string representation.
    pub fn from_str(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::str::FromStr for ObjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str(s)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a space server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerId(pub u32);

impl std::fmt::Display for ServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "server-{}", self.0)
    }
}

// ============================================================================
// Time
// ============================================================================

/// Simulation timestamp with microsecond resolution.
///
/// Signed so that extrapolating to a time before a motion vector's reference
/// time yields a negative offset instead of wrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Time(i64);

impl Time {
    /// The zero timestamp.
    pub const ZERO: Time = Time(0);

    pub fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * 1_000_000.0).round() as i64)
    }

    pub fn as_micros(&self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Seconds elapsed from `earlier` to `self`; negative if `earlier` is later.
    pub fn seconds_since(&self, earlier: Time) -> f64 {
        (self.0 - earlier.0) as f64 / 1_000_000.0
    }
}

// ============================================================================
// Vector3
// ============================================================================

/// 3D vector with double-precision components.
///
/// Double precision keeps positions accurate in large spaces where an object
/// may sit tens of kilometres from the origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f64 {
        DVec3::from(*self).length()
    }

    pub fn distance(&self, other: Vector3) -> f64 {
        DVec3::from(*self).distance(other.into())
    }
}

impl From<Vector3> for DVec3 {
    fn from(v: Vector3) -> Self {
        DVec3::new(v.x, v.y, v.z)
    }
}

impl From<DVec3> for Vector3 {
    fn from(v: DVec3) -> Self {
        Vector3::new(v.x, v.y, v.z)
    }
}

impl Add for Vector3 {
    type Output = Vector3;

    fn add(self, rhs: Vector3) -> Vector3 {
        (DVec3::from(self) + DVec3::from(rhs)).into()
    }
}

impl Sub for Vector3 {
    type Output = Vector3;

    fn sub(self, rhs: Vector3) -> Vector3 {
        (DVec3::from(self) - DVec3::from(rhs)).into()
    }
}

impl Mul<f64> for Vector3 {
    type Output = Vector3;

    fn mul(self, rhs: f64) -> Vector3 {
        (DVec3::from(self) * rhs).into()
    }
}

// ============================================================================
// Quaternion
// ============================================================================

/// Rotation quaternion (x, y, z, w).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// Builds a rotation of `angle` radians around `axis`.
    ///
    /// A zero-length axis yields the identity rotation.
    pub fn from_axis_angle(axis: Vector3, angle: f64) -> Self {
        match DVec3::from(axis).try_normalize() {
            Some(axis) => DQuat::from_axis_angle(axis, angle).into(),
            None => Self::IDENTITY,
        }
    }

    /// Decomposes into a unit axis and an angle in radians.
    pub fn to_axis_angle(&self) -> (Vector3, f64) {
        let (axis, angle) = DQuat::from(self.normalize()).to_axis_angle();
        (axis.into(), angle)
    }

    pub fn length(&self) -> f64 {
        DQuat::from(*self).length()
    }

    /// Unit-length copy; degenerate input collapses to the identity.
    pub fn normalize(&self) -> Self {
        if self.length() <= f64::EPSILON {
            return Self::IDENTITY;
        }
        DQuat::from(*self).normalize().into()
    }
}

impl From<Quaternion> for DQuat {
    fn from(q: Quaternion) -> Self {
        DQuat::from_xyzw(q.x, q.y, q.z, q.w)
    }
}

impl From<DQuat> for Quaternion {
    fn from(q: DQuat) -> Self {
        Quaternion::new(q.x, q.y, q.z, q.w)
    }
}

impl Mul for Quaternion {
    type Output = Quaternion;

    /// `a * b` applies `b` first, then `a`.
    fn mul(self, rhs: Quaternion) -> Quaternion {
        (DQuat::from(self) * DQuat::from(rhs)).into()
    }
}

// ============================================================================
// Motion
// ============================================================================

/// Position and velocity anchored at a reference time.
///
/// Supports linear prediction to any other time, earlier or later.
///
/// # Examples
///
/// ```rust
/// use location_service::{TimedMotionVector, Time, Vector3};
///
/// let motion = TimedMotionVector::new(Time::ZERO, Vector3::ZERO, Vector3::new(1.0, 0.0, 0.0));
/// assert_eq!(motion.extrapolate(Time::from_secs_f64(2.0)), Vector3::new(2.0, 0.0, 0.0));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimedMotionVector {
    /// Reference time at which `position` was exact
    pub time: Time,
    pub position: Vector3,
    /// Units per second
    pub velocity: Vector3,
}

impl TimedMotionVector {
    pub fn new(time: Time, position: Vector3, velocity: Vector3) -> Self {
        Self { time, position, velocity }
    }

    /// A motion vector that stays at `position`.
    pub fn stationary(time: Time, position: Vector3) -> Self {
        Self::new(time, position, Vector3::ZERO)
    }

    /// Predicted position at `at`.
    pub fn extrapolate(&self, at: Time) -> Vector3 {
        self.position + self.velocity * at.seconds_since(self.time)
    }
}

/// Orientation and angular velocity anchored at a reference time.
///
/// `velocity` is the rotation applied over one second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimedMotionQuaternion {
    pub time: Time,
    pub position: Quaternion,
    pub velocity: Quaternion,
}

impl TimedMotionQuaternion {
    pub fn new(time: Time, position: Quaternion, velocity: Quaternion) -> Self {
        Self { time, position, velocity }
    }

    pub fn stationary(time: Time, position: Quaternion) -> Self {
        Self::new(time, position, Quaternion::IDENTITY)
    }

    /// Predicted orientation at `at`.
    pub fn extrapolate(&self, at: Time) -> Quaternion {
        let dt = at.seconds_since(self.time);
        let (axis, angle_per_second) = self.velocity.to_axis_angle();
        let step = Quaternion::from_axis_angle(axis, angle_per_second * dt);
        (step * self.position).normalize()
    }
}

/// Bounding sphere, centered at an offset from the object's position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    pub center: Vector3,
    pub radius: f64,
}

impl BoundingSphere {
    pub fn new(center: Vector3, radius: f64) -> Self {
        Self { center, radius }
    }

    /// A sphere of `radius` centered on the object.
    pub fn centered(radius: f64) -> Self {
        Self::new(Vector3::ZERO, radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_linear_extrapolation_forward_and_backward() {
        let motion = TimedMotionVector::new(
            Time::from_secs_f64(1.0),
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(2.0, 0.0, -1.0),
        );

        assert_eq!(motion.extrapolate(Time::from_secs_f64(1.0)), Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(motion.extrapolate(Time::from_secs_f64(3.0)), Vector3::new(5.0, 2.0, 1.0));
        assert_eq!(motion.extrapolate(Time::ZERO), Vector3::new(-1.0, 2.0, 4.0));
    }

    #[test]
    fn test_time_conversions() {
        let t = Time::from_secs_f64(1.5);
        assert_eq!(t.as_micros(), 1_500_000);
        assert!(approx(t.as_secs_f64(), 1.5));
        assert!(approx(Time::ZERO.seconds_since(t), -1.5));
    }

    #[test]
    fn test_orientation_extrapolation_quarter_turn() {
        let spin = Quaternion::from_axis_angle(Vector3::new(0.0, 0.0, 1.0), std::f64::consts::FRAC_PI_2);
        let motion = TimedMotionQuaternion::new(Time::ZERO, Quaternion::IDENTITY, spin);

        let after_two = motion.extrapolate(Time::from_secs_f64(2.0));
        let (axis, angle) = after_two.to_axis_angle();
        assert!(approx(angle, std::f64::consts::PI));
        assert!(approx(axis.z.abs(), 1.0));

        let unchanged = motion.extrapolate(Time::ZERO);
        assert!(approx(unchanged.w, 1.0));
    }

    #[test]
    fn test_stationary_orientation_never_moves() {
        let start = Quaternion::from_axis_angle(Vector3::new(1.0, 0.0, 0.0), 0.3);
        let motion = TimedMotionQuaternion::stationary(Time::ZERO, start);
        let later = motion.extrapolate(Time::from_secs_f64(100.0));
        assert!(approx(later.x, start.x));
        assert!(approx(later.w, start.w));
    }

    #[test]
    fn test_composed_rotations_add_angles() {
        let axis = Vector3::new(0.0, 0.0, 2.0);
        let a = Quaternion::from_axis_angle(axis, 0.25);
        let b = Quaternion::from_axis_angle(axis, 0.5);
        let (composed_axis, angle) = (a * b).to_axis_angle();
        assert!(approx(angle, 0.75));
        assert!(approx(composed_axis.z, 1.0));

        assert_eq!(Quaternion::from_axis_angle(Vector3::ZERO, 1.0), Quaternion::IDENTITY);
        assert_eq!(Quaternion::new(0.0, 0.0, 0.0, 0.0).normalize(), Quaternion::IDENTITY);
    }

    #[test]
    fn test_object_id_parsing() {
        let id = ObjectId::from_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
        assert!(ObjectId::from_str("not-a-uuid").is_err());
    }
}
