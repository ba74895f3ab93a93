//! Point and vector aliases

use nalgebra::{Point3, Vector3};

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// A 3D point with double precision coordinates
pub type Point3d = Point3<f64>;

/// A 3D vector with floating point components
pub type Vector3f = Vector3<f32>;

/// A 3D vector with double precision components
pub type Vector3d = Vector3<f64>;

/// Normalize `v`, falling back to the zero vector for degenerate input.
#[inline]
pub fn normalize_or_zero(v: Vector3f) -> Vector3f {
    v.try_normalize(0.0).unwrap_or_else(Vector3f::zeros)
}
