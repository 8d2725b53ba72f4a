//! Polar/azimuthal parameterization of unit normals
//!
//! A normal is written as `n(u, v) = (sin u cos v, sin u sin v, cos u)`. The
//! bi-normal fit optimizes over `(u, v)` so the two group normals stay on the
//! unit sphere without an explicit norm constraint.

use sharpcrate_core::Vector3d;
use std::f64::consts::PI;

/// Map angles to a point on the unit sphere
pub fn normal_from_angles(u: f64, v: f64) -> Vector3d {
    let (sin_u, cos_u) = u.sin_cos();
    let (sin_v, cos_v) = v.sin_cos();
    Vector3d::new(sin_u * cos_v, sin_u * sin_v, cos_u)
}

/// Partial derivative of `n(u, v)` with respect to `u`
pub fn d_normal_du(u: f64, v: f64) -> Vector3d {
    let (sin_u, cos_u) = u.sin_cos();
    let (sin_v, cos_v) = v.sin_cos();
    Vector3d::new(cos_u * cos_v, cos_u * sin_v, -sin_u)
}

/// Partial derivative of `n(u, v)` with respect to `v`
pub fn d_normal_dv(u: f64, v: f64) -> Vector3d {
    let (sin_u, _) = u.sin_cos();
    let (sin_v, cos_v) = v.sin_cos();
    Vector3d::new(-sin_u * sin_v, sin_u * cos_v, 0.0)
}

/// Recover `(u, v)` from a unit vector.
///
/// `u` is the polar angle, taken as `atan2(hypot(n.x, n.y), n.z)` so it stays
/// accurate next to the poles. The azimuth magnitude has two candidates,
/// `acos(n.x / s)` and `asin(n.y / s)` with `s = hypot(n.x, n.y)`, plus the
/// mirrored `pi - asin(..)`. Each takes the sign of `n.y`. A ratio that
/// rounds outside [-1, 1] gives a NaN candidate, which is dropped; of the
/// rest the one reconstructing `n` best wins. On the polar axis, or when every
/// candidate is NaN, `v = 0`.
pub fn angles_from_normal(normal: &Vector3d) -> (f64, f64) {
    let planar = normal.x.hypot(normal.y);
    let u = planar.atan2(normal.z);
    if planar == 0.0 {
        return (u, 0.0);
    }

    let from_cos = (normal.x / planar).acos();
    let from_sin = (normal.y / planar).asin().abs();
    let v = [from_cos, from_sin, PI - from_sin]
        .into_iter()
        .filter(|candidate| !candidate.is_nan())
        .map(|candidate| candidate.copysign(normal.y))
        .map(|candidate| (candidate, (normal_from_angles(u, candidate) - normal).norm_squared()))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map_or(0.0, |(candidate, _)| candidate);

    (u, v)
}
