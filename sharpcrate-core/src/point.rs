//! Point types and related functionality

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// A 3D point with double precision coordinates
pub type Point3d = Point3<f64>;

/// A 3D vector with double precision components
pub type Vector3d = Vector3<f64>;

/// A point with a surface normal estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientedPoint {
    pub position: Point3d,
    pub normal: Vector3d,
}

impl OrientedPoint {
    pub fn new(position: Point3d, normal: Vector3d) -> Self {
        Self { position, normal }
    }

    /// True when no coordinate of the position or normal is NaN or infinite
    pub fn is_finite(&self) -> bool {
        self.position.iter().chain(self.normal.iter()).all(|c| c.is_finite())
    }
}

impl Default for OrientedPoint {
    fn default() -> Self {
        Self {
            position: Point3d::origin(),
            normal: Vector3d::new(0.0, 0.0, 1.0),
        }
    }
}

/// Anything that has a location in space
pub trait HasPosition {
    fn position(&self) -> Point3d;
}

impl HasPosition for Point3d {
    fn position(&self) -> Point3d {
        *self
    }
}

impl HasPosition for OrientedPoint {
    fn position(&self) -> Point3d {
        self.position
    }
}
