//! Point cloud data structures and functionality

use crate::point::*;
use crate::traits::Bounded;
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// A generic point cloud container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointCloud<T> {
    pub points: Vec<T>,
}

/// A point cloud with per-point normals
pub type OrientedPointCloud = PointCloud<OrientedPoint>;

impl<T> PointCloud<T> {
    /// Create a new empty point cloud
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
        }
    }

    /// Create a point cloud from a vector of points
    pub fn from_points(points: Vec<T>) -> Self {
        Self { points }
    }

    /// Get the number of points in the cloud
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Add a point to the cloud
    pub fn push(&mut self, point: T) {
        self.points.push(point);
    }

    /// Get an iterator over the points
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.points.iter()
    }

    /// Get a mutable iterator over the points
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.points.iter_mut()
    }
}

impl<T> Default for PointCloud<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for PointCloud<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

impl<T> IndexMut<usize> for PointCloud<T> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.points[index]
    }
}

impl<T> IntoIterator for PointCloud<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a PointCloud<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

impl<T> FromIterator<T> for PointCloud<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            points: Vec::from_iter(iter),
        }
    }
}

/// Affine map taking input coordinates into the unit bounding cube.
///
/// `normalized = (original - offset) / scale`, where `offset` is the minimum
/// corner of the bounding box and `scale` its longest side. The same scale is
/// used on all three axes so shapes are not distorted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub offset: Point3d,
    pub scale: f64,
}

impl Normalization {
    /// Compute the transform for a bounding box.
    ///
    /// A degenerate box (all points coincide) keeps unit scale.
    pub fn from_bounds(min: Point3d, max: Point3d) -> Self {
        let extent = max - min;
        let longest = extent.x.max(extent.y).max(extent.z);
        let scale = if longest > 0.0 { longest } else { 1.0 };
        Self { offset: min, scale }
    }

    pub fn apply(&self, point: &Point3d) -> Point3d {
        Point3d::from((point - self.offset) / self.scale)
    }

    /// Map a normalized point back into input coordinates
    pub fn restore(&self, point: &Point3d) -> Point3d {
        self.offset + point.coords * self.scale
    }
}

impl PointCloud<OrientedPoint> {
    /// Build an oriented cloud from parallel position and normal arrays
    pub fn from_parts(positions: &[Point3d], normals: &[Vector3d]) -> Self {
        positions
            .iter()
            .zip(normals)
            .map(|(p, n)| OrientedPoint::new(*p, *n))
            .collect()
    }

    pub fn positions(&self) -> Vec<Point3d> {
        self.points.iter().map(|p| p.position).collect()
    }

    pub fn normals(&self) -> Vec<Vector3d> {
        self.points.iter().map(|p| p.normal).collect()
    }

    /// Rescale positions into the unit bounding cube and unit-normalize normals.
    ///
    /// Zero-length normals are left untouched. Applying this to an already
    /// normalized cloud is the identity.
    pub fn normalize(&mut self) -> Normalization {
        let (min, max) = self.bounding_box();
        let normalization = Normalization::from_bounds(min, max);

        for point in &mut self.points {
            point.position = normalization.apply(&point.position);
            if let Some(unit) = point.normal.try_normalize(0.0) {
                point.normal = unit;
            }
        }

        normalization
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_cloud() -> OrientedPointCloud {
        PointCloud::from_points(vec![
            OrientedPoint::new(Point3d::new(2.0, -1.0, 4.0), Vector3d::new(0.0, 0.0, 3.0)),
            OrientedPoint::new(Point3d::new(6.0, 1.0, 4.5), Vector3d::new(1.0, 1.0, 0.0)),
            OrientedPoint::new(Point3d::new(3.0, 0.0, 5.0), Vector3d::new(0.0, -2.0, 0.0)),
        ])
    }

    #[test]
    fn test_normalize_fits_unit_cube() {
        let mut cloud = sample_cloud();
        let normalization = cloud.normalize();

        assert_relative_eq!(normalization.scale, 4.0);
        assert_relative_eq!(normalization.offset, Point3d::new(2.0, -1.0, 4.0));
        for point in &cloud {
            for axis in 0..3 {
                assert!(point.position[axis] >= 0.0 && point.position[axis] <= 1.0);
            }
            assert_relative_eq!(point.normal.norm(), 1.0, epsilon = 1e-12);
        }
        assert_relative_eq!(cloud[1].position, Point3d::new(1.0, 0.5, 0.125));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut cloud = sample_cloud();
        cloud.normalize();
        let before = cloud.clone();

        let second = cloud.normalize();
        assert_relative_eq!(second.scale, 1.0, epsilon = 1e-12);
        for (a, b) in before.iter().zip(cloud.iter()) {
            assert_relative_eq!(a.position, b.position, epsilon = 1e-12);
            assert_relative_eq!(a.normal, b.normal, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_restore_inverts_apply() {
        let normalization = Normalization::from_bounds(
            Point3d::new(-1.0, 2.0, 0.0),
            Point3d::new(1.0, 3.0, 0.5),
        );
        let p = Point3d::new(0.25, 2.5, 0.1);
        assert_relative_eq!(normalization.restore(&normalization.apply(&p)), p, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_bounds_keep_unit_scale() {
        let mut cloud = PointCloud::from_points(vec![OrientedPoint::default(); 3]);
        let normalization = cloud.normalize();
        assert_eq!(normalization.scale, 1.0);
        assert_eq!(cloud[0].position, Point3d::origin());
    }

    #[test]
    fn test_zero_normal_is_left_alone() {
        let mut cloud = PointCloud::from_points(vec![OrientedPoint::new(
            Point3d::new(1.0, 1.0, 1.0),
            Vector3d::zeros(),
        )]);
        cloud.normalize();
        assert_eq!(cloud[0].normal, Vector3d::zeros());
    }
}
