//! Core traits for sharpcrate

use crate::{point::*, point_cloud::*};

/// Trait for nearest neighbor search functionality.
///
/// Implementations are built once and then only queried, so they must be
/// safe to share between worker threads.
pub trait NearestNeighborSearch: Sync {
    /// Find all neighbors within `radius` of `query`.
    ///
    /// Returns `(index, squared_distance)` pairs sorted by ascending squared
    /// distance, ties broken by ascending index. The boundary is inclusive.
    fn find_radius_neighbors(&self, query: &Point3d, radius: f64) -> Vec<(usize, f64)>;

    /// Number of indexed points
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Trait for objects with a spatial extent
pub trait Bounded {
    /// Get the axis-aligned bounding box as `(min, max)`
    fn bounding_box(&self) -> (Point3d, Point3d);

    /// Get the center point of the bounding box
    fn center(&self) -> Point3d {
        let (min, max) = self.bounding_box();
        nalgebra::center(&min, &max)
    }

    /// Length of the bounding box diagonal
    fn diagonal(&self) -> f64 {
        let (min, max) = self.bounding_box();
        (max - min).norm()
    }
}

impl<T: HasPosition> Bounded for PointCloud<T> {
    fn bounding_box(&self) -> (Point3d, Point3d) {
        bounding_box_of(self.points.iter().map(HasPosition::position))
    }
}

impl Bounded for [Point3d] {
    fn bounding_box(&self) -> (Point3d, Point3d) {
        bounding_box_of(self.iter().copied())
    }
}

fn bounding_box_of<I: Iterator<Item = Point3d>>(mut points: I) -> (Point3d, Point3d) {
    let Some(first) = points.next() else {
        return (Point3d::origin(), Point3d::origin());
    };

    let mut min = first;
    let mut max = first;

    for p in points {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        min.z = min.z.min(p.z);

        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
        max.z = max.z.max(p.z);
    }

    (min, max)
}
