//! Nearest neighbor search implementations

use rstar::primitives::GeomWithData;
use rstar::RTree;
use sharpcrate_core::{NearestNeighborSearch, Point3d};

type IndexedPoint = GeomWithData<[f64; 3], usize>;

/// Static R*-tree over point positions for fixed-radius queries.
///
/// Built once with bulk loading; queries take `&self` and can run from any
/// number of threads.
pub struct RTreeIndex {
    tree: RTree<IndexedPoint>,
}

impl RTreeIndex {
    pub fn new(points: &[Point3d]) -> Self {
        let entries = points
            .iter()
            .enumerate()
            .map(|(idx, p)| GeomWithData::new([p.x, p.y, p.z], idx))
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }
}

impl NearestNeighborSearch for RTreeIndex {
    fn find_radius_neighbors(&self, query: &Point3d, radius: f64) -> Vec<(usize, f64)> {
        let center = [query.x, query.y, query.z];
        let mut neighbors: Vec<(usize, f64)> = self
            .tree
            .locate_within_distance(center, radius * radius)
            .map(|entry| {
                let p = entry.geom();
                let dx = p[0] - center[0];
                let dy = p[1] - center[1];
                let dz = p[2] - center[2];
                (entry.data, dx * dx + dy * dy + dz * dz)
            })
            .collect();
        sort_by_distance(&mut neighbors);
        neighbors
    }

    fn len(&self) -> usize {
        self.tree.size()
    }
}

fn sort_by_distance(neighbors: &mut [(usize, f64)]) {
    neighbors.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    fn random_points(n: usize, seed: u64) -> Vec<Point3d> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| Point3d::new(rng.gen(), rng.gen(), rng.gen()))
            .collect()
    }

    /// Linear scan used as the reference for the R*-tree
    struct BruteForceSearch {
        points: Vec<Point3d>,
    }

    impl BruteForceSearch {
        fn new(points: &[Point3d]) -> Self {
            Self {
                points: points.to_vec(),
            }
        }
    }

    impl NearestNeighborSearch for BruteForceSearch {
        fn find_radius_neighbors(&self, query: &Point3d, radius: f64) -> Vec<(usize, f64)> {
            let radius_squared = radius * radius;
            let mut neighbors: Vec<(usize, f64)> = self.points
                .iter()
                .enumerate()
                .filter_map(|(idx, point)| {
                    let distance_squared = (point - query).norm_squared();
                    if distance_squared <= radius_squared {
                        Some((idx, distance_squared))
                    } else {
                        None
                    }
                })
                .collect();
            sort_by_distance(&mut neighbors);
            neighbors
        }

        fn len(&self) -> usize {
            self.points.len()
        }
    }

    #[test]
    fn test_rtree_matches_brute_force() {
        let points = random_points(500, 7);
        let rtree = RTreeIndex::new(&points);
        let brute = BruteForceSearch::new(&points);

        for query in points.iter().step_by(17) {
            let a = rtree.find_radius_neighbors(query, 0.15);
            let b = brute.find_radius_neighbors(query, 0.15);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_results_are_sorted_and_include_self() {
        let points = random_points(200, 11);
        let index = RTreeIndex::new(&points);
        let neighbors = index.find_radius_neighbors(&points[3], 0.3);

        assert_eq!(neighbors[0], (3, 0.0));
        assert!(neighbors.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn test_duplicate_points_are_ordered_by_index() {
        let p = Point3d::new(0.5, 0.5, 0.5);
        let points = vec![p, Point3d::new(0.0, 0.0, 0.0), p, p];
        let index = RTreeIndex::new(&points);
        let neighbors = index.find_radius_neighbors(&p, 0.01);
        let ids: Vec<usize> = neighbors.iter().map(|(i, _)| *i).collect();
        assert_eq!(ids, vec![0, 2, 3]);
    }

    #[test]
    fn test_planar_grid_queries() {
        // Coplanar points share a coordinate on one axis; the tree must cope.
        let points: Vec<Point3d> = (0..20)
            .flat_map(|i| (0..20).map(move |j| Point3d::new(i as f64 * 0.05, j as f64 * 0.05, 0.0)))
            .collect();
        let index = RTreeIndex::new(&points);
        assert_eq!(index.len(), 400);

        // Interior point: itself plus 4 axis neighbors within 0.06
        let center = Point3d::new(0.5, 0.5, 0.0);
        assert_eq!(index.find_radius_neighbors(&center, 0.06).len(), 5);
    }

    #[test]
    fn test_empty_index() {
        let index = RTreeIndex::new(&[]);
        assert!(index.is_empty());
        assert!(index.find_radius_neighbors(&Point3d::origin(), 1.0).is_empty());
    }
}
