//! Majority-group normal denoising
//!
//! Points whose neighborhood is both smooth and confidently fitted keep their
//! normal. Every other labeled point gets the mean normal of the largest
//! coherent group found among nearby smooth points.

use crate::classification::PointLabels;
use crate::neighborhood::Neighborhoods;
use crate::parallel::{self, ThreadPoolConfig};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sharpcrate_core::{Error, NearestNeighborSearch, Point3d, Result, Vector3d};

/// Parameters of the normal denoiser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenoiseConfig {
    /// Normals closer than this are linked into one group
    pub merge_threshold: f64,
    /// First search radius as a multiple of the baseline radius
    pub search_radius_factor: f64,
    /// Radius multiplier applied when too few smooth neighbors were found
    pub growth_factor: f64,
    /// Radius growths attempted before the point is given up on
    pub max_growth_steps: usize,
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self {
            merge_threshold: 0.05,
            search_radius_factor: 3.0,
            growth_factor: 4.0,
            max_growth_steps: 8,
        }
    }
}

impl DenoiseConfig {
    pub fn with_merge_threshold(mut self, threshold: f64) -> Self {
        self.merge_threshold = threshold;
        self
    }

    pub fn with_max_growth_steps(mut self, steps: usize) -> Self {
        self.max_growth_steps = steps;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.merge_threshold.is_nan() || self.merge_threshold <= 0.0 {
            return Err(Error::Config("merge_threshold must be positive".to_string()));
        }
        if self.search_radius_factor.is_nan() || self.search_radius_factor <= 0.0 {
            return Err(Error::Config("search_radius_factor must be positive".to_string()));
        }
        if self.growth_factor.is_nan() || self.growth_factor <= 1.0 {
            return Err(Error::Config("growth_factor must be greater than 1".to_string()));
        }
        Ok(())
    }
}

/// What the denoiser did with one labeled point
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DenoiseOutcome {
    /// Smooth and confident; the input normal is kept bit for bit
    Kept,
    /// Replaced by the mean of the largest coherent group
    Averaged { group_size: usize, search_radius: f64 },
    /// Too few smooth points even at the largest radius; the input normal is
    /// left in place and the point takes no part in refinement
    Failed { search_radius: f64 },
}

impl DenoiseOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, DenoiseOutcome::Failed { .. })
    }
}

/// Denoised normal field
#[derive(Debug, Clone)]
pub struct DenoisedNormals {
    /// One normal per point; unlabeled and failed points keep their input normal.
    /// Averaged normals are not renormalized.
    pub normals: Vec<Vector3d>,
    /// `None` for points without labels
    pub outcomes: Vec<Option<DenoiseOutcome>>,
}

impl DenoisedNormals {
    pub fn averaged_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, Some(DenoiseOutcome::Averaged { .. })))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().flatten().filter(|o| o.is_failed()).count()
    }
}

/// Collect `size` indices around point `index`: the point itself followed by
/// the nearest smooth points, growing the radius when too few are in reach.
///
/// Returns the indices and the radius they were found at, or `Err(radius)`
/// with the last radius tried.
pub fn smooth_neighborhood<S: NearestNeighborSearch>(
    index: usize,
    size: usize,
    search: &S,
    positions: &[Point3d],
    labels: &[Option<PointLabels>],
    base_radius: f64,
    config: &DenoiseConfig,
) -> std::result::Result<(Vec<usize>, f64), f64> {
    let mut radius = base_radius * config.search_radius_factor;

    for step in 0..=config.max_growth_steps {
        if step > 0 {
            radius *= config.growth_factor;
        }

        let mut members = Vec::with_capacity(size);
        members.push(index);
        members.extend(
            search
                .find_radius_neighbors(&positions[index], radius)
                .into_iter()
                .map(|(j, _)| j)
                .filter(|&j| j != index && labels[j].as_ref().is_some_and(|l| l.smooth))
                .take(size.saturating_sub(1)),
        );

        if members.len() >= size {
            return Ok((members, radius));
        }
    }

    Err(radius)
}

/// Mean of the largest group of `normals` under single-link grouping with
/// threshold `merge_threshold`.
///
/// Ties between equally large groups go to the group whose first member comes
/// first. Returns the unnormalized mean and the group size.
pub fn majority_group_mean(normals: &[Vector3d], merge_threshold: f64) -> Option<(Vector3d, usize)> {
    if normals.is_empty() {
        return None;
    }

    let mut groups = DisjointSets::new(normals.len());
    for (a, b) in (0..normals.len()).tuple_combinations() {
        if (normals[a] - normals[b]).norm() < merge_threshold {
            groups.union(a, b);
        }
    }

    let roots: Vec<usize> = (0..normals.len()).map(|i| groups.find(i)).collect();
    let mut sizes = vec![0usize; normals.len()];
    for &root in &roots {
        sizes[root] += 1;
    }

    let (best_root, best_size) = roots
        .iter()
        .fold((roots[0], 0), |best, &root| {
            if sizes[root] > best.1 {
                (root, sizes[root])
            } else {
                best
            }
        });

    let sum = roots
        .iter()
        .zip(normals)
        .filter(|&(&root, _)| root == best_root)
        .fold(Vector3d::zeros(), |acc, (_, n)| acc + n);

    Some((sum / best_size as f64, best_size))
}

/// Denoise the normal of a single point.
pub fn denoise_point<S: NearestNeighborSearch>(
    index: usize,
    search: &S,
    positions: &[Point3d],
    normals: &[Vector3d],
    labels: &[Option<PointLabels>],
    neighborhoods: &Neighborhoods,
    config: &DenoiseConfig,
) -> (Vector3d, Option<DenoiseOutcome>) {
    let Some(point_labels) = &labels[index] else {
        return (normals[index], None);
    };
    if point_labels.smooth && point_labels.confident {
        return (normals[index], Some(DenoiseOutcome::Kept));
    }

    let size = neighborhoods.get(index).len();
    match smooth_neighborhood(index, size, search, positions, labels, neighborhoods.radius, config) {
        Ok((members, search_radius)) => {
            let group: Vec<Vector3d> = members.iter().map(|&j| normals[j]).collect();
            match majority_group_mean(&group, config.merge_threshold) {
                Some((mean, group_size)) => (
                    mean,
                    Some(DenoiseOutcome::Averaged { group_size, search_radius }),
                ),
                None => (normals[index], Some(DenoiseOutcome::Failed { search_radius })),
            }
        }
        Err(search_radius) => (normals[index], Some(DenoiseOutcome::Failed { search_radius })),
    }
}

/// Denoise the whole normal field.
///
/// Reads only the input `normals`; every point's result is independent of the
/// order in which points are processed.
pub fn denoise_normals<S: NearestNeighborSearch>(
    search: &S,
    positions: &[Point3d],
    normals: &[Vector3d],
    labels: &[Option<PointLabels>],
    neighborhoods: &Neighborhoods,
    config: &DenoiseConfig,
    parallel: &ThreadPoolConfig,
) -> DenoisedNormals {
    let results = parallel::map_indices(positions.len(), parallel, |i| {
        denoise_point(i, search, positions, normals, labels, neighborhoods, config)
    });

    let (normals, outcomes) = results.into_iter().unzip();
    DenoisedNormals { normals, outcomes }
}

/// Union-find with path halving and union by size
struct DisjointSets {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSets {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            size: vec![1; len],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
    }
}
