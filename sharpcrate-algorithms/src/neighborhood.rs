//! Fixed-radius neighborhoods and the adaptive global radius search

use crate::parallel::{self, ThreadPoolConfig};
use serde::{Deserialize, Serialize};
use sharpcrate_core::{Error, NearestNeighborSearch, Point3d, Result};
use tracing::{debug, info, warn};

/// Parameters of the adaptive radius search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborhoodConfig {
    /// Starting radius; the first radius evaluated is `initial_radius + radius_step`
    pub initial_radius: f64,
    /// Increment applied before every evaluation
    pub radius_step: f64,
    /// The search stops once the smallest neighborhood reaches this size...
    pub min_count_target: usize,
    /// ...or once the largest neighborhood reaches this size
    pub max_count_target: usize,
    /// Hard cap on the number of radii evaluated
    pub max_iterations: usize,
}

impl Default for NeighborhoodConfig {
    fn default() -> Self {
        Self {
            initial_radius: 0.014,
            radius_step: 0.001,
            min_count_target: 7,
            max_count_target: 30,
            max_iterations: 100_000,
        }
    }
}

impl NeighborhoodConfig {
    pub fn with_initial_radius(mut self, radius: f64) -> Self {
        self.initial_radius = radius;
        self
    }

    pub fn with_radius_step(mut self, step: f64) -> Self {
        self.radius_step = step;
        self
    }

    pub fn with_count_targets(mut self, min: usize, max: usize) -> Self {
        self.min_count_target = min;
        self.max_count_target = max;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_radius.is_nan() || self.initial_radius < 0.0 {
            return Err(Error::Config("initial_radius must be non-negative".to_string()));
        }
        if self.radius_step.is_nan() || self.radius_step <= 0.0 {
            return Err(Error::Config("radius_step must be positive".to_string()));
        }
        if self.max_iterations == 0 {
            return Err(Error::Config("max_iterations must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// Neighbor sets of every point at one shared radius.
///
/// Sets include the point itself and are ordered by ascending distance.
#[derive(Debug, Clone)]
pub struct Neighborhoods {
    pub radius: f64,
    pub sets: Vec<Vec<usize>>,
    pub min_count: usize,
    pub max_count: usize,
    /// Number of radii evaluated to reach `radius`
    pub iterations: usize,
}

impl Neighborhoods {
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn get(&self, index: usize) -> &[usize] {
        &self.sets[index]
    }
}

/// Compute the neighbor set of every point at `radius`.
pub fn radius_neighborhoods<S: NearestNeighborSearch>(
    index: &S,
    positions: &[Point3d],
    radius: f64,
    config: &ThreadPoolConfig,
) -> Vec<Vec<usize>> {
    parallel::map_indices(positions.len(), config, |i| {
        index
            .find_radius_neighbors(&positions[i], radius)
            .into_iter()
            .map(|(idx, _)| idx)
            .collect()
    })
}

/// Grow a single global radius until neighborhoods are dense enough.
///
/// Starting from `initial_radius`, the radius is incremented by `radius_step`
/// and all neighbor sets are recomputed. The loop continues while
/// `min_count < min_count_target && max_count < max_count_target`, so it stops
/// as soon as either bound is reached.
///
/// The loop also stops, with a warning, once the radius spans the whole cloud
/// (no further growth can change any set) or after `max_iterations` radii.
pub fn adaptive_radius_search<S: NearestNeighborSearch>(
    index: &S,
    positions: &[Point3d],
    config: &NeighborhoodConfig,
    parallel: &ThreadPoolConfig,
) -> Result<Neighborhoods> {
    config.validate()?;
    if positions.is_empty() {
        return Err(Error::InvalidData(
            "cannot build neighborhoods of an empty point cloud".to_string(),
        ));
    }

    let diameter = sharpcrate_core::Bounded::diagonal(positions);
    let mut radius = config.initial_radius;
    let mut iterations = 0;

    loop {
        radius += config.radius_step;
        iterations += 1;

        let sets = radius_neighborhoods(index, positions, radius, parallel);
        let (min_count, max_count) = count_range(&sets);
        debug!(radius, min_count, max_count, "radius search step");

        let keep_growing =
            min_count < config.min_count_target && max_count < config.max_count_target;

        if keep_growing && radius > diameter {
            warn!(
                radius,
                min_count, max_count, "neighborhoods saturated before reaching the count targets"
            );
        } else if keep_growing && iterations >= config.max_iterations {
            warn!(radius, iterations, "radius search hit its iteration limit");
        } else if keep_growing {
            continue;
        }

        info!(radius, min_count, max_count, iterations, "selected neighborhood radius");
        return Ok(Neighborhoods {
            radius,
            sets,
            min_count,
            max_count,
            iterations,
        });
    }
}

fn count_range(sets: &[Vec<usize>]) -> (usize, usize) {
    sets.iter().fold((usize::MAX, 0), |(min, max), set| {
        (min.min(set.len()), max.max(set.len()))
    })
}
