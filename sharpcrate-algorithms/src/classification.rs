//! Bi-normal classification of point neighborhoods
//!
//! For each point the neighbor normals are split into two soft groups, each
//! with its own unit normal. A neighborhood whose two group normals end up
//! close together is explained by one direction (smooth), otherwise it
//! straddles a sharp feature. A low fit residual marks the split as
//! confident.

use crate::clustering::two_means;
use crate::neighborhood::Neighborhoods;
use crate::optimize::{minimize, CappedSimplex, MinimizerConfig, Objective, Termination};
use crate::parallel::{self, ThreadPoolConfig};
use crate::spherical::{angles_from_normal, d_normal_du, d_normal_dv, normal_from_angles};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use sharpcrate_core::{Error, Point3d, Result, Vector3d};

/// Parameters of the bi-normal classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationConfig {
    /// Points with fewer neighbors (self included) are left unlabeled
    pub min_neighbors: usize,
    /// Group normals closer than this mark the point smooth
    pub separation_threshold: f64,
    /// Fit residuals below this mark the point confident
    pub residual_threshold: f64,
    /// Neighbors closer than this get zero weight
    pub duplicate_distance: f64,
    pub kmeans_max_iterations: usize,
    /// Alternating assignment/normal sweeps run before the joint minimization
    pub max_sweeps: usize,
    pub minimizer: MinimizerConfig,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            min_neighbors: 5,
            separation_threshold: 0.29,
            residual_threshold: 0.075,
            duplicate_distance: 1e-4,
            kmeans_max_iterations: 10,
            max_sweeps: 100,
            minimizer: MinimizerConfig::default(),
        }
    }
}

impl ClassificationConfig {
    pub fn with_thresholds(mut self, separation: f64, residual: f64) -> Self {
        self.separation_threshold = separation;
        self.residual_threshold = residual;
        self
    }

    pub fn with_min_neighbors(mut self, min_neighbors: usize) -> Self {
        self.min_neighbors = min_neighbors;
        self
    }

    pub fn with_max_sweeps(mut self, max_sweeps: usize) -> Self {
        self.max_sweeps = max_sweeps;
        self
    }

    pub fn with_minimizer(mut self, minimizer: MinimizerConfig) -> Self {
        self.minimizer = minimizer;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_neighbors < 2 {
            return Err(Error::Config("min_neighbors must be at least 2".to_string()));
        }
        if self.separation_threshold.is_nan() || self.separation_threshold <= 0.0 {
            return Err(Error::Config("separation_threshold must be positive".to_string()));
        }
        if self.residual_threshold.is_nan() || self.residual_threshold <= 0.0 {
            return Err(Error::Config("residual_threshold must be positive".to_string()));
        }
        if self.duplicate_distance.is_nan() || self.duplicate_distance < 0.0 {
            return Err(Error::Config("duplicate_distance must be non-negative".to_string()));
        }
        self.minimizer.validate()
    }
}

/// Optimized two-group explanation of one neighborhood
#[derive(Debug, Clone)]
pub struct BiNormalFit {
    pub first_normal: Vector3d,
    pub second_normal: Vector3d,
    /// Soft membership of each neighbor in the first group, in neighbor order
    pub assignment: Vec<f64>,
    /// Objective value at the returned iterate
    pub residual: f64,
    /// `‖first_normal - second_normal‖`
    pub separation: f64,
    /// Alternating sweeps before the joint minimization
    pub sweeps: usize,
    pub iterations: usize,
    pub termination: Termination,
}

/// Stage-1 labels of a point with a large enough neighborhood
#[derive(Debug, Clone)]
pub struct PointLabels {
    /// One consistent normal direction around the point
    pub smooth: bool,
    /// Low residual of the two-group fit
    pub confident: bool,
    pub fit: BiNormalFit,
}

/// Weighted two-group misfit of neighbor normals.
///
/// Variables are `(x_1..x_k, u1, v1, u2, v2)`: soft memberships followed by
/// the spherical angles of the two group normals.
#[derive(Debug, Clone)]
pub struct BiNormalObjective {
    normals: Vec<Vector3d>,
    weights: Vec<f64>,
}

impl BiNormalObjective {
    pub fn new(normals: Vec<Vector3d>, weights: Vec<f64>) -> Self {
        debug_assert_eq!(normals.len(), weights.len());
        Self { normals, weights }
    }

    pub fn neighbor_count(&self) -> usize {
        self.normals.len()
    }

    /// Best memberships for fixed group normals.
    ///
    /// The objective is linear in the memberships, so over the balanced set
    /// the `k / 2` neighbors with the lowest cost `w_j (d1_j - d2_j)` join the
    /// first group outright. For odd `k` the middle neighbor is split evenly.
    /// Equal costs are ordered by neighbor index.
    fn best_assignment(&self, first: &Vector3d, second: &Vector3d) -> Vec<f64> {
        let k = self.neighbor_count();
        let costs: Vec<f64> = self
            .normals
            .iter()
            .zip(&self.weights)
            .map(|(normal, &w)| w * ((normal - first).norm_squared() - (normal - second).norm_squared()))
            .collect();

        let mut order: Vec<usize> = (0..k).collect();
        order.sort_by(|&a, &b| costs[a].total_cmp(&costs[b]).then(a.cmp(&b)));

        let mut assignment = vec![0.0; k];
        for &j in &order[..k / 2] {
            assignment[j] = 1.0;
        }
        if k % 2 == 1 {
            assignment[order[k / 2]] = 0.5;
        }
        assignment
    }

    /// Best unit group normals for fixed memberships.
    ///
    /// On the unit sphere `sum_j a_j ‖N_j - n‖²` is minimized by the
    /// direction of `sum_j a_j N_j`. A group with no weight keeps `previous`.
    fn best_normals(&self, assignment: &[f64], previous: (Vector3d, Vector3d)) -> (Vector3d, Vector3d) {
        let mut first = Vector3d::zeros();
        let mut second = Vector3d::zeros();
        for ((normal, &w), &x) in self.normals.iter().zip(&self.weights).zip(assignment) {
            first += normal * (w * x);
            second += normal * (w * (1.0 - x));
        }
        (
            first.try_normalize(0.0).unwrap_or(previous.0),
            second.try_normalize(0.0).unwrap_or(previous.1),
        )
    }

    /// Alternate exact assignment and normal updates from the seed normals.
    ///
    /// Each half-step cannot increase the objective, so the loop settles on a
    /// point that is optimal in each block. Returns the memberships, the
    /// normals and the number of sweeps run.
    fn alternate(&self, seeds: (Vector3d, Vector3d), max_sweeps: usize) -> (Vec<f64>, (Vector3d, Vector3d), usize) {
        let mut normals = seeds;
        let mut assignment = self.best_assignment(&normals.0, &normals.1);
        let mut sweeps = 0;
        while sweeps < max_sweeps {
            sweeps += 1;
            normals = self.best_normals(&assignment, normals);
            let next = self.best_assignment(&normals.0, &normals.1);
            if next == assignment {
                break;
            }
            assignment = next;
        }
        (assignment, normals, sweeps)
    }

    fn group_normals(&self, x: &DVector<f64>) -> (Vector3d, Vector3d) {
        let k = self.neighbor_count();
        (
            normal_from_angles(x[k], x[k + 1]),
            normal_from_angles(x[k + 2], x[k + 3]),
        )
    }
}

impl Objective for BiNormalObjective {
    fn dimension(&self) -> usize {
        self.neighbor_count() + 4
    }

    fn evaluate(&self, x: &DVector<f64>, gradient: &mut DVector<f64>) -> f64 {
        let k = self.neighbor_count();
        let (u1, v1, u2, v2) = (x[k], x[k + 1], x[k + 2], x[k + 3]);
        let n1 = normal_from_angles(u1, v1);
        let n2 = normal_from_angles(u2, v2);
        let (dn1_du, dn1_dv) = (d_normal_du(u1, v1), d_normal_dv(u1, v1));
        let (dn2_du, dn2_dv) = (d_normal_du(u2, v2), d_normal_dv(u2, v2));

        let mut value = 0.0;
        let mut angle_gradient = [0.0; 4];
        for (j, (normal, &w)) in self.normals.iter().zip(&self.weights).enumerate() {
            let r1 = normal - n1;
            let r2 = normal - n2;
            let (d1, d2) = (r1.norm_squared(), r2.norm_squared());
            let xj = x[j];

            value += w * (xj * d1 + (1.0 - xj) * d2);
            gradient[j] = w * (d1 - d2);

            let a1 = -2.0 * w * xj;
            let a2 = -2.0 * w * (1.0 - xj);
            angle_gradient[0] += a1 * r1.dot(&dn1_du);
            angle_gradient[1] += a1 * r1.dot(&dn1_dv);
            angle_gradient[2] += a2 * r2.dot(&dn2_du);
            angle_gradient[3] += a2 * r2.dot(&dn2_dv);
        }

        for (slot, g) in angle_gradient.iter().enumerate() {
            gradient[k + slot] = *g;
        }
        value
    }
}

/// Inverse-square distance weights of `neighbors` around `center`.
///
/// Neighbors closer than `duplicate_distance` (including the center itself)
/// get zero weight. The rest are divided by the largest weight; without any
/// positive weight all weights are zero.
pub fn neighbor_weights(
    center: &Point3d,
    neighbors: &[usize],
    positions: &[Point3d],
    duplicate_distance: f64,
) -> Vec<f64> {
    let mut weights: Vec<f64> = neighbors
        .iter()
        .map(|&j| {
            let distance = (positions[j] - center).norm();
            if distance < duplicate_distance {
                0.0
            } else {
                1.0 / (distance * distance)
            }
        })
        .collect();

    let max_weight = weights.iter().copied().fold(0.0, f64::max);
    if max_weight > 0.0 {
        for w in &mut weights {
            *w /= max_weight;
        }
    }
    weights
}

/// Fit two group normals to the neighborhood of point `index`.
///
/// `neighbors` is the baseline neighbor set of the point (self included).
pub fn fit_bi_normal(
    index: usize,
    neighbors: &[usize],
    positions: &[Point3d],
    normals: &[Vector3d],
    config: &ClassificationConfig,
) -> BiNormalFit {
    let k = neighbors.len();
    let neighbor_normals: Vec<Vector3d> = neighbors.iter().map(|&j| normals[j]).collect();
    let weights = neighbor_weights(&positions[index], neighbors, positions, config.duplicate_distance);

    let (seed1, seed2) = two_means(&neighbor_normals, config.kmeans_max_iterations)
        .seeds(neighbor_normals[0]);
    let seeds = (
        seed1.try_normalize(0.0).unwrap_or(seed1),
        seed2.try_normalize(0.0).unwrap_or(seed2),
    );

    // Block-wise optimum first, then the joint problem over every variable.
    let objective = BiNormalObjective::new(neighbor_normals, weights);
    let (assignment, (start1, start2), sweeps) = objective.alternate(seeds, config.max_sweeps);
    let (u1, v1) = angles_from_normal(&start1);
    let (u2, v2) = angles_from_normal(&start2);

    let x0 = DVector::from_iterator(k + 4, assignment.into_iter().chain([u1, v1, u2, v2]));

    let report = minimize(&objective, &CappedSimplex::balanced(k), x0, &config.minimizer);

    let (first_normal, second_normal) = objective.group_normals(&report.x);
    BiNormalFit {
        first_normal,
        second_normal,
        assignment: report.x.rows(0, k).iter().copied().collect(),
        residual: report.value,
        separation: (first_normal - second_normal).norm(),
        sweeps,
        iterations: report.iterations,
        termination: report.termination,
    }
}

/// Label one point, or `None` when its neighborhood is too small.
pub fn classify_point(
    index: usize,
    neighbors: &[usize],
    positions: &[Point3d],
    normals: &[Vector3d],
    config: &ClassificationConfig,
) -> Option<PointLabels> {
    if neighbors.len() < config.min_neighbors {
        return None;
    }

    let fit = fit_bi_normal(index, neighbors, positions, normals, config);
    Some(PointLabels {
        smooth: fit.separation < config.separation_threshold,
        confident: fit.residual < config.residual_threshold,
        fit,
    })
}

/// Label every point of the cloud in parallel.
pub fn classify_all(
    positions: &[Point3d],
    normals: &[Vector3d],
    neighborhoods: &Neighborhoods,
    config: &ClassificationConfig,
    parallel: &ThreadPoolConfig,
) -> Vec<Option<PointLabels>> {
    parallel::map_indices(positions.len(), parallel, |i| {
        classify_point(i, neighborhoods.get(i), positions, normals, config)
    })
}
