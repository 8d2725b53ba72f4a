//! Feature point extraction
//!
//! Points whose neighborhood shows two normal directions are moved towards
//! the intersection of their neighbors' tangent planes. The move is kept only
//! when it is neither negligible nor larger than the neighborhood radius.

use crate::classification::PointLabels;
use crate::denoise::DenoiseOutcome;
use crate::neighborhood::Neighborhoods;
use crate::optimize::{minimize, MinimizerConfig, Objective, Unconstrained};
use crate::parallel::{self, ThreadPoolConfig};
use itertools::Itertools;
use nalgebra::{DVector, Matrix3};
use serde::{Deserialize, Serialize};
use sharpcrate_core::{Error, Point3d, Result, Vector3d};
use std::collections::BTreeMap;

/// Accepted feature positions keyed by point index
pub type FeaturePoints = BTreeMap<usize, Point3d>;

/// Parameters of the feature extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Neighborhoods whose normals all lie within this angle are not refined
    pub angle_threshold_degrees: f64,
    /// Weight pulling the refined position towards the original one
    pub regularization: f64,
    /// Smaller displacements are rejected as negligible
    pub min_displacement: f64,
    /// Used only when the direct solve is unavailable
    pub minimizer: MinimizerConfig,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            angle_threshold_degrees: 20.0,
            regularization: 0.1,
            min_displacement: 1e-5,
            minimizer: MinimizerConfig::default(),
        }
    }
}

impl ExtractionConfig {
    pub fn with_angle_threshold(mut self, degrees: f64) -> Self {
        self.angle_threshold_degrees = degrees;
        self
    }

    pub fn with_regularization(mut self, regularization: f64) -> Self {
        self.regularization = regularization;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.angle_threshold_degrees.is_nan() || !(0.0..=180.0).contains(&self.angle_threshold_degrees) {
            return Err(Error::Config("angle_threshold_degrees must lie in [0, 180]".to_string()));
        }
        if self.regularization.is_nan() || self.regularization < 0.0 {
            return Err(Error::Config("regularization must be non-negative".to_string()));
        }
        if self.min_displacement.is_nan() || self.min_displacement < 0.0 {
            return Err(Error::Config("min_displacement must be non-negative".to_string()));
        }
        self.minimizer.validate()
    }
}

/// Why a labeled point was or was not turned into a feature point
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RefinementOutcome {
    /// The bi-normal fit was confident; excluded
    FitConfident,
    /// All neighbor normals agree within the angle threshold; excluded
    LowAngularDeviation { max_angle: f64 },
    /// The denoiser gave up on the point; excluded
    NoDenoisedNormal,
    /// Refined, but the displacement fell outside the accepted range
    Rejected { position: Point3d, displacement: f64 },
    Accepted { position: Point3d, displacement: f64 },
}

impl RefinementOutcome {
    /// True for every outcome except [`RefinementOutcome::Accepted`]
    pub fn is_excluded(&self) -> bool {
        !matches!(self, RefinementOutcome::Accepted { .. })
    }

    /// True when the point went through position refinement
    pub fn was_refined(&self) -> bool {
        matches!(
            self,
            RefinementOutcome::Accepted { .. } | RefinementOutcome::Rejected { .. }
        )
    }
}

/// Largest angle in degrees between any two of the given normals.
///
/// Zero-length normals are ignored; fewer than two usable normals give 0.
pub fn max_angular_deviation<'a, I>(normals: I) -> f64
where
    I: IntoIterator<Item = &'a Vector3d>,
    I::IntoIter: Clone,
{
    normals
        .into_iter()
        .filter_map(|n| n.try_normalize(0.0))
        .tuple_combinations()
        .map(|(a, b)| a.dot(&b).clamp(-1.0, 1.0).acos().to_degrees())
        .fold(0.0, f64::max)
}

/// `sum_j ((P_j - z) . n_j)^2 + mu * |P_i - z|^2` over a neighborhood
pub struct PlaneFitObjective<'a> {
    positions: Vec<&'a Point3d>,
    normals: Vec<&'a Vector3d>,
    anchor: Point3d,
    regularization: f64,
}

impl<'a> PlaneFitObjective<'a> {
    pub fn new(
        neighbors: &[usize],
        positions: &'a [Point3d],
        normals: &'a [Vector3d],
        anchor: Point3d,
        regularization: f64,
    ) -> Self {
        Self {
            positions: neighbors.iter().map(|&j| &positions[j]).collect(),
            normals: neighbors.iter().map(|&j| &normals[j]).collect(),
            anchor,
            regularization,
        }
    }

    /// Gradient at `z`
    pub fn gradient_at(&self, z: &Point3d) -> Vector3d {
        let mut gradient = -2.0 * self.regularization * (self.anchor - z);
        for (&p, &n) in self.positions.iter().zip(self.normals.iter()) {
            gradient -= 2.0 * (p - z).dot(n) * *n;
        }
        gradient
    }

    /// Constant Hessian `2 (sum_j n_j n_j^T + mu I)`
    pub fn hessian(&self) -> Matrix3<f64> {
        let outer = self
            .normals
            .iter()
            .fold(Matrix3::zeros(), |acc, &n| acc + n * n.transpose());
        2.0 * (outer + Matrix3::identity() * self.regularization)
    }

    /// Minimizer by a single Newton step from the anchor.
    ///
    /// Returns `None` when the Hessian is not positive definite.
    pub fn solve_direct(&self) -> Option<Point3d> {
        let step = self.hessian().cholesky()?.solve(&self.gradient_at(&self.anchor));
        let solution = self.anchor - step;
        solution.iter().all(|c| c.is_finite()).then_some(solution)
    }

    /// Minimizer by gradient descent from the anchor
    pub fn solve_iterative(&self, config: &MinimizerConfig) -> Point3d {
        let x0 = DVector::from_column_slice(self.anchor.coords.as_slice());
        let report = minimize(self, &Unconstrained, x0, config);
        Point3d::new(report.x[0], report.x[1], report.x[2])
    }
}

impl Objective for PlaneFitObjective<'_> {
    fn dimension(&self) -> usize {
        3
    }

    fn evaluate(&self, x: &DVector<f64>, gradient: &mut DVector<f64>) -> f64 {
        let z = Point3d::new(x[0], x[1], x[2]);
        let mut value = self.regularization * (self.anchor - z).norm_squared();
        for (&p, &n) in self.positions.iter().zip(self.normals.iter()) {
            let distance = (p - z).dot(n);
            value += distance * distance;
        }
        gradient.copy_from_slice(self.gradient_at(&z).as_slice());
        value
    }
}

/// Decide and, if needed, refine a single point.
pub fn refine_point(
    index: usize,
    positions: &[Point3d],
    normals: &[Vector3d],
    labels: &[Option<PointLabels>],
    denoise_outcomes: &[Option<DenoiseOutcome>],
    neighborhoods: &Neighborhoods,
    config: &ExtractionConfig,
) -> Option<RefinementOutcome> {
    let point_labels = labels[index].as_ref()?;
    if point_labels.confident {
        return Some(RefinementOutcome::FitConfident);
    }
    if denoise_outcomes[index].map_or(true, |o| o.is_failed()) {
        return Some(RefinementOutcome::NoDenoisedNormal);
    }

    let neighbors = neighborhoods.get(index);
    let max_angle = max_angular_deviation(neighbors.iter().map(|&j| &normals[j]));
    if max_angle < config.angle_threshold_degrees {
        return Some(RefinementOutcome::LowAngularDeviation { max_angle });
    }

    let anchor = positions[index];
    let objective = PlaneFitObjective::new(neighbors, positions, normals, anchor, config.regularization);
    let position = objective
        .solve_direct()
        .unwrap_or_else(|| objective.solve_iterative(&config.minimizer));
    let displacement = (anchor - position).norm();

    if displacement < config.min_displacement || displacement > neighborhoods.radius {
        Some(RefinementOutcome::Rejected { position, displacement })
    } else {
        Some(RefinementOutcome::Accepted { position, displacement })
    }
}

/// Stage output: one outcome per point plus the accepted positions
#[derive(Debug, Clone, Default)]
pub struct ExtractedFeatures {
    /// `None` for unlabeled points
    pub outcomes: Vec<Option<RefinementOutcome>>,
    pub points: FeaturePoints,
}

impl ExtractedFeatures {
    pub fn candidate_count(&self) -> usize {
        self.outcomes.iter().flatten().filter(|o| o.was_refined()).count()
    }
}

/// Refine every eligible point against the denoised normal field.
pub fn extract_feature_points(
    positions: &[Point3d],
    normals: &[Vector3d],
    labels: &[Option<PointLabels>],
    denoise_outcomes: &[Option<DenoiseOutcome>],
    neighborhoods: &Neighborhoods,
    config: &ExtractionConfig,
    parallel: &ThreadPoolConfig,
) -> ExtractedFeatures {
    let outcomes = parallel::map_indices(positions.len(), parallel, |i| {
        refine_point(i, positions, normals, labels, denoise_outcomes, neighborhoods, config)
    });

    let points = outcomes
        .iter()
        .enumerate()
        .filter_map(|(i, outcome)| match outcome {
            Some(RefinementOutcome::Accepted { position, .. }) => Some((i, *position)),
            _ => None,
        })
        .collect();

    ExtractedFeatures { outcomes, points }
}
