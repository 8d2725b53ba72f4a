//! Three-stage sharp feature extraction pipeline
//!
//! Normalizes the input cloud, selects a global neighborhood radius, then
//! runs classification, normal denoising and feature refinement in order.
//! Each stage completes over every point before the next one starts.

use crate::classification::{classify_all, ClassificationConfig, PointLabels};
use crate::denoise::{denoise_normals, DenoiseConfig, DenoiseOutcome};
use crate::features::{extract_feature_points, ExtractionConfig, FeaturePoints, RefinementOutcome};
use crate::nearest_neighbor::RTreeIndex;
use crate::neighborhood::{adaptive_radius_search, NeighborhoodConfig, Neighborhoods};
use crate::parallel::{self, ThreadPoolConfig};
use serde::{Deserialize, Serialize};
use sharpcrate_core::{Error, Normalization, OrientedPointCloud, Point3d, Result, Vector3d};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Configuration of a full pipeline run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub neighborhood: NeighborhoodConfig,
    pub classification: ClassificationConfig,
    pub denoise: DenoiseConfig,
    pub extraction: ExtractionConfig,
    pub parallel: ThreadPoolConfig,
}

impl PipelineConfig {
    pub fn with_neighborhood(mut self, neighborhood: NeighborhoodConfig) -> Self {
        self.neighborhood = neighborhood;
        self
    }

    pub fn with_classification(mut self, classification: ClassificationConfig) -> Self {
        self.classification = classification;
        self
    }

    pub fn with_denoise(mut self, denoise: DenoiseConfig) -> Self {
        self.denoise = denoise;
        self
    }

    pub fn with_extraction(mut self, extraction: ExtractionConfig) -> Self {
        self.extraction = extraction;
        self
    }

    pub fn with_parallel(mut self, parallel: ThreadPoolConfig) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.neighborhood.validate()?;
        self.classification.validate()?;
        self.denoise.validate()?;
        self.extraction.validate()?;
        self.parallel.validate()
    }
}

/// Counts and timings of a pipeline run
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub point_count: usize,
    /// Points with too few neighbors to be labeled
    pub inert_count: usize,
    pub radius: f64,
    pub radius_iterations: usize,
    pub smooth_count: usize,
    pub confident_count: usize,
    pub kept_normals: usize,
    pub averaged_normals: usize,
    pub denoise_failures: usize,
    /// Points that went through position refinement
    pub candidate_count: usize,
    pub accepted_count: usize,
    pub neighborhood_time: Duration,
    pub classification_time: Duration,
    pub denoise_time: Duration,
    pub extraction_time: Duration,
}

impl PipelineStats {
    /// Time spent in the three per-point stages
    pub fn running_time(&self) -> Duration {
        self.classification_time + self.denoise_time + self.extraction_time
    }

    pub fn total_time(&self) -> Duration {
        self.neighborhood_time + self.running_time()
    }
}

/// Everything a pipeline run produces
#[derive(Debug, Clone)]
pub struct FeatureExtraction {
    /// Input cloud after normalization into the unit cube
    pub cloud: OrientedPointCloud,
    /// Maps normalized coordinates back to input units
    pub normalization: Normalization,
    pub neighborhoods: Neighborhoods,
    /// Stage-1 labels; `None` for inert points
    pub labels: Vec<Option<PointLabels>>,
    /// Denoised normal field
    pub normals: Vec<Vector3d>,
    pub denoise_outcomes: Vec<Option<DenoiseOutcome>>,
    pub outcomes: Vec<Option<RefinementOutcome>>,
    /// Accepted refined positions in normalized coordinates
    pub feature_points: FeaturePoints,
    pub stats: PipelineStats,
}

impl FeatureExtraction {
    pub fn radius(&self) -> f64 {
        self.neighborhoods.radius
    }

    /// `R2` of point `index`, `None` when inert
    pub fn is_smooth(&self, index: usize) -> Option<bool> {
        self.labels[index].as_ref().map(|l| l.smooth)
    }

    /// `R3` of point `index`, `None` when inert
    pub fn is_confident(&self, index: usize) -> Option<bool> {
        self.labels[index].as_ref().map(|l| l.confident)
    }

    /// True unless the point was accepted as a feature point
    pub fn is_excluded(&self, index: usize) -> bool {
        self.outcomes[index].map_or(true, |o| o.is_excluded())
    }

    /// Feature points mapped back to input units
    pub fn restored_feature_points(&self) -> FeaturePoints {
        self.feature_points
            .iter()
            .map(|(&i, p)| (i, self.normalization.restore(p)))
            .collect()
    }

    /// All normalized positions followed by the accepted feature points
    pub fn merged_points(&self) -> Vec<Point3d> {
        self.cloud
            .iter()
            .map(|p| p.position)
            .chain(self.feature_points.values().copied())
            .collect()
    }
}

/// Runs the extraction stages on oriented point clouds
pub struct FeaturePipeline {
    config: PipelineConfig,
}

impl FeaturePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage on a copy of `cloud`.
    pub fn run(&self, cloud: &OrientedPointCloud) -> Result<FeatureExtraction> {
        self.config.validate()?;
        if cloud.is_empty() {
            return Err(Error::InvalidData("input point cloud is empty".to_string()));
        }
        if let Some(index) = cloud.iter().position(|p| !p.is_finite()) {
            return Err(Error::InvalidData(format!(
                "point {} has a non-finite position or normal",
                index
            )));
        }

        let pool = parallel::build_thread_pool(&self.config.parallel)?;
        parallel::execute_parallel(pool.as_ref(), || self.run_stages(cloud))
    }

    fn run_stages(&self, cloud: &OrientedPointCloud) -> Result<FeatureExtraction> {
        let config = &self.config;
        let mut cloud = cloud.clone();
        let normalization = cloud.normalize();
        let positions = cloud.positions();
        let input_normals = cloud.normals();
        info!(points = positions.len(), scale = normalization.scale, "normalized point cloud");

        let start = Instant::now();
        let index = RTreeIndex::new(&positions);
        let neighborhoods =
            adaptive_radius_search(&index, &positions, &config.neighborhood, &config.parallel)?;
        let neighborhood_time = start.elapsed();

        let start = Instant::now();
        let labels = classify_all(
            &positions,
            &input_normals,
            &neighborhoods,
            &config.classification,
            &config.parallel,
        );
        let classification_time = start.elapsed();
        let labeled = labels.iter().flatten();
        let smooth_count = labeled.clone().filter(|l| l.smooth).count();
        let confident_count = labeled.clone().filter(|l| l.confident).count();
        let inert_count = labels.iter().filter(|l| l.is_none()).count();
        info!(
            smooth = smooth_count,
            confident = confident_count,
            inert = inert_count,
            elapsed = ?classification_time,
            "classified neighborhoods"
        );

        let start = Instant::now();
        let denoised = denoise_normals(
            &index,
            &positions,
            &input_normals,
            &labels,
            &neighborhoods,
            &config.denoise,
            &config.parallel,
        );
        let denoise_time = start.elapsed();
        let kept_normals = denoised
            .outcomes
            .iter()
            .filter(|o| matches!(o, Some(DenoiseOutcome::Kept)))
            .count();
        info!(
            kept = kept_normals,
            averaged = denoised.averaged_count(),
            failed = denoised.failed_count(),
            elapsed = ?denoise_time,
            "denoised normals"
        );
        if denoised.failed_count() > 0 {
            warn!(
                failed = denoised.failed_count(),
                "some normals kept their input direction after the search radius stopped growing"
            );
        }

        let start = Instant::now();
        let features = extract_feature_points(
            &positions,
            &denoised.normals,
            &labels,
            &denoised.outcomes,
            &neighborhoods,
            &config.extraction,
            &config.parallel,
        );
        let extraction_time = start.elapsed();
        info!(
            candidates = features.candidate_count(),
            accepted = features.points.len(),
            elapsed = ?extraction_time,
            "extracted feature points"
        );

        let stats = PipelineStats {
            point_count: positions.len(),
            inert_count,
            radius: neighborhoods.radius,
            radius_iterations: neighborhoods.iterations,
            smooth_count,
            confident_count,
            kept_normals,
            averaged_normals: denoised.averaged_count(),
            denoise_failures: denoised.failed_count(),
            candidate_count: features.candidate_count(),
            accepted_count: features.points.len(),
            neighborhood_time,
            classification_time,
            denoise_time,
            extraction_time,
        };
        info!(running_time = ?stats.running_time(), "pipeline finished");

        Ok(FeatureExtraction {
            cloud,
            normalization,
            neighborhoods,
            labels,
            normals: denoised.normals,
            denoise_outcomes: denoised.outcomes,
            outcomes: features.outcomes,
            feature_points: features.points,
            stats,
        })
    }
}

impl Default for FeaturePipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

/// Run the pipeline with the default configuration
pub fn extract_sharp_features(cloud: &OrientedPointCloud) -> Result<FeatureExtraction> {
    FeaturePipeline::default().run(cloud)
}
