//! sharpcrate - sharp feature extraction from oriented point clouds
//!
//! Reads `x y z nx ny nz` records, runs the classification, denoising and
//! refinement stages, and writes every intermediate and final artifact as
//! plain text next to each other in the output directory.

use anyhow::{Context, Result};
use clap::Parser;
use sharpcrate_algorithms::{
    DenoiseConfig, ExtractionConfig, FeatureExtraction, FeaturePipeline, NeighborhoodConfig,
    PipelineConfig, ThreadPoolConfig,
};
use sharpcrate_core::Point3d;
use sharpcrate_io::{OrientedXyzReader, XyzWriter};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sharpcrate")]
#[command(about = "Denoise normals and extract sharp feature points from an oriented point cloud", version)]
struct Cli {
    /// Input file with one `x y z nx ny nz` record per line
    input: PathBuf,

    /// Directory for the output files
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Worker threads (default: one per core)
    #[arg(long)]
    threads: Option<usize>,

    /// Contiguous points handed to a worker at once
    #[arg(long, default_value_t = 100)]
    chunk_size: usize,

    /// Starting radius of the neighborhood search, in normalized units
    #[arg(long, default_value_t = 0.014)]
    initial_radius: f64,

    /// Radius increment of the neighborhood search
    #[arg(long, default_value_t = 0.001)]
    radius_step: f64,

    /// Normal distance below which normals are grouped by the denoiser
    #[arg(long, default_value_t = 0.05)]
    merge_threshold: f64,

    /// Neighborhoods whose normals agree within this many degrees are not refined
    #[arg(long, default_value_t = 20.0)]
    angle_threshold: f64,

    /// Weight keeping refined points close to their original position
    #[arg(long, default_value_t = 0.1)]
    regularization: f64,

    /// Also write the normalized cloud followed by the feature points
    #[arg(long)]
    merged: bool,

    /// Write positions in input units instead of the normalized unit cube
    #[arg(long)]
    original_units: bool,

    /// Only write the feature points
    #[arg(long)]
    skip_intermediate: bool,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn pipeline_config(&self) -> PipelineConfig {
        let mut parallel = ThreadPoolConfig::default().with_chunk_size(self.chunk_size);
        if let Some(threads) = self.threads {
            parallel = parallel.with_threads(threads);
        }

        PipelineConfig::default()
            .with_neighborhood(
                NeighborhoodConfig::default()
                    .with_initial_radius(self.initial_radius)
                    .with_radius_step(self.radius_step),
            )
            .with_denoise(DenoiseConfig::default().with_merge_threshold(self.merge_threshold))
            .with_extraction(
                ExtractionConfig::default()
                    .with_angle_threshold(self.angle_threshold)
                    .with_regularization(self.regularization),
            )
            .with_parallel(parallel)
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Output file naming and coordinate mapping for one run
struct OutputWriter<'a> {
    dir: &'a Path,
    stem: String,
    result: &'a FeatureExtraction,
    original_units: bool,
}

impl OutputWriter<'_> {
    fn path(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}_{}", self.stem, suffix))
    }

    fn map(&self, p: &Point3d) -> Point3d {
        if self.original_units {
            self.result.normalization.restore(p)
        } else {
            *p
        }
    }

    fn positions(&self) -> impl Iterator<Item = Point3d> + '_ {
        self.result.cloud.iter().map(move |p| self.map(&p.position))
    }

    fn write_intermediate(&self) -> Result<()> {
        let result = self.result;

        let path = self.path("normalized.xyz");
        XyzWriter::write_oriented(self.result.cloud.iter().map(|p| (self.map(&p.position), p.normal)), &path)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        let path = self.path("smooth.txt");
        let smooth = (0..result.labels.len()).map(|i| result.is_smooth(i).unwrap_or(false));
        XyzWriter::write_labels(self.positions().zip(smooth), &path)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        let path = self.path("confident.txt");
        let confident = (0..result.labels.len()).map(|i| result.is_confident(i).unwrap_or(false));
        XyzWriter::write_labels(self.positions().zip(confident), &path)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        let path = self.path("normals.xyz");
        let normals = self
            .positions()
            .zip(&result.normals)
            .zip(&result.labels)
            .filter(|(_, labels)| labels.is_some())
            .map(|((p, n), _)| (p, *n));
        XyzWriter::write_oriented(normals, &path)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }

    fn write_features(&self) -> Result<()> {
        let path = self.path("features.xyz");
        let features = self.result.feature_points.values().map(|p| self.map(p));
        XyzWriter::write_points(features, &path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), count = self.result.feature_points.len(), "wrote feature points");
        Ok(())
    }

    fn write_merged(&self) -> Result<()> {
        let path = self.path("merged.xyz");
        let merged = self.result.merged_points();
        XyzWriter::write_points(merged.iter().map(|p| self.map(p)), &path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cloud = OrientedXyzReader::read_point_cloud(&cli.input)
        .with_context(|| format!("Failed to read point cloud from {}", cli.input.display()))?;
    info!(path = %cli.input.display(), points = cloud.len(), "loaded point cloud");

    let pipeline = FeaturePipeline::new(cli.pipeline_config());
    let result = pipeline.run(&cloud).context("Feature extraction failed")?;

    let stats = &result.stats;
    info!(
        radius = stats.radius,
        smooth = stats.smooth_count,
        confident = stats.confident_count,
        candidates = stats.candidate_count,
        accepted = stats.accepted_count,
        "Running Time: {:.3}s",
        stats.running_time().as_secs_f64()
    );

    std::fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("Failed to create {}", cli.output_dir.display()))?;
    let stem = cli
        .input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("cloud")
        .to_string();

    let writer = OutputWriter {
        dir: &cli.output_dir,
        stem,
        result: &result,
        original_units: cli.original_units,
    };

    if !cli.skip_intermediate {
        writer.write_intermediate()?;
    }
    writer.write_features()?;
    if cli.merged {
        writer.write_merged()?;
    }

    Ok(())
}
