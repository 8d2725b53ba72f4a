//! # sharpcrate Algorithms
//!
//! Feature-preserving normal denoising and sharp feature point extraction for
//! oriented point clouds.
//!
//! The pipeline picks a global neighborhood radius, classifies every
//! neighborhood as smooth or two-sided with a bi-normal fit, denoises the
//! normal field, and finally moves points near sharp edges onto the
//! intersection of their neighbors' tangent planes.

pub mod nearest_neighbor;
pub mod neighborhood;
pub mod parallel;
pub mod spherical;
pub mod clustering;
pub mod optimize;
pub mod classification;
pub mod denoise;
pub mod features;
pub mod pipeline;

// Re-export commonly used items
pub use nearest_neighbor::*;
pub use neighborhood::*;
pub use parallel::{build_thread_pool, execute_parallel, map_indices, ThreadPoolConfig};
pub use clustering::*;
pub use optimize::{minimize, CappedSimplex, MinimizeReport, MinimizerConfig, Objective, Projection, Termination, Unconstrained};
pub use classification::*;
pub use denoise::{denoise_normals, majority_group_mean, DenoiseConfig, DenoiseOutcome, DenoisedNormals};
pub use features::*;
pub use pipeline::*;
