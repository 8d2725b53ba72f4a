//! I/O operations for oriented point clouds
//!
//! Reads the `x y z nx ny nz` input format and writes the plain text
//! artifacts produced by the feature extraction pipeline.

pub mod xyz;

pub use xyz::{OrientedXyzReader, XyzWriter};
