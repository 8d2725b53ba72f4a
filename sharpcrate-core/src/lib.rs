//! Core data structures and traits for sharpcrate
//!
//! This crate provides the fundamental types shared by the refinement pipeline:
//! oriented points, point clouds, bounding boxes, cloud normalization and the
//! nearest neighbor search trait.

pub mod point;
pub mod point_cloud;
pub mod traits;
pub mod error;

pub use point::*;
pub use point_cloud::*;
pub use traits::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3, Matrix3, DVector};
