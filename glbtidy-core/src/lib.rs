//! Core data structures and traits for glbtidy
//!
//! This crate provides the indexed triangle mesh shared by every pipeline stage,
//! derived edge topology queries, and the error/warning taxonomy the stages report with.

pub mod point;
pub mod mesh;
pub mod topology;
pub mod traits;
pub mod transform;
pub mod stage;
pub mod error;

pub use point::*;
pub use mesh::*;
pub use topology::*;
pub use traits::*;
pub use transform::*;
pub use stage::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3, Matrix3, Matrix4};

// Type aliases for easier imports
pub type Point = Point3f;
pub type Mesh = TriangleMesh;
