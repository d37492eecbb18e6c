//! Cleanup stages for glbtidy
//!
//! The four topology-repair passes that run before decimation, in pipeline order:
//!
//! - [`dedup`]: merge vertices closer than an epsilon
//! - [`loose`]: drop components without real surface area
//! - [`holes`]: close open boundary loops
//! - [`normals`]: make winding consistent and recompute normals
//!
//! Each pass mutates the mesh in place and returns a report describing what changed.

pub mod dedup;
pub mod loose;
pub mod holes;
pub mod normals;

pub use dedup::*;
pub use loose::*;
pub use holes::*;
pub use normals::*;
