//! GLB codec for glbtidy
//!
//! Converts between binary glTF assets and [`Scene`]s of owned triangle meshes. Only
//! what the pipeline touches is decoded: positions, normals, first texture coordinate
//! set, first color set, indices, node transforms and basic material factors.

pub mod error;
pub mod scene;
pub mod glb;

pub use error::*;
pub use scene::*;
pub use glb::*;

use glbtidy_core::Result;
use std::path::Path;

/// Trait for reading scenes from files
pub trait SceneReader {
    fn read_scene<P: AsRef<Path>>(path: P) -> Result<Scene>;
}

/// Trait for writing scenes to files
pub trait SceneWriter {
    fn write_scene<P: AsRef<Path>>(scene: &Scene, path: P) -> Result<()>;
}
