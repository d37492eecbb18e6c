//! Scene container passed between the codec and the pipeline

use glbtidy_core::{Transform3D, TriangleMesh};

/// Basic PBR factors carried through processing unchanged
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialInfo {
    pub name: Option<String>,
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub double_sided: bool,
}

/// One mesh of the scene with its world placement
#[derive(Debug, Clone, PartialEq)]
pub struct MeshObject {
    pub name: String,
    /// Geometry in the object's local space
    pub mesh: TriangleMesh,
    pub transform: Transform3D,
    pub material: Option<MaterialInfo>,
}

impl MeshObject {
    pub fn new(name: impl Into<String>, mesh: TriangleMesh) -> Self {
        Self {
            name: name.into(),
            mesh,
            transform: Transform3D::identity(),
            material: None,
        }
    }

    pub fn with_transform(mut self, transform: Transform3D) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_material(mut self, material: MaterialInfo) -> Self {
        self.material = Some(material);
        self
    }
}

/// An ordered set of independently owned mesh objects
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    pub objects: Vec<MeshObject>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, object: MeshObject) {
        self.objects.push(object);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Triangle count summed over every object
    pub fn total_faces(&self) -> usize {
        self.objects.iter().map(|o| o.mesh.face_count()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MeshObject> {
        self.objects.iter()
    }
}

impl FromIterator<MeshObject> for Scene {
    fn from_iter<I: IntoIterator<Item = MeshObject>>(iter: I) -> Self {
        Self {
            objects: iter.into_iter().collect(),
        }
    }
}
