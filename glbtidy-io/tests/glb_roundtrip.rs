//! Encode/decode tests for the GLB codec

use approx::assert_relative_eq;
use glbtidy_core::{Point3f, Transform3D, TriangleMesh, Vector3f};
use glbtidy_io::{
    export_glb, import_glb, read_glb, write_glb, GlbReader, MaterialInfo, MeshObject, Scene,
    SceneReader,
};

fn quad() -> TriangleMesh {
    let mut mesh = TriangleMesh::from_vertices_and_faces(
        vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(1.0, 2.0, 0.0),
            Point3f::new(0.0, 2.0, 0.0),
        ],
        vec![[0, 1, 2], [0, 2, 3]],
    );
    mesh.set_normals(vec![Vector3f::z(); 4]);
    mesh.set_uvs(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
    mesh.set_colors(vec![[255, 0, 0], [0, 255, 0], [0, 0, 255], [10, 20, 30]]);
    mesh
}

fn sample_scene() -> Scene {
    let material = MaterialInfo {
        name: Some("paint".to_string()),
        base_color: [0.5, 0.25, 1.0, 1.0],
        metallic: 0.1,
        roughness: 0.7,
        double_sided: true,
    };
    let mut scene = Scene::new();
    scene.push(MeshObject::new("plain", quad()));
    scene.push(
        MeshObject::new("moved", quad())
            .with_transform(Transform3D::translation(Vector3f::new(3.0, -1.0, 2.0)))
            .with_material(material),
    );
    scene
}

#[test]
fn test_scene_survives_encode_decode() {
    let scene = sample_scene();
    let bytes = export_glb(&scene).unwrap();
    assert_eq!(&bytes[0..4], b"glTF");
    assert_eq!(bytes.len() % 4, 0);

    let decoded = import_glb(&bytes).unwrap();
    assert_eq!(decoded.len(), 2);
    for (a, b) in scene.iter().zip(decoded.iter()) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.mesh.vertices, b.mesh.vertices);
        assert_eq!(a.mesh.faces, b.mesh.faces);
        assert_eq!(a.mesh.normals, b.mesh.normals);
        assert_eq!(a.mesh.uvs, b.mesh.uvs);
        assert_eq!(a.mesh.colors, b.mesh.colors);
        assert_relative_eq!(a.transform.matrix, b.transform.matrix);
    }
    assert!(decoded.objects[0].material.is_none());
    let material = decoded.objects[1].material.as_ref().unwrap();
    assert_eq!(material.name.as_deref(), Some("paint"));
    assert_eq!(material.base_color, [0.5, 0.25, 1.0, 1.0]);
    assert!(material.double_sided);
    assert_relative_eq!(material.roughness, 0.7);
}

#[test]
fn test_optional_attributes_stay_absent() {
    let mut scene = Scene::new();
    let mesh = TriangleMesh::from_vertices_and_faces(
        vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
        ],
        vec![[0, 1, 2]],
    );
    scene.push(MeshObject::new("bare", mesh));
    let decoded = import_glb(&export_glb(&scene).unwrap()).unwrap();
    let mesh = &decoded.objects[0].mesh;
    assert!(mesh.normals.is_none());
    assert!(mesh.uvs.is_none());
    assert!(mesh.colors.is_none());
}

#[test]
fn test_degenerate_triangles_dropped_on_import() {
    let mut mesh = quad();
    mesh.faces.push([1, 1, 2]);
    let mut scene = Scene::new();
    scene.push(MeshObject::new("dirty", mesh));
    let decoded = import_glb(&export_glb(&scene).unwrap()).unwrap();
    assert_eq!(decoded.objects[0].mesh.faces, vec![[0, 1, 2], [0, 2, 3]]);
}

#[test]
fn test_empty_objects_skipped_on_export() {
    let mut scene = sample_scene();
    scene.push(MeshObject::new("empty", TriangleMesh::new()));
    let decoded = import_glb(&export_glb(&scene).unwrap()).unwrap();
    assert_eq!(decoded.len(), 2);
    assert!(decoded.iter().all(|o| o.name != "empty"));
}

#[test]
fn test_file_roundtrip() {
    let path = std::env::temp_dir().join(format!("glbtidy_io_{}.glb", std::process::id()));
    write_glb(&sample_scene(), &path).unwrap();
    let via_fn = read_glb(&path).unwrap();
    let via_trait = GlbReader::read_scene(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(via_fn, via_trait);
    assert_eq!(via_fn.total_faces(), 4);
}

#[test]
fn test_missing_file_and_garbage() {
    let missing = std::env::temp_dir().join("glbtidy_io_does_not_exist.glb");
    assert!(read_glb(&missing).is_err());
    assert!(import_glb(b"definitely not a glb").is_err());
}

#[test]
fn test_unsupported_extension() {
    let dir = std::env::temp_dir().join("glbtidy_io_extension");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("mesh.obj");
    std::fs::write(&path, b"v 0 0 0").unwrap();
    let err = read_glb(&path).unwrap_err();
    assert!(matches!(err, glbtidy_core::Error::UnsupportedFormat(_)), "{err}");
    std::fs::remove_file(&path).unwrap();
}
