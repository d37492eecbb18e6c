//! GLB import and export
//!
//! Import walks the default scene's node hierarchy and yields one [`MeshObject`] per
//! triangle primitive, with the node's world transform attached. Export writes each
//! object as one mesh, one node and (when present) one material, backed by a single
//! binary buffer.

use crate::error::{IoError, IoResult};
use crate::scene::{MaterialInfo, MeshObject, Scene};
use crate::{SceneReader, SceneWriter};
use glbtidy_core::{Point3f, Result, Transform3D, TriangleMesh, Vector3f, UV};
use gltf::json;
use json::validation::Checked::Valid;
use json::validation::USize64;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// GLB scene reader
pub struct GlbReader;

/// GLB scene writer
pub struct GlbWriter;

impl SceneReader for GlbReader {
    fn read_scene<P: AsRef<Path>>(path: P) -> Result<Scene> {
        read_glb(path)
    }
}

impl SceneWriter for GlbWriter {
    fn write_scene<P: AsRef<Path>>(scene: &Scene, path: P) -> Result<()> {
        write_glb(scene, path)
    }
}

/// Read a `.glb` (or `.gltf` with sibling buffers) from disk
pub fn read_glb<P: AsRef<Path>>(path: P) -> Result<Scene> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(IoError::FileNotFound {
            path: path.display().to_string(),
        }
        .into());
    }
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if extension != "glb" && extension != "gltf" {
        return Err(IoError::InvalidFormat {
            format: format!("'{}' is not a .glb or .gltf file", path.display()),
        }
        .into());
    }
    let bytes = std::fs::read(path).map_err(IoError::from)?;
    Ok(decode(&bytes, path.parent())?)
}

/// Decode an in-memory GLB
pub fn import_glb(bytes: &[u8]) -> Result<Scene> {
    Ok(decode(bytes, None)?)
}

/// Encode the scene and write it to disk
pub fn write_glb<P: AsRef<Path>>(scene: &Scene, path: P) -> Result<()> {
    let bytes = encode(scene)?;
    std::fs::write(path, bytes).map_err(IoError::from)?;
    Ok(())
}

/// Encode the scene as GLB bytes
pub fn export_glb(scene: &Scene) -> Result<Vec<u8>> {
    Ok(encode(scene)?)
}

fn decode(bytes: &[u8], base: Option<&Path>) -> IoResult<Scene> {
    let gltf::Gltf { document, blob } = gltf::Gltf::from_slice(bytes)?;
    let buffers = gltf::import_buffers(&document, base, blob)?;
    let mut scene = Scene::new();

    let roots: Vec<gltf::Node> = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .map(|s| s.nodes().collect())
        .unwrap_or_default();

    if roots.is_empty() {
        for mesh in document.meshes() {
            read_mesh(&mesh, None, Transform3D::identity(), &buffers, &mut scene);
        }
    } else {
        let mut visited = HashSet::new();
        let mut stack: Vec<(gltf::Node, Transform3D)> = roots
            .into_iter()
            .rev()
            .map(|node| (node, Transform3D::identity()))
            .collect();
        while let Some((node, parent)) = stack.pop() {
            if !visited.insert(node.index()) {
                continue;
            }
            let world = parent.compose(Transform3D::from_cols_array(node.transform().matrix()));
            if let Some(mesh) = node.mesh() {
                read_mesh(&mesh, node.name(), world, &buffers, &mut scene);
            }
            let children: Vec<gltf::Node> = node.children().collect();
            stack.extend(children.into_iter().rev().map(|child| (child, world)));
        }
    }

    info!(
        objects = scene.len(),
        faces = scene.total_faces(),
        "GLB decoded"
    );
    Ok(scene)
}

fn read_mesh(
    mesh: &gltf::Mesh,
    node_name: Option<&str>,
    transform: Transform3D,
    buffers: &[gltf::buffer::Data],
    scene: &mut Scene,
) {
    let base = node_name
        .or_else(|| mesh.name())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("mesh_{}", mesh.index()));
    let primitive_count = mesh.primitives().len();

    for primitive in mesh.primitives() {
        let name = if primitive_count > 1 {
            format!("{base}.{}", primitive.index())
        } else {
            base.clone()
        };
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            warn!(object = %name, mode = ?primitive.mode(), "Skipping non-triangle primitive");
            continue;
        }

        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));
        let Some(positions) = reader.read_positions() else {
            warn!(object = %name, "Skipping primitive without positions");
            continue;
        };

        let mut out = TriangleMesh::new();
        out.vertices = positions.map(Point3f::from).collect();
        let n = out.vertex_count();

        let indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..n as u32).collect(),
        };
        let mut dropped = indices.len() % 3;
        for tri in indices.chunks_exact(3) {
            let face = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let in_range = face.iter().all(|&v| v < n);
            if !in_range || face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
                dropped += 1;
                continue;
            }
            out.faces.push(face);
        }
        if dropped > 0 {
            warn!(object = %name, dropped, "Dropped degenerate or out-of-range triangles");
        }

        if let Some(normals) = reader.read_normals() {
            let normals: Vec<Vector3f> = normals.map(Vector3f::from).collect();
            attach(&name, "NORMAL", n, normals, &mut out.normals);
        }
        if let Some(uvs) = reader.read_tex_coords(0) {
            let uvs: Vec<UV> = uvs.into_f32().collect();
            attach(&name, "TEXCOORD_0", n, uvs, &mut out.uvs);
        }
        if let Some(colors) = reader.read_colors(0) {
            let colors: Vec<[u8; 3]> = colors.into_rgb_u8().collect();
            attach(&name, "COLOR_0", n, colors, &mut out.colors);
        }

        let material = primitive.material();
        let material = material.index().map(|_| {
            let pbr = material.pbr_metallic_roughness();
            MaterialInfo {
                name: material.name().map(str::to_owned),
                base_color: pbr.base_color_factor(),
                metallic: pbr.metallic_factor(),
                roughness: pbr.roughness_factor(),
                double_sided: material.double_sided(),
            }
        });

        debug!(
            object = %name,
            vertices = out.vertex_count(),
            faces = out.face_count(),
            "Primitive imported"
        );
        scene.push(MeshObject {
            name,
            mesh: out,
            transform,
            material,
        });
    }
}

fn attach<T>(object: &str, semantic: &str, expected: usize, values: Vec<T>, slot: &mut Option<Vec<T>>) {
    if values.len() == expected {
        *slot = Some(values);
    } else {
        warn!(
            object,
            semantic,
            expected,
            found = values.len(),
            "Ignoring attribute with mismatched length"
        );
    }
}

/// Append `bytes` to the binary chunk and describe them with a view and an accessor
#[allow(clippy::too_many_arguments)]
fn push_accessor(
    root: &mut json::Root,
    bin: &mut Vec<u8>,
    bytes: &[u8],
    count: usize,
    kind: json::accessor::Type,
    component: json::accessor::ComponentType,
    target: json::buffer::Target,
    bounds: Option<(json::Value, json::Value)>,
) -> json::Index<json::Accessor> {
    while bin.len() % 4 != 0 {
        bin.push(0);
    }
    let offset = bin.len();
    bin.extend_from_slice(bytes);

    let view = json::Index::new(root.buffer_views.len() as u32);
    root.buffer_views.push(json::buffer::View {
        buffer: json::Index::new(0),
        byte_length: USize64::from(bytes.len()),
        byte_offset: Some(USize64::from(offset)),
        byte_stride: None,
        extensions: Default::default(),
        extras: Default::default(),
        name: None,
        target: Some(Valid(target)),
    });

    let (min, max) = match bounds {
        Some((min, max)) => (Some(min), Some(max)),
        None => (None, None),
    };
    let accessor = json::Index::new(root.accessors.len() as u32);
    root.accessors.push(json::Accessor {
        buffer_view: Some(view),
        byte_offset: None,
        count: USize64::from(count),
        component_type: Valid(json::accessor::GenericComponentType(component)),
        extensions: Default::default(),
        extras: Default::default(),
        type_: Valid(kind),
        min,
        max,
        name: None,
        normalized: false,
        sparse: None,
    });
    accessor
}

fn position_bounds(vertices: &[Point3f]) -> (json::Value, json::Value) {
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for v in vertices {
        for axis in 0..3 {
            min[axis] = min[axis].min(v[axis]);
            max[axis] = max[axis].max(v[axis]);
        }
    }
    (json::Value::from(min.to_vec()), json::Value::from(max.to_vec()))
}

fn push_material(root: &mut json::Root, material: &MaterialInfo) -> json::Index<json::Material> {
    let index = json::Index::new(root.materials.len() as u32);
    root.materials.push(json::Material {
        name: material.name.clone(),
        double_sided: material.double_sided,
        pbr_metallic_roughness: json::material::PbrMetallicRoughness {
            base_color_factor: json::material::PbrBaseColorFactor(material.base_color),
            metallic_factor: json::material::StrengthFactor(material.metallic),
            roughness_factor: json::material::StrengthFactor(material.roughness),
            ..Default::default()
        },
        ..Default::default()
    });
    index
}

fn encode(scene: &Scene) -> IoResult<Vec<u8>> {
    use json::accessor::{ComponentType, Type};
    use json::buffer::Target;
    use json::mesh::Semantic;

    let mut root = json::Root::default();
    root.asset.generator = Some(format!("glbtidy {}", env!("CARGO_PKG_VERSION")));
    let mut bin: Vec<u8> = Vec::new();
    let mut nodes = Vec::new();

    for object in scene.iter() {
        let mesh = &object.mesh;
        if mesh.faces.is_empty() {
            debug!(object = %object.name, "Skipping empty object");
            continue;
        }
        let n = mesh.vertex_count();
        let mut attributes = BTreeMap::new();

        let positions = push_accessor(
            &mut root,
            &mut bin,
            bytemuck::cast_slice(&mesh.vertices),
            n,
            Type::Vec3,
            ComponentType::F32,
            Target::ArrayBuffer,
            Some(position_bounds(&mesh.vertices)),
        );
        attributes.insert(Valid(Semantic::Positions), positions);

        if let Some(normals) = &mesh.normals {
            let accessor = push_accessor(
                &mut root,
                &mut bin,
                bytemuck::cast_slice(normals),
                n,
                Type::Vec3,
                ComponentType::F32,
                Target::ArrayBuffer,
                None,
            );
            attributes.insert(Valid(Semantic::Normals), accessor);
        }
        if let Some(uvs) = &mesh.uvs {
            let accessor = push_accessor(
                &mut root,
                &mut bin,
                bytemuck::cast_slice(uvs),
                n,
                Type::Vec2,
                ComponentType::F32,
                Target::ArrayBuffer,
                None,
            );
            attributes.insert(Valid(Semantic::TexCoords(0)), accessor);
        }
        if let Some(colors) = &mesh.colors {
            let floats: Vec<[f32; 3]> = colors
                .iter()
                .map(|c| c.map(|x| x as f32 / 255.0))
                .collect();
            let accessor = push_accessor(
                &mut root,
                &mut bin,
                bytemuck::cast_slice(&floats),
                n,
                Type::Vec3,
                ComponentType::F32,
                Target::ArrayBuffer,
                None,
            );
            attributes.insert(Valid(Semantic::Colors(0)), accessor);
        }

        let indices: Vec<u32> = mesh
            .faces
            .iter()
            .flatten()
            .map(|&v| u32::try_from(v))
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| IoError::WriteError {
                message: format!("object '{}' has indices beyond u32", object.name),
            })?;
        let index_accessor = push_accessor(
            &mut root,
            &mut bin,
            bytemuck::cast_slice(&indices),
            indices.len(),
            Type::Scalar,
            ComponentType::U32,
            Target::ElementArrayBuffer,
            None,
        );

        let material = object
            .material
            .as_ref()
            .map(|m| push_material(&mut root, m));

        let mesh_index = json::Index::new(root.meshes.len() as u32);
        root.meshes.push(json::Mesh {
            extensions: Default::default(),
            extras: Default::default(),
            name: Some(object.name.clone()),
            primitives: vec![json::mesh::Primitive {
                attributes,
                extensions: Default::default(),
                extras: Default::default(),
                indices: Some(index_accessor),
                material,
                mode: Valid(json::mesh::Mode::Triangles),
                targets: None,
            }],
            weights: None,
        });

        let matrix = (!object.transform.is_identity(1e-7)).then(|| {
            let mut flat = [0.0f32; 16];
            for (c, col) in object.transform.to_cols_array().iter().enumerate() {
                flat[c * 4..c * 4 + 4].copy_from_slice(col);
            }
            flat
        });
        nodes.push(json::Index::new(root.nodes.len() as u32));
        root.nodes.push(json::Node {
            camera: None,
            children: None,
            extensions: Default::default(),
            extras: Default::default(),
            matrix,
            mesh: Some(mesh_index),
            name: Some(object.name.clone()),
            rotation: None,
            scale: None,
            translation: None,
            skin: None,
            weights: None,
        });
    }

    while bin.len() % 4 != 0 {
        bin.push(0);
    }
    if !bin.is_empty() {
        root.buffers.push(json::Buffer {
            byte_length: USize64::from(bin.len()),
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            uri: None,
        });
    }
    root.scenes.push(json::Scene {
        extensions: Default::default(),
        extras: Default::default(),
        name: None,
        nodes,
    });
    root.scene = Some(json::Index::new(0));

    let json_bytes = json::serialize::to_vec(&root).map_err(|e| IoError::WriteError {
        message: e.to_string(),
    })?;
    let padded = |len: usize| (len + 3) & !3;
    let mut length = 12 + 8 + padded(json_bytes.len());
    if !bin.is_empty() {
        length += 8 + bin.len();
    }
    let length = u32::try_from(length).map_err(|_| IoError::WriteError {
        message: format!("GLB of {length} bytes exceeds the 4 GiB container limit"),
    })?;

    let glb = gltf::binary::Glb {
        header: gltf::binary::Header {
            magic: *b"glTF",
            version: 2,
            length,
        },
        json: Cow::Owned(json_bytes),
        bin: (!bin.is_empty()).then_some(Cow::Owned(bin)),
    };
    let bytes = glb.to_vec()?;
    info!(
        objects = root.nodes.len(),
        bytes = bytes.len(),
        "GLB encoded"
    );
    Ok(bytes)
}
