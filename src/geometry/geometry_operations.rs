//! Geometry Operations - Pure DOP Functions
//!
//! Index expansion, transform baking and bounds for source meshes.

use super::aabb::{self, AABB};
use super::geometry_data::{Geometry, GeometryBuffers, Material, SourceMesh};
use cgmath::{InnerSpace, Matrix, Matrix3, Matrix4, Point3, SquareMatrix, Transform, Vector3};

/// Create a mesh with an identity transform and no derived state
pub fn create_source_mesh(name: &str, geometry: Geometry, materials: Vec<Material>) -> SourceMesh {
    SourceMesh {
        name: name.to_string(),
        transform: Matrix4::identity(),
        geometry,
        materials,
        children: Vec::new(),
        aabb: None,
        atlas_entries: Vec::new(),
    }
}

/// Number of vertices in the position attribute
pub fn vertex_count(geometry: &Geometry) -> usize {
    geometry.positions.len() / 3
}

/// Number of triangles drawn by the geometry
pub fn triangle_count(geometry: &Geometry) -> usize {
    match &geometry.indices {
        Some(indices) => indices.len() / 3,
        None => vertex_count(geometry) / 3,
    }
}

/// Number of vertices carried by a set of service buffers
pub fn buffers_vertex_count(buffers: &GeometryBuffers) -> usize {
    buffers.positions.len() / 3
}

/// `0..count` as an index list
pub fn identity_indices(count: usize) -> Vec<u32> {
    (0..count as u32).collect()
}

fn expand<T: Copy + Default>(data: &[T], indices: &[u32], width: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(indices.len() * width);
    for &index in indices {
        let start = index as usize * width;
        match data.get(start..start + width) {
            Some(slice) => out.extend_from_slice(slice),
            None => out.extend(std::iter::repeat(T::default()).take(width)),
        }
    }
    out
}

/// Expand indexed geometry into a flat per-triangle-vertex list.
/// Group ranges are in index units, which become vertex units unchanged.
pub fn to_non_indexed(geometry: &mut Geometry) {
    let Some(indices) = geometry.indices.take() else {
        return;
    };

    geometry.positions = expand(&geometry.positions, &indices, 3);
    geometry.normals = expand(&geometry.normals, &indices, 3);
    if let Some(colors) = geometry.colors.as_mut() {
        colors.data = expand(&colors.data, &indices, colors.item_size);
    }
    if let Some(uvs) = geometry.uvs.as_mut() {
        *uvs = expand(uvs, &indices, 2);
    }
    if let Some(ids) = geometry.ids.as_mut() {
        *ids = expand(ids, &indices, 1);
    }
}

fn normal_matrix(transform: &Matrix4<f32>) -> Matrix3<f32> {
    let linear = Matrix3::from_cols(
        transform.x.truncate(),
        transform.y.truncate(),
        transform.z.truncate(),
    );
    linear
        .invert()
        .map(|inverse| inverse.transpose())
        .unwrap_or(linear)
}

/// Apply an affine transform to positions and normals (normals re-normalized)
pub fn apply_transform(geometry: &mut Geometry, transform: &Matrix4<f32>) {
    for p in geometry.positions.chunks_exact_mut(3) {
        let moved = transform.transform_point(Point3::new(p[0], p[1], p[2]));
        p.copy_from_slice(&[moved.x, moved.y, moved.z]);
    }

    let normals = normal_matrix(transform);
    for n in geometry.normals.chunks_exact_mut(3) {
        let mut turned = normals * Vector3::new(n[0], n[1], n[2]);
        if turned.magnitude2() > 0.0 {
            turned = turned.normalize();
        }
        n.copy_from_slice(&[turned.x, turned.y, turned.z]);
    }
}

/// Bake the mesh transform into its geometry once, then drop it
pub fn bake_transform(mesh: &mut SourceMesh) {
    if mesh.transform != Matrix4::identity() {
        let transform = mesh.transform;
        apply_transform(&mut mesh.geometry, &transform);
        mesh.transform = Matrix4::identity();
    }
}

fn accumulate_bounds(mesh: &SourceMesh, parent: &Matrix4<f32>, bounds: &mut Option<AABB>) {
    let world = *parent * mesh.transform;
    for p in mesh.geometry.positions.chunks_exact(3) {
        let point = world.transform_point(Point3::new(p[0], p[1], p[2]));
        match bounds {
            Some(aabb) => aabb::aabb_expand_point(aabb, point),
            None => *bounds = Some(aabb::create_aabb(point, point)),
        }
    }
    for child in &mesh.children {
        accumulate_bounds(child, &world, bounds);
    }
}

/// World-space bounds of a mesh and all of its children
pub fn world_aabb(mesh: &SourceMesh) -> Option<AABB> {
    let mut bounds = None;
    accumulate_bounds(mesh, &Matrix4::identity(), &mut bounds);
    bounds
}

/// World bounds snapped outward to the cell grid, recorded on the mesh
pub fn update_quantized_aabb(mesh: &mut SourceMesh, cell_size: f32) -> Option<AABB> {
    mesh.aabb = world_aabb(mesh).map(|bounds| aabb::aabb_quantize_xz(&bounds, cell_size));
    mesh.aabb
}

/// Wrap service buffers as geometry; `indices` selects indexed draw mode
pub fn geometry_from_buffers(buffers: GeometryBuffers, indices: Option<Vec<u32>>) -> Geometry {
    Geometry {
        positions: buffers.positions,
        normals: buffers.normals,
        colors: Some(super::geometry_data::ColorAttribute {
            data: buffers.colors,
            item_size: 3,
        }),
        uvs: Some(buffers.uvs),
        ids: Some(buffers.ids),
        indices,
        groups: Vec::new(),
    }
}
