//! Geometry Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in geometry_operations.rs

use super::aabb::AABB;
use crate::atlas::atlas_data::AtlasEntry;
use cgmath::Matrix4;
use image::RgbaImage;
use std::sync::Arc;

/// Shared decoded texture image. Two handles are the same image only if they
/// point at the same allocation.
#[derive(Debug, Clone)]
pub struct ImageHandle(pub Arc<RgbaImage>);

impl PartialEq for ImageHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ImageHandle {}

/// Texture slot of a material; the image may have failed to decode
#[derive(Debug, Clone, Default)]
pub struct TextureMap {
    pub image: Option<ImageHandle>,
}

/// Surface description of a source mesh
#[derive(Debug, Clone)]
pub struct Material {
    /// Linear RGB base color
    pub color: [f32; 3],
    pub map: Option<TextureMap>,
}

/// Per-vertex color attribute with 1..=4 components per vertex
#[derive(Debug, Clone)]
pub struct ColorAttribute {
    pub data: Vec<f32>,
    pub item_size: usize,
}

/// Vertex range drawn with `materials[material_index]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryGroup {
    pub start: usize,
    pub count: usize,
    pub material_index: usize,
}

/// Triangle geometry, optionally indexed
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub colors: Option<ColorAttribute>,
    pub uvs: Option<Vec<f32>>,
    pub ids: Option<Vec<u32>>,
    pub indices: Option<Vec<u32>>,
    pub groups: Vec<GeometryGroup>,
}

/// A mesh handed to the pipeline by the scene collaborator
#[derive(Debug, Clone)]
pub struct SourceMesh {
    pub name: String,
    /// Local-to-world transform; identity once baked into the geometry
    pub transform: Matrix4<f32>,
    pub geometry: Geometry,
    pub materials: Vec<Material>,
    /// Sub-meshes, positioned relative to this mesh
    pub children: Vec<SourceMesh>,
    /// World bounds snapped outward to the cell grid
    pub aabb: Option<AABB>,
    /// Atlas entries carried forward from the decimation pass
    pub atlas_entries: Vec<AtlasEntry>,
}

/// Flat attribute buffers exchanged with the geometry service.
///
/// Moving a value of this type into a gateway call is the ownership transfer:
/// the caller has nothing left to read or write until the response returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryBuffers {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub colors: Vec<f32>,
    pub uvs: Vec<f32>,
    pub ids: Vec<u32>,
}
