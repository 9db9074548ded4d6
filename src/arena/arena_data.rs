//! Vertex Arena Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in arena_operations.rs

use crate::atlas::atlas_data::AtlasBuilderData;
use crate::geometry::geometry_data::{ColorAttribute, GeometryGroup, Material};

/// The five parallel attributes of the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttribute {
    Position,
    Normal,
    Color,
    Uv,
    Id,
}

/// Slot order of `VertexArenaData::attribute_states`
pub const ATTRIBUTE_ORDER: [VertexAttribute; 5] = [
    VertexAttribute::Position,
    VertexAttribute::Normal,
    VertexAttribute::Color,
    VertexAttribute::Uv,
    VertexAttribute::Id,
];

/// Component range of an attribute that changed since the last upload.
/// `count: None` means everything from `offset` to the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRange {
    pub offset: usize,
    pub count: Option<usize>,
}

/// Upload bookkeeping for one attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeState {
    pub needs_update: bool,
    pub update_range: UpdateRange,
}

/// Fixed-capacity multi-attribute vertex buffer for one batching round.
///
/// Every buffer's length equals its cursor. Cursors are in components, so
/// after any merge `positions_cursor / 3 == uvs_cursor / 2 == ids_cursor`.
#[derive(Debug, Clone)]
pub struct VertexArenaData {
    /// Capacity in vertices
    pub capacity: usize,

    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub colors: Vec<f32>,
    pub uvs: Vec<f32>,
    pub ids: Vec<u32>,

    pub positions_cursor: usize,
    pub normals_cursor: usize,
    pub colors_cursor: usize,
    pub uvs_cursor: usize,
    pub ids_cursor: usize,

    /// Id handed to the next merged mesh that carries no ids
    pub current_id: u32,
    /// Vertices visible to a draw call
    pub draw_count: usize,
    /// Indexed by position in `ATTRIBUTE_ORDER`
    pub attribute_states: [AttributeState; 5],
    /// Buffers were moved out by `take_buffers`; merging needs a reset
    pub spent: bool,

    pub atlas: AtlasBuilderData,
}

/// Where a merged mesh's colors come from
#[derive(Debug, Clone, Copy)]
pub enum ColorSource<'a> {
    PerVertex(&'a ColorAttribute),
    Groups {
        groups: &'a [GeometryGroup],
        materials: &'a [Material],
    },
    Uniform([f32; 3]),
}

/// Where a merged mesh's UVs come from
#[derive(Debug, Clone, Copy)]
pub enum UvSource<'a> {
    Copy(&'a [f32]),
    /// Leave the slots at (0,0)
    Sentinel,
}

/// Where a merged mesh's ids come from
#[derive(Debug, Clone, Copy)]
pub enum IdSource<'a> {
    Copy(&'a [u32]),
    /// Fill with the arena's current id, then advance it
    Auto,
}

/// Read-only view of one attribute over the draw range
#[derive(Debug, Clone, Copy)]
pub enum AttributeSlice<'a> {
    F32(&'a [f32]),
    U32(&'a [u32]),
}
