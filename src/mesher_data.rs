//! Mesher Data - Pure DOP
//!
//! NO METHODS. Just data.
//! The batching session: configuration, the round-scoped arena, the meshes
//! queued for the next `get_chunks` run and their combined bounds.

use crate::arena::arena_data::VertexArenaData;
use crate::config::MesherConfig;
use crate::gateway::gateway_operations::GeometryGateway;
use crate::geometry::aabb::AABB;
use crate::geometry::geometry_data::SourceMesh;

pub struct MesherData {
    pub config: MesherConfig,
    pub arena: VertexArenaData,
    pub gateway: GeometryGateway,
    pub meshes: Vec<SourceMesh>,
    /// Union of the quantized bounds of every queued mesh
    pub aabb: Option<AABB>,
}
