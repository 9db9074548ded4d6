// Chunk Mesher - Data-Oriented Programming (DOP) Architecture
//
// Batches a scene of many small textured meshes into a few large draw
// batches, one per occupied cell of a fixed XZ grid.
// - *_data modules hold plain data, NO METHODS
// - *_operations modules hold the free functions that transform it
//
// Typical flow:
// - create_mesher with a MesherConfig and a GeometryGateway
// - add_mesh for every scene mesh
// - get_chunks to run the two-pass batching round

// Constants module
pub mod constants;

// Core modules
pub mod config;
pub mod error;

// Pipeline stages
pub mod arena;
pub mod atlas;
pub mod gateway;
pub mod geometry;
pub mod partition;

// Batching session
pub mod mesher_data;
pub mod mesher_operations;

// GPU upload
pub mod render_upload;

pub use arena::{VertexArenaData, VertexAttribute};
pub use atlas::{AtlasEntry, AtlasSettings, AtlasTexture};
pub use config::{DecimateConfig, MesherConfig};
pub use error::{ErrorContext, MesherError, MesherResult, OptionExt};
pub use gateway::{CpuGeometryService, GeometryGateway, GeometryService};
pub use geometry::{
    ColorAttribute, Geometry, GeometryBuffers, GeometryGroup, ImageHandle, Material, SourceMesh,
    TextureMap, AABB,
};
pub use mesher_data::MesherData;
pub use mesher_operations::{add_mesh, create_mesher, get_chunks};
pub use partition::{CellCoord, OutputBatch};
