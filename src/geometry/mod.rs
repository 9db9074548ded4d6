//! Source mesh model: attributes, transforms and cell-quantized bounds

pub mod aabb;
pub mod geometry_data;
pub mod geometry_operations;

pub use aabb::AABB;
pub use geometry_data::{
    ColorAttribute, Geometry, GeometryBuffers, GeometryGroup, ImageHandle, Material, SourceMesh,
    TextureMap,
};
