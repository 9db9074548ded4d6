//! Vertex arena and merge operator
//!
//! A fixed-capacity set of parallel vertex attributes that source meshes are
//! appended to for one batching round.

pub mod arena_data;
pub mod arena_operations;

pub use arena_data::{
    AttributeSlice, AttributeState, ColorSource, IdSource, UpdateRange, UvSource,
    VertexArenaData, VertexAttribute,
};
