//! Texture atlas builder
//!
//! Collects the distinct images of one batching round, packs them into a
//! single power-of-two atlas and remaps arena UVs into atlas space.

pub mod atlas_data;
pub mod atlas_operations;
pub mod packer;

pub use atlas_data::{AtlasBuilderData, AtlasEntry, AtlasSettings, AtlasTexture, PackedRect};
