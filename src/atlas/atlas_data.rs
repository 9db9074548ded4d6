//! Atlas Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in atlas_operations.rs

use crate::geometry::geometry_data::ImageHandle;
use image::RgbaImage;

/// Rectangle inside the atlas, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One distinct image of the round and every id whose geometry samples it
#[derive(Debug, Clone)]
pub struct AtlasEntry {
    pub image: ImageHandle,
    pub ids: Vec<u32>,
    /// Size the image occupies in the atlas after downsampling
    pub pack_width: u32,
    pub pack_height: u32,
    /// Where the image was composited by the last repack; excludes the gutter
    pub rect: Option<PackedRect>,
}

/// Packer limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasSettings {
    /// Maximum atlas edge, power of two
    pub max_size: u32,
    pub max_image_dimension: u32,
}

/// Round-scoped atlas builder
#[derive(Debug, Clone)]
pub struct AtlasBuilderData {
    pub settings: AtlasSettings,
    pub entries: Vec<AtlasEntry>,
    /// Dimensions of the last composited atlas, 0 before any repack
    pub width: u32,
    pub height: u32,
}

/// A composited atlas ready for upload
#[derive(Debug, Clone)]
pub struct AtlasTexture {
    pub image: RgbaImage,
    pub width: u32,
    pub height: u32,
    pub needs_upload: bool,
}
