//! Partition Data - Pure DOP
//!
//! NO METHODS. Just data.

use crate::atlas::atlas_data::AtlasTexture;
use crate::geometry::geometry_data::Geometry;

/// Cell position in cell units; the cell covers
/// `[x * size, (x + 1) * size] x [z * size, (z + 1) * size]` in world space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCoord {
    pub x: i32,
    pub z: i32,
}

/// One finished draw batch
#[derive(Debug, Clone)]
pub struct OutputBatch {
    /// Indexed after decimation, a plain triangle list after clipping
    pub geometry: Geometry,
    pub texture: Option<AtlasTexture>,
    /// `None` for batches that were not cut to a cell
    pub cell: Option<CellCoord>,
}
