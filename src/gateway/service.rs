//! The geometry service seam
//!
//! Implementations run on the gateway's worker thread and own whatever state
//! they need; each call receives its buffers by value.

use super::gateway_data::{ClipBounds, ClipResponse, DecimateParams, DecimateResponse};
use crate::geometry::geometry_data::GeometryBuffers;

/// Remote or in-process mesh simplification and clipping
pub trait GeometryService: Send + 'static {
    /// Simplify a non-indexed triangle soup to roughly
    /// `params.target_triangles` triangles
    fn decimate(
        &mut self,
        buffers: GeometryBuffers,
        params: &DecimateParams,
    ) -> Result<DecimateResponse, String>;

    /// Keep only the parts of the indexed triangles inside `bounds` on X and
    /// Z, cutting triangles that straddle the boundary
    fn clip(
        &mut self,
        buffers: GeometryBuffers,
        indices: Vec<u32>,
        bounds: &ClipBounds,
    ) -> Result<ClipResponse, String>;
}
