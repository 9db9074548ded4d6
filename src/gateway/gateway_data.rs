//! Geometry Gateway Data - Pure DOP
//!
//! NO METHODS. Just data.
//! Request/response payloads exchanged with the geometry service.

use crate::geometry::geometry_data::GeometryBuffers;
use cgmath::Point3;
use futures::channel::oneshot;
use std::collections::VecDeque;

/// Edge-collapse simplification parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecimateParams {
    /// Stop once the mesh has at most this many triangles
    pub target_triangles: usize,
    /// Exponent of the per-iteration error threshold
    pub aggressiveness: f64,
    pub error_base: f64,
    pub iteration_offset: u32,
}

/// Axis-aligned clip region; only X and Z are clipped
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipBounds {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

/// Simplified mesh: compacted vertex attributes plus a triangle index list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecimateResponse {
    pub buffers: GeometryBuffers,
    pub indices: Vec<u32>,
}

/// Clipped, non-indexed triangle soup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipResponse {
    pub buffers: GeometryBuffers,
}

/// A request as it travels to the worker. Buffers are owned by the request.
#[derive(Debug)]
pub enum GeometryRequest {
    Decimate {
        buffers: GeometryBuffers,
        params: DecimateParams,
    },
    Clip {
        buffers: GeometryBuffers,
        indices: Vec<u32>,
        bounds: ClipBounds,
    },
}

#[derive(Debug)]
pub enum GeometryResponse {
    Decimated(DecimateResponse),
    Clipped(ClipResponse),
}

/// What the worker sends back for each request
pub type ServiceResult = Result<GeometryResponse, String>;

/// Counters kept by the gateway
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayMetrics {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
}

/// State shared between callers and the worker thread.
/// `pending` holds one responder per unresolved request, oldest first.
#[derive(Debug, Default)]
pub struct GatewayShared {
    pub pending: VecDeque<oneshot::Sender<ServiceResult>>,
    pub metrics: GatewayMetrics,
}
