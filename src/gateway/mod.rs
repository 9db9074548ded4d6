//! Geometry gateway
//!
//! Delegates decimation and clipping to a `GeometryService` on a worker
//! thread. Buffers move into a request and come back in its response.

pub mod cpu_service;
pub mod gateway_data;
pub mod gateway_operations;
pub mod service;

pub use cpu_service::CpuGeometryService;
pub use gateway_data::{
    ClipBounds, ClipResponse, DecimateParams, DecimateResponse, GatewayMetrics,
};
pub use gateway_operations::GeometryGateway;
pub use service::GeometryService;
