//! Engine-wide constants for the batching pipeline.
//!
//! These are the defaults behind `MesherConfig`; nothing reads them directly
//! at runtime except `MesherConfig::default()`.

/// Vertex arena sizing
pub mod arena {
    /// Maximum number of vertices one batching round can hold
    pub const MAX_VERTICES: usize = 2 * 1024 * 1024;

    pub const POSITION_SIZE: usize = 3;
    pub const NORMAL_SIZE: usize = 3;
    pub const COLOR_SIZE: usize = 3;
    pub const UV_SIZE: usize = 2;
    pub const ID_SIZE: usize = 1;
}

/// Texture atlas sizing
pub mod atlas {
    /// Upper bound for the atlas edge length in pixels
    pub const TEXTURE_SIZE: u32 = 4 * 1024;

    /// Source images larger than this on either axis are downsampled
    pub const MAX_IMAGE_DIMENSION: u32 = 512;

    /// Horizontal gutter reserved to the left of every packed image
    pub const RECT_INSET: u32 = 1;
}

/// Spatial partition grid
pub mod chunking {
    /// Edge length of one output cell in world units
    pub const CHUNK_SIZE: u32 = 16;
}

/// Parameters forwarded to the geometry service's decimation
pub mod decimation {
    pub const TARGET_FRACTION: f32 = 0.5;
    pub const AGGRESSIVENESS: f64 = 7.0;
    pub const ERROR_BASE: f64 = 0.000_000_001;
    pub const ITERATION_OFFSET: u32 = 3;

    /// Hard cap on collapse sweeps in the CPU service
    pub const MAX_ITERATIONS: u32 = 100;
}
