//! Spatial partition grid
//!
//! Fixed-size square cells on the XZ plane. A mesh belongs to every cell
//! whose center lies inside its cell-quantized bounds.

pub mod partition_data;
pub mod partition_operations;

pub use partition_data::{CellCoord, OutputBatch};
