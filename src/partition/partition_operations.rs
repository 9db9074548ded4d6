//! Partition Operations - Pure DOP Functions
//!
//! Cell iteration over quantized bounds, candidate lookup and the per-mesh
//! budget weighting.

use super::partition_data::CellCoord;
use crate::gateway::gateway_data::ClipBounds;
use crate::geometry::aabb::{self, AABB};
use crate::geometry::geometry_data::SourceMesh;
use cgmath::Point3;
use rustc_hash::FxHashMap;

/// World-space corner of a cell with the smallest X and Z
pub fn cell_origin(coord: CellCoord, cell_size: f32) -> (f32, f32) {
    (coord.x as f32 * cell_size, coord.z as f32 * cell_size)
}

/// Every cell covered by `bounds`, X outer and Z inner
pub fn cell_coords(bounds: &AABB, cell_size: f32) -> Vec<CellCoord> {
    let x0 = (bounds.min.x / cell_size).floor() as i32;
    let x1 = (bounds.max.x / cell_size).ceil() as i32;
    let z0 = (bounds.min.z / cell_size).floor() as i32;
    let z1 = (bounds.max.z / cell_size).ceil() as i32;

    let mut coords = Vec::with_capacity(((x1 - x0).max(0) * (z1 - z0).max(0)) as usize);
    for x in x0..x1 {
        for z in z0..z1 {
            coords.push(CellCoord { x, z });
        }
    }
    coords
}

/// Indices of the meshes whose bounds contain the cell's center
pub fn meshes_in_cell(meshes: &[SourceMesh], coord: CellCoord, cell_size: f32) -> Vec<usize> {
    let (x, z) = cell_origin(coord, cell_size);
    let (cx, cz) = (x + cell_size / 2.0, z + cell_size / 2.0);

    meshes
        .iter()
        .enumerate()
        .filter(|(_, mesh)| {
            mesh.aabb
                .as_ref()
                .is_some_and(|bounds| aabb::aabb_contains_xz(bounds, cx, cz))
        })
        .map(|(index, _)| index)
        .collect()
}

/// Number of candidate meshes per cell of `bounds`
pub fn cell_weights(
    meshes: &[SourceMesh],
    bounds: &AABB,
    cell_size: f32,
) -> FxHashMap<CellCoord, usize> {
    cell_coords(bounds, cell_size)
        .into_iter()
        .map(|coord| (coord, meshes_in_cell(meshes, coord, cell_size).len()))
        .collect()
}

/// Share of the scene each mesh accounts for: the sum over its cells of one
/// over the number of meshes in that cell
pub fn mesh_budgets(
    meshes: &[SourceMesh],
    weights: &FxHashMap<CellCoord, usize>,
    cell_size: f32,
) -> Vec<f32> {
    meshes
        .iter()
        .map(|mesh| {
            let Some(bounds) = &mesh.aabb else {
                return 0.0;
            };
            cell_coords(bounds, cell_size)
                .into_iter()
                .filter_map(|coord| weights.get(&coord).copied())
                .filter(|&weight| weight > 0)
                .map(|weight| 1.0 / weight as f32)
                .sum()
        })
        .collect()
}

/// Clip region of a cell; Y is not clipped
pub fn clip_bounds(coord: CellCoord, cell_size: f32) -> ClipBounds {
    let (x, z) = cell_origin(coord, cell_size);
    ClipBounds {
        min: Point3::new(x, 0.0, z),
        max: Point3::new(x + cell_size, 0.0, z + cell_size),
    }
}
