//! Mesher Operations - Pure DOP Functions
//!
//! The two-pass batching run. Pass 1 decimates every queued mesh on its own.
//! Pass 2 walks the cell grid, re-merges the decimated meshes of each cell,
//! packs their textures into one atlas and clips the result to the cell.
//! Each gateway call is awaited before the arena is touched again.

use crate::arena::arena_data::VertexArenaData;
use crate::arena::arena_operations;
use crate::atlas::atlas_data::AtlasSettings;
use crate::atlas::atlas_operations;
use crate::config::MesherConfig;
use crate::error::{MesherError, MesherResult};
use crate::gateway::gateway_data::DecimateParams;
use crate::gateway::gateway_operations::GeometryGateway;
use crate::geometry::aabb;
use crate::geometry::geometry_data::SourceMesh;
use crate::geometry::geometry_operations;
use crate::mesher_data::MesherData;
use crate::partition::partition_data::{CellCoord, OutputBatch};
use crate::partition::partition_operations;

fn atlas_settings(config: &MesherConfig) -> AtlasSettings {
    AtlasSettings {
        max_size: config.atlas_size,
        max_image_dimension: config.max_image_dimension,
    }
}

fn cell_size(data: &MesherData) -> f32 {
    data.config.chunk_size as f32
}

/// Create a session around a validated configuration and a running gateway
pub fn create_mesher(config: MesherConfig, gateway: GeometryGateway) -> MesherResult<MesherData> {
    config.validate()?;
    let arena = arena_operations::create_arena(config.max_vertices, atlas_settings(&config));

    log::info!(
        "[Mesher::create] Arena of {} vertices, atlas up to {}px, {}-unit cells",
        config.max_vertices,
        config.atlas_size,
        config.chunk_size
    );

    Ok(MesherData {
        config,
        arena,
        gateway,
        meshes: Vec::new(),
        aabb: None,
    })
}

/// Queue a mesh for the next run, recording its cell-quantized bounds
pub fn add_mesh(data: &mut MesherData, mut mesh: SourceMesh) {
    match geometry_operations::update_quantized_aabb(&mut mesh, cell_size(data)) {
        Some(bounds) => {
            data.aabb = Some(match &data.aabb {
                Some(union) => aabb::aabb_union(union, &bounds),
                None => bounds,
            });
        }
        None => log::debug!("[Mesher::add_mesh] '{}' has no geometry", mesh.name),
    }
    data.meshes.push(mesh);
}

/// Send the arena contents for decimation and wrap the result as a new
/// indexed mesh that carries this round's atlas entries
pub async fn decimate_current(data: &mut MesherData, name: &str) -> MesherResult<SourceMesh> {
    let triangles = data.arena.draw_count / 3;
    let decimate = &data.config.decimate;
    let params = DecimateParams {
        target_triangles: (triangles as f64 * decimate.target_fraction as f64) as usize,
        aggressiveness: decimate.aggressiveness,
        error_base: decimate.error_base,
        iteration_offset: decimate.iteration_offset,
    };

    let atlas_entries = std::mem::take(&mut data.arena.atlas.entries);
    let buffers = arena_operations::take_buffers(&mut data.arena)?;
    let response = data.gateway.decimate(buffers, params).await?;

    let geometry = geometry_operations::geometry_from_buffers(response.buffers, Some(response.indices));
    let mut mesh = geometry_operations::create_source_mesh(name, geometry, Vec::new());
    mesh.atlas_entries = atlas_entries;
    geometry_operations::update_quantized_aabb(&mut mesh, cell_size(data));

    log::debug!(
        "[Mesher::decimate_current] '{}': {} -> {} triangles",
        name,
        triangles,
        geometry_operations::triangle_count(&mesh.geometry)
    );
    Ok(mesh)
}

/// Merge a decimated mesh into a pass 2 round. Its ids are shifted past
/// every id already in the round so meshes decimated separately stay apart,
/// and its carried atlas entries follow the same shift.
pub fn merge_candidate(arena: &mut VertexArenaData, candidate: &SourceMesh) -> MesherResult<()> {
    let offset = arena.current_id;
    let mut mesh = candidate.clone();
    let overflow = |id: u32| MesherError::IdOverflow {
        mesh: candidate.name.clone(),
        id,
        offset,
    };

    // Next free id after this mesh, when it carries its own ids
    let mut next_id = None;
    if let Some(ids) = mesh.geometry.ids.as_mut() {
        let mut end = offset;
        for id in ids.iter_mut() {
            let rebased = id.checked_add(offset).ok_or_else(|| overflow(*id))?;
            end = end.max(rebased.checked_add(1).ok_or_else(|| overflow(*id))?);
            *id = rebased;
        }
        next_id = Some(end);
    }
    for entry in &mesh.atlas_entries {
        if let Some(&id) = entry.ids.iter().find(|id| id.checked_add(offset).is_none()) {
            return Err(overflow(id));
        }
    }

    arena_operations::merge_mesh(arena, &mut mesh, false, true)?;
    for entry in &mesh.atlas_entries {
        atlas_operations::register_entry(&mut arena.atlas, entry, offset);
    }
    if let Some(next_id) = next_id {
        arena.current_id = next_id;
    }
    Ok(())
}

/// Pack the round's atlas, then clip the arena contents to `coord`
pub async fn chunk_current(data: &mut MesherData, coord: CellCoord) -> MesherResult<OutputBatch> {
    let texture = arena_operations::repack_arena(&mut data.arena);
    let buffers = arena_operations::take_buffers(&mut data.arena)?;

    // The arena is a plain triangle list, so clip with identity indices
    let indices =
        geometry_operations::identity_indices(geometry_operations::buffers_vertex_count(&buffers));
    let bounds = partition_operations::clip_bounds(coord, cell_size(data));
    let response = data.gateway.clip(buffers, indices, bounds).await?;

    Ok(OutputBatch {
        geometry: geometry_operations::geometry_from_buffers(response.buffers, None),
        texture,
        cell: Some(coord),
    })
}

/// Run both passes over every queued mesh. Any failure aborts the run.
/// The session holds no meshes afterwards.
pub async fn get_chunks(data: &mut MesherData) -> MesherResult<Vec<OutputBatch>> {
    let size = cell_size(data);
    let Some(union) = data.aabb else {
        log::info!("[Mesher::get_chunks] No meshes with geometry, nothing to batch");
        data.meshes.clear();
        return Ok(Vec::new());
    };

    // Budget weighting is reported only
    let weights = partition_operations::cell_weights(&data.meshes, &union, size);
    let budgets = partition_operations::mesh_budgets(&data.meshes, &weights, size);
    log::info!(
        "[Mesher::get_chunks] Mesh budgets {:?}",
        &budgets[..budgets.len().min(10)]
    );

    log::info!(
        "[Mesher::get_chunks] Pass 1: decimating {} meshes",
        data.meshes.len()
    );
    let sources = std::mem::take(&mut data.meshes);
    let mut decimated = Vec::with_capacity(sources.len());
    for mut mesh in sources {
        arena_operations::reset(&mut data.arena);
        arena_operations::merge_mesh_tree(&mut data.arena, &mut mesh, true, false)?;
        decimated.push(decimate_current(data, &mesh.name).await?);
    }
    data.meshes = decimated;

    let cells = partition_operations::cell_coords(&union, size);
    log::info!(
        "[Mesher::get_chunks] Pass 2: {} cells over x {}..{} z {}..{}",
        cells.len(),
        union.min.x,
        union.max.x,
        union.min.z,
        union.max.z
    );

    let mut batches = Vec::new();
    for coord in cells {
        let candidates = partition_operations::meshes_in_cell(&data.meshes, coord, size);
        if candidates.is_empty() {
            continue;
        }
        log::debug!(
            "[Mesher::get_chunks] Cell ({}, {}): {} meshes",
            coord.x,
            coord.z,
            candidates.len()
        );

        arena_operations::reset(&mut data.arena);
        for &index in &candidates {
            merge_candidate(&mut data.arena, &data.meshes[index])?;
        }
        let batch = chunk_current(data, coord).await?;
        if batch.geometry.positions.is_empty() {
            // Candidates only touched this cell along its edges
            log::debug!(
                "[Mesher::get_chunks] Cell ({}, {}) is empty after clipping",
                coord.x,
                coord.z
            );
            continue;
        }
        batches.push(batch);
    }

    data.meshes.clear();
    data.aabb = None;
    log::info!("[Mesher::get_chunks] Produced {} batches", batches.len());
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::cpu_service::CpuGeometryService;
    use crate::gateway::gateway_data::{ClipBounds, ClipResponse, DecimateResponse};
    use crate::gateway::service::GeometryService;
    use crate::geometry::geometry_data::GeometryBuffers;
    use crate::geometry::geometry_data::{Geometry, ImageHandle, Material, TextureMap};
    use cgmath::{Matrix4, Vector3};
    use image::{Rgba, RgbaImage};
    use std::sync::Arc;

    fn test_config() -> MesherConfig {
        MesherConfig {
            max_vertices: 30_000,
            ..Default::default()
        }
    }

    fn mesher(config: MesherConfig) -> MesherData {
        let gateway =
            GeometryGateway::spawn(CpuGeometryService::default()).expect("Failed to spawn gateway");
        create_mesher(config, gateway).expect("Failed to create mesher")
    }

    /// Indexed flat grid of `nx` x `nz` quads of `step` units, origin at zero
    fn grid(nx: usize, nz: usize, step: f32) -> Geometry {
        let mut geometry = Geometry::default();
        let mut uvs = Vec::new();
        for i in 0..=nx {
            for j in 0..=nz {
                geometry
                    .positions
                    .extend_from_slice(&[i as f32 * step, 0.0, j as f32 * step]);
                geometry.normals.extend_from_slice(&[0.0, 1.0, 0.0]);
                uvs.extend_from_slice(&[i as f32 / nx as f32, j as f32 / nz as f32]);
            }
        }

        let row = (nz + 1) as u32;
        let mut indices = Vec::new();
        for i in 0..nx as u32 {
            for j in 0..nz as u32 {
                let a = i * row + j;
                let b = a + row;
                indices.extend_from_slice(&[a, a + 1, b + 1, a, b + 1, b]);
            }
        }
        geometry.uvs = Some(uvs);
        geometry.indices = Some(indices);
        geometry
    }

    fn textured(image: &ImageHandle) -> Vec<Material> {
        vec![Material {
            color: [1.0; 3],
            map: Some(TextureMap {
                image: Some(image.clone()),
            }),
        }]
    }

    fn image(rgba: [u8; 4]) -> ImageHandle {
        ImageHandle(Arc::new(RgbaImage::from_pixel(16, 16, Rgba(rgba))))
    }

    fn area_xz(positions: &[f32]) -> f32 {
        positions
            .chunks_exact(9)
            .map(|t| {
                let (ax, az) = (t[3] - t[0], t[5] - t[2]);
                let (bx, bz) = (t[6] - t[0], t[8] - t[2]);
                0.5 * (ax * bz - az * bx).abs()
            })
            .sum()
    }

    #[test]
    fn test_add_mesh_extends_union_bounds() {
        let mut data = mesher(test_config());
        let mut a = geometry_operations::create_source_mesh("a", grid(1, 1, 2.0), Vec::new());
        a.transform = Matrix4::from_translation(Vector3::new(3.0, 0.0, 3.0));
        let mut b = geometry_operations::create_source_mesh("b", grid(1, 1, 2.0), Vec::new());
        b.transform = Matrix4::from_translation(Vector3::new(-20.0, 5.0, 40.0));

        add_mesh(&mut data, a);
        add_mesh(&mut data, b);
        add_mesh(&mut data, geometry_operations::create_source_mesh("empty", Geometry::default(), Vec::new()));

        let union = data.aabb.expect("two meshes with geometry");
        assert_eq!((union.min.x, union.max.x), (-32.0, 16.0));
        assert_eq!((union.min.z, union.max.z), (0.0, 48.0));
        assert_eq!(data.meshes.len(), 3);
    }

    #[test]
    fn test_get_chunks_partitions_scene() {
        let mut data = mesher(test_config());

        let floor = geometry_operations::create_source_mesh(
            "floor",
            grid(16, 8, 2.0),
            textured(&image([0, 200, 0, 255])),
        );
        let mut marker = geometry_operations::create_source_mesh(
            "marker",
            grid(1, 1, 4.0),
            vec![Material {
                color: [1.0, 0.0, 0.0],
                map: None,
            }],
        );
        marker.transform = Matrix4::from_translation(Vector3::new(2.0, 1.0, 36.0));

        add_mesh(&mut data, floor);
        add_mesh(&mut data, marker);

        let batches = pollster::block_on(get_chunks(&mut data)).expect("run succeeds");
        let cells: Vec<CellCoord> = batches.iter().filter_map(|batch| batch.cell).collect();
        assert_eq!(
            cells,
            vec![
                CellCoord { x: 0, z: 0 },
                CellCoord { x: 0, z: 2 },
                CellCoord { x: 1, z: 0 },
            ]
        );

        for batch in &batches {
            let cell = batch.cell.expect("cell batches");
            let bounds = partition_operations::clip_bounds(cell, 16.0);
            assert!(batch.geometry.indices.is_none());
            for p in batch.geometry.positions.chunks_exact(3) {
                assert!(p[0] >= bounds.min.x && p[0] <= bounds.max.x);
                assert!(p[2] >= bounds.min.z && p[2] <= bounds.max.z);
            }
        }

        let floor_area = area_xz(&batches[0].geometry.positions)
            + area_xz(&batches[2].geometry.positions);
        assert!((floor_area - 512.0).abs() < 1e-2, "floor area {}", floor_area);
        let atlas = batches[0].texture.as_ref().expect("floor is textured");
        assert!(atlas.width > 0 && atlas.needs_upload);
        let uvs = batches[0].geometry.uvs.as_ref().expect("uvs");
        assert!(uvs.iter().all(|&uv| (0.0..=1.0).contains(&uv)));

        let marker = &batches[1];
        assert!(marker.texture.is_none());
        let colors = &marker.geometry.colors.as_ref().expect("colors").data;
        assert!(!colors.is_empty());
        for rgb in colors.chunks_exact(3) {
            assert_eq!(rgb, &[1.0, 0.0, 0.0]);
        }
        assert!((area_xz(&marker.geometry.positions) - 16.0).abs() < 1e-4);

        assert!(data.meshes.is_empty());
        assert!(data.aabb.is_none());
    }

    #[test]
    fn test_shared_image_gets_one_rect_with_rebased_ids() {
        let mut data = mesher(test_config());
        let shared = image([10, 20, 30, 255]);

        let mut left = geometry_operations::create_source_mesh("left", grid(1, 1, 2.0), textured(&shared));
        left.transform = Matrix4::from_translation(Vector3::new(1.0, 0.0, 1.0));
        let mut right = geometry_operations::create_source_mesh("right", grid(1, 1, 2.0), textured(&shared));
        right.transform = Matrix4::from_translation(Vector3::new(9.0, 0.0, 9.0));
        add_mesh(&mut data, left);
        add_mesh(&mut data, right);

        let batches = pollster::block_on(get_chunks(&mut data)).expect("run succeeds");
        assert_eq!(batches.len(), 1);
        assert!(batches[0].texture.is_some());

        let entries = &data.arena.atlas.entries;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].ids, vec![0, 1]);

        let ids = batches[0].geometry.ids.as_ref().expect("ids");
        assert!(ids.contains(&0) && ids.contains(&1));
    }

    #[test]
    fn test_overflow_aborts_the_run() {
        let mut data = mesher(MesherConfig {
            max_vertices: 3,
            ..Default::default()
        });
        add_mesh(
            &mut data,
            geometry_operations::create_source_mesh("quad", grid(1, 1, 1.0), Vec::new()),
        );

        let err = pollster::block_on(get_chunks(&mut data)).expect_err("six vertices overflow");
        assert!(matches!(err, MesherError::ArenaOverflow { .. }));
    }

    /// Decimates on the CPU but refuses every clip
    struct FailingClip(CpuGeometryService);

    impl GeometryService for FailingClip {
        fn decimate(
            &mut self,
            buffers: GeometryBuffers,
            params: &DecimateParams,
        ) -> Result<DecimateResponse, String> {
            self.0.decimate(buffers, params)
        }

        fn clip(
            &mut self,
            _buffers: GeometryBuffers,
            _indices: Vec<u32>,
            _bounds: &ClipBounds,
        ) -> Result<ClipResponse, String> {
            Err("clip unavailable".to_string())
        }
    }

    #[test]
    fn test_clip_failure_aborts_the_run() {
        let gateway = GeometryGateway::spawn(FailingClip(CpuGeometryService::default()))
            .expect("Failed to spawn gateway");
        let mut data = create_mesher(test_config(), gateway).expect("Failed to create mesher");
        add_mesh(
            &mut data,
            geometry_operations::create_source_mesh("quad", grid(2, 2, 1.0), Vec::new()),
        );

        let result = pollster::block_on(get_chunks(&mut data));
        match result {
            Err(MesherError::GatewayFailure { operation, reason }) => {
                assert_eq!(operation, "clip");
                assert_eq!(reason, "clip unavailable");
            }
            other => panic!("expected a clip failure, got {:?}", other.map(|b| b.len())),
        }
        assert_eq!(data.gateway.metrics().failed, 1);
    }

    #[test]
    fn test_wall_on_cell_edge_lands_in_one_batch() {
        let mut data = mesher(test_config());
        let wall = Geometry {
            positions: vec![16.0, 0.0, 2.0, 16.0, 4.0, 2.0, 16.0, 0.0, 6.0],
            normals: vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            ..Default::default()
        };
        let mut floor = geometry_operations::create_source_mesh("floor", grid(16, 8, 2.0), Vec::new());
        floor.children.push(geometry_operations::create_source_mesh("wall", wall, Vec::new()));
        add_mesh(&mut data, floor);

        let batches = pollster::block_on(get_chunks(&mut data)).expect("run succeeds");
        let cells: Vec<CellCoord> = batches.iter().filter_map(|batch| batch.cell).collect();
        assert_eq!(cells, vec![CellCoord { x: 0, z: 0 }, CellCoord { x: 1, z: 0 }]);

        let on_edge = |batch: &OutputBatch| {
            batch
                .geometry
                .positions
                .chunks_exact(3)
                .filter(|p| p[0] == 16.0 && p[1] == 4.0)
                .count()
        };
        assert_eq!(on_edge(&batches[0]), 0);
        assert_eq!(on_edge(&batches[1]), 1);
    }

    #[test]
    fn test_rebasing_past_u32_max_is_an_error() {
        let mut arena = arena_operations::create_arena(
            64,
            AtlasSettings {
                max_size: 64,
                max_image_dimension: 32,
            },
        );
        arena.current_id = 5;

        let mut geometry = grid(1, 1, 1.0);
        geometry_operations::to_non_indexed(&mut geometry);
        geometry.ids = Some(vec![u32::MAX - 2; 6]);
        let candidate = geometry_operations::create_source_mesh("tagged", geometry, Vec::new());

        let err = merge_candidate(&mut arena, &candidate).expect_err("ids overflow");
        assert!(matches!(
            err,
            MesherError::IdOverflow { ref mesh, offset: 5, .. } if mesh == "tagged"
        ));
        assert_eq!(arena.draw_count, 0);
        assert_eq!(arena.current_id, 5);
    }

    #[test]
    fn test_empty_session_has_no_batches() {
        let mut data = mesher(test_config());
        let batches = pollster::block_on(get_chunks(&mut data)).expect("run succeeds");
        assert!(batches.is_empty());
        assert!(data.aabb.is_none());
    }
}
