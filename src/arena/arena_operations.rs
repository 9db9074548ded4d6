//! Vertex Arena Operations - Pure DOP Functions
//!
//! Merging appends one source mesh as a triangle soup to all five attributes.
//! Colors, UVs and ids are synthesized when the mesh does not carry them, so
//! the cursors always advance by the same vertex count.

use super::arena_data::{
    AttributeSlice, AttributeState, ColorSource, IdSource, UpdateRange, UvSource,
    VertexArenaData, VertexAttribute, ATTRIBUTE_ORDER,
};
use crate::atlas::atlas_data::{AtlasSettings, AtlasTexture};
use crate::atlas::atlas_operations;
use crate::constants::arena::{COLOR_SIZE, ID_SIZE, NORMAL_SIZE, POSITION_SIZE, UV_SIZE};
use crate::error::{MesherError, MesherResult};
use crate::geometry::geometry_data::{GeometryBuffers, ImageHandle, SourceMesh};
use crate::geometry::geometry_operations;
use cgmath::{Matrix4, SquareMatrix};

const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

const CLEAN: AttributeState = AttributeState {
    needs_update: false,
    update_range: UpdateRange {
        offset: 0,
        count: None,
    },
};

/// Create an arena holding up to `capacity` vertices
pub fn create_arena(capacity: usize, atlas: AtlasSettings) -> VertexArenaData {
    VertexArenaData {
        capacity,
        positions: Vec::with_capacity(capacity * POSITION_SIZE),
        normals: Vec::with_capacity(capacity * NORMAL_SIZE),
        colors: Vec::with_capacity(capacity * COLOR_SIZE),
        uvs: Vec::with_capacity(capacity * UV_SIZE),
        ids: Vec::with_capacity(capacity * ID_SIZE),
        positions_cursor: 0,
        normals_cursor: 0,
        colors_cursor: 0,
        uvs_cursor: 0,
        ids_cursor: 0,
        current_id: 0,
        draw_count: 0,
        attribute_states: [CLEAN; 5],
        spent: false,
        atlas: atlas_operations::create_atlas_builder(atlas),
    }
}

/// Start a new round: fresh buffers, zeroed cursors and id counter, empty atlas
pub fn reset(data: &mut VertexArenaData) {
    *data = create_arena(data.capacity, data.atlas.settings);
}

/// Components per vertex
pub fn attribute_size(attribute: VertexAttribute) -> usize {
    match attribute {
        VertexAttribute::Position => POSITION_SIZE,
        VertexAttribute::Normal => NORMAL_SIZE,
        VertexAttribute::Color => COLOR_SIZE,
        VertexAttribute::Uv => UV_SIZE,
        VertexAttribute::Id => ID_SIZE,
    }
}

fn state_index(attribute: VertexAttribute) -> usize {
    match attribute {
        VertexAttribute::Position => 0,
        VertexAttribute::Normal => 1,
        VertexAttribute::Color => 2,
        VertexAttribute::Uv => 3,
        VertexAttribute::Id => 4,
    }
}

/// Vertices written so far this round
pub fn vertex_len(data: &VertexArenaData) -> usize {
    data.positions_cursor / POSITION_SIZE
}

/// The texture image of the mesh's first material, if it decoded
pub fn first_image(mesh: &SourceMesh) -> Option<&ImageHandle> {
    mesh.materials.first()?.map.as_ref()?.image.as_ref()
}

/// Pick the color path for a mesh
pub fn color_source(mesh: &SourceMesh) -> ColorSource<'_> {
    if let Some(colors) = &mesh.geometry.colors {
        ColorSource::PerVertex(colors)
    } else if !mesh.geometry.groups.is_empty() {
        ColorSource::Groups {
            groups: &mesh.geometry.groups,
            materials: &mesh.materials,
        }
    } else {
        ColorSource::Uniform(mesh.materials.first().map_or(WHITE, |m| m.color))
    }
}

/// Pick the UV path for a mesh. UVs are only kept when something will sample
/// them: the mesh has a texture image, or the caller forces them.
pub fn uv_source(mesh: &SourceMesh, force_uvs: bool) -> UvSource<'_> {
    match &mesh.geometry.uvs {
        Some(uvs) if force_uvs || first_image(mesh).is_some() => UvSource::Copy(uvs),
        _ => UvSource::Sentinel,
    }
}

/// Pick the id path for a mesh
pub fn id_source(mesh: &SourceMesh) -> IdSource<'_> {
    match &mesh.geometry.ids {
        Some(ids) => IdSource::Copy(ids),
        None => IdSource::Auto,
    }
}

/// Append exactly `len` components, zero-padding a short source
fn append_exact<T: Copy + Default>(
    buffer: &mut Vec<T>,
    cursor: &mut usize,
    source: &[T],
    len: usize,
) -> UpdateRange {
    let offset = *cursor;
    let copied = source.len().min(len);
    buffer.extend_from_slice(&source[..copied]);
    buffer.resize(offset + len, T::default());
    *cursor += len;
    UpdateRange {
        offset,
        count: Some(len),
    }
}

fn append_colors(data: &mut VertexArenaData, source: ColorSource<'_>, count: usize) -> UpdateRange {
    let offset = data.colors_cursor;
    let len = count * COLOR_SIZE;

    match source {
        ColorSource::PerVertex(attribute) => {
            let item_size = attribute.item_size.max(1);
            for vertex in 0..count {
                for component in 0..COLOR_SIZE {
                    let value = if component < item_size {
                        attribute
                            .data
                            .get(vertex * item_size + component)
                            .copied()
                            .unwrap_or(0.0)
                    } else {
                        0.0
                    };
                    data.colors.push(value);
                }
            }
        }
        ColorSource::Groups { groups, materials } => {
            data.colors.resize(offset + len, 0.0);
            for group in groups {
                let color = materials.get(group.material_index).map_or(WHITE, |m| m.color);
                let end = (group.start + group.count).min(count);
                for vertex in group.start.min(end)..end {
                    let at = offset + vertex * COLOR_SIZE;
                    data.colors[at..at + COLOR_SIZE].copy_from_slice(&color);
                }
            }
        }
        ColorSource::Uniform(color) => {
            for _ in 0..count {
                data.colors.extend_from_slice(&color);
            }
        }
    }

    data.colors_cursor += len;
    UpdateRange {
        offset,
        count: Some(len),
    }
}

fn mark_dirty(data: &mut VertexArenaData, attribute: VertexAttribute, range: UpdateRange) {
    let state = &mut data.attribute_states[state_index(attribute)];
    if !state.needs_update {
        *state = AttributeState {
            needs_update: true,
            update_range: range,
        };
        return;
    }

    let current = state.update_range;
    let offset = current.offset.min(range.offset);
    let count = match (current.count, range.count) {
        (Some(a), Some(b)) => Some((current.offset + a).max(range.offset + b) - offset),
        _ => None,
    };
    state.update_range = UpdateRange { offset, count };
}

/// Append one mesh to the arena.
///
/// The mesh's geometry is expanded to a triangle soup and its transform baked
/// in place. When `track_atlas` is set and the mesh keeps its UVs, its texture
/// image is registered under the id its first vertex receives. Fails with
/// `ArenaOverflow` before anything is written.
pub fn merge_mesh(
    data: &mut VertexArenaData,
    mesh: &mut SourceMesh,
    track_atlas: bool,
    force_uvs: bool,
) -> MesherResult<()> {
    if data.spent {
        return Err(MesherError::ArenaSpent);
    }

    geometry_operations::to_non_indexed(&mut mesh.geometry);
    geometry_operations::bake_transform(mesh);
    let mesh = &*mesh;

    let count = geometry_operations::vertex_count(&mesh.geometry);
    let requested = vertex_len(data) + count;
    if requested > data.capacity {
        return Err(MesherError::ArenaOverflow {
            attribute: "position",
            requested,
            capacity: data.capacity,
        });
    }
    debug_assert_eq!(mesh.geometry.normals.len(), mesh.geometry.positions.len());

    let colors = color_source(mesh);
    let uvs = uv_source(mesh, force_uvs);
    let ids = id_source(mesh);

    let first_id = match ids {
        IdSource::Copy(ids) => ids.first().copied().unwrap_or(data.current_id),
        IdSource::Auto => data.current_id,
    };
    if track_atlas {
        if let (UvSource::Copy(_), Some(image)) = (uvs, first_image(mesh)) {
            atlas_operations::register_image(&mut data.atlas, image, first_id);
        }
    }

    let range = append_exact(
        &mut data.positions,
        &mut data.positions_cursor,
        &mesh.geometry.positions,
        count * POSITION_SIZE,
    );
    mark_dirty(data, VertexAttribute::Position, range);

    let range = append_exact(
        &mut data.normals,
        &mut data.normals_cursor,
        &mesh.geometry.normals,
        count * NORMAL_SIZE,
    );
    mark_dirty(data, VertexAttribute::Normal, range);

    let range = append_colors(data, colors, count);
    mark_dirty(data, VertexAttribute::Color, range);

    let uv_data: &[f32] = match uvs {
        UvSource::Copy(uvs) => uvs,
        UvSource::Sentinel => &[],
    };
    let range = append_exact(&mut data.uvs, &mut data.uvs_cursor, uv_data, count * UV_SIZE);
    mark_dirty(data, VertexAttribute::Uv, range);

    let range = match ids {
        IdSource::Copy(ids) => append_exact(&mut data.ids, &mut data.ids_cursor, ids, count),
        IdSource::Auto => {
            let offset = data.ids_cursor;
            data.ids.resize(offset + count, data.current_id);
            data.ids_cursor += count;
            data.current_id += 1;
            UpdateRange {
                offset,
                count: Some(count),
            }
        }
    };
    mark_dirty(data, VertexAttribute::Id, range);

    data.draw_count = vertex_len(data);

    log::debug!(
        "[arena_operations::merge_mesh] Merged '{}': {} vertices, first id {}, draw count {}",
        mesh.name,
        count,
        first_id,
        data.draw_count
    );

    Ok(())
}

fn merge_node(
    data: &mut VertexArenaData,
    mesh: &mut SourceMesh,
    parent: &Matrix4<f32>,
    track_atlas: bool,
    force_uvs: bool,
) -> MesherResult<()> {
    let world = *parent * mesh.transform;
    if mesh.geometry.positions.is_empty() {
        mesh.transform = Matrix4::identity();
    } else {
        mesh.transform = world;
        merge_mesh(data, mesh, track_atlas, force_uvs)?;
    }

    for child in &mut mesh.children {
        merge_node(data, child, &world, track_atlas, force_uvs)?;
    }
    Ok(())
}

/// Merge a mesh and all of its children depth-first with the same flags.
/// Child transforms are relative to their parent; nodes without geometry only
/// contribute their transform.
pub fn merge_mesh_tree(
    data: &mut VertexArenaData,
    mesh: &mut SourceMesh,
    track_atlas: bool,
    force_uvs: bool,
) -> MesherResult<()> {
    merge_node(data, mesh, &Matrix4::identity(), track_atlas, force_uvs)
}

/// Pack the round's atlas and remap UVs over the draw range into it
pub fn repack_arena(data: &mut VertexArenaData) -> Option<AtlasTexture> {
    let draw = data.draw_count.min(data.ids.len());
    let texture = atlas_operations::repack(
        &mut data.atlas,
        &data.ids[..draw],
        &mut data.uvs[..draw * UV_SIZE],
    )?;

    mark_dirty(
        data,
        VertexAttribute::Uv,
        UpdateRange {
            offset: 0,
            count: None,
        },
    );
    Some(texture)
}

/// Move the draw range out of the arena, ready to hand to the geometry
/// service. The arena must be reset before it accepts another merge.
pub fn take_buffers(data: &mut VertexArenaData) -> MesherResult<GeometryBuffers> {
    if data.spent {
        return Err(MesherError::ArenaSpent);
    }

    let draw = data.draw_count;
    let mut buffers = GeometryBuffers {
        positions: std::mem::take(&mut data.positions),
        normals: std::mem::take(&mut data.normals),
        colors: std::mem::take(&mut data.colors),
        uvs: std::mem::take(&mut data.uvs),
        ids: std::mem::take(&mut data.ids),
    };
    buffers.positions.truncate(draw * POSITION_SIZE);
    buffers.normals.truncate(draw * NORMAL_SIZE);
    buffers.colors.truncate(draw * COLOR_SIZE);
    buffers.uvs.truncate(draw * UV_SIZE);
    buffers.ids.truncate(draw * ID_SIZE);

    data.spent = true;
    data.draw_count = 0;
    Ok(buffers)
}

/// Collect and clear every pending attribute update
pub fn drain_dirty(data: &mut VertexArenaData) -> Vec<(VertexAttribute, UpdateRange)> {
    let mut updates = Vec::new();
    for (attribute, state) in ATTRIBUTE_ORDER.iter().zip(data.attribute_states.iter_mut()) {
        if state.needs_update {
            updates.push((*attribute, state.update_range));
            *state = CLEAN;
        }
    }
    updates
}

fn head<T>(values: &[T], len: usize) -> &[T] {
    &values[..len.min(values.len())]
}

/// One attribute over the draw range
pub fn draw_slice(data: &VertexArenaData, attribute: VertexAttribute) -> AttributeSlice<'_> {
    let len = data.draw_count * attribute_size(attribute);
    match attribute {
        VertexAttribute::Position => AttributeSlice::F32(head(&data.positions, len)),
        VertexAttribute::Normal => AttributeSlice::F32(head(&data.normals, len)),
        VertexAttribute::Color => AttributeSlice::F32(head(&data.colors, len)),
        VertexAttribute::Uv => AttributeSlice::F32(head(&data.uvs, len)),
        VertexAttribute::Id => AttributeSlice::U32(head(&data.ids, len)),
    }
}
