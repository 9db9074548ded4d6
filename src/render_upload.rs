//! GPU upload for the arena and finished batches
//!
//! The arena keeps one vertex buffer per attribute sized for its full
//! capacity; only the ranges dirtied since the last upload are written.
//! Batches get exact-size buffers created from their contents.

use crate::arena::arena_data::{AttributeSlice, UpdateRange, VertexArenaData, VertexAttribute};
use crate::arena::arena_operations;
use crate::atlas::atlas_data::AtlasTexture;
use crate::partition::partition_data::OutputBatch;
use wgpu::util::DeviceExt;
use wgpu::{Buffer, Device, Queue, Texture, TextureView};

/// Capacity-sized vertex buffers mirroring a `VertexArenaData`
pub struct ArenaGpuBuffers {
    pub positions: Buffer,
    pub normals: Buffer,
    pub colors: Buffer,
    pub uvs: Buffer,
    pub ids: Buffer,
    /// Vertices to draw, from the last upload
    pub draw_count: u32,
}

/// GPU copy of one output batch
pub struct BatchGpuData {
    pub positions: Buffer,
    pub normals: Buffer,
    pub colors: Option<Buffer>,
    pub uvs: Option<Buffer>,
    pub ids: Option<Buffer>,
    pub indices: Option<Buffer>,
    /// Index count when indexed, vertex count otherwise
    pub element_count: u32,
    pub atlas: Option<(Texture, TextureView)>,
}

fn attribute_label(attribute: VertexAttribute) -> &'static str {
    match attribute {
        VertexAttribute::Position => "Arena Position Buffer",
        VertexAttribute::Normal => "Arena Normal Buffer",
        VertexAttribute::Color => "Arena Color Buffer",
        VertexAttribute::Uv => "Arena UV Buffer",
        VertexAttribute::Id => "Arena Id Buffer",
    }
}

fn arena_buffer(device: &Device, capacity: usize, attribute: VertexAttribute) -> Buffer {
    let size = capacity * arena_operations::attribute_size(attribute) * std::mem::size_of::<f32>();
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(attribute_label(attribute)),
        size: size as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Allocate GPU buffers for the arena's full capacity
pub fn create_arena_buffers(device: &Device, arena: &VertexArenaData) -> ArenaGpuBuffers {
    ArenaGpuBuffers {
        positions: arena_buffer(device, arena.capacity, VertexAttribute::Position),
        normals: arena_buffer(device, arena.capacity, VertexAttribute::Normal),
        colors: arena_buffer(device, arena.capacity, VertexAttribute::Color),
        uvs: arena_buffer(device, arena.capacity, VertexAttribute::Uv),
        ids: arena_buffer(device, arena.capacity, VertexAttribute::Id),
        draw_count: 0,
    }
}

/// Byte offset and bytes of a dirty range, clamped to what was written
pub fn dirty_bytes<'a>(
    arena: &'a VertexArenaData,
    attribute: VertexAttribute,
    range: UpdateRange,
) -> (wgpu::BufferAddress, &'a [u8]) {
    let values: &[u8] = match attribute {
        VertexAttribute::Position => bytemuck::cast_slice::<f32, u8>(&arena.positions),
        VertexAttribute::Normal => bytemuck::cast_slice::<f32, u8>(&arena.normals),
        VertexAttribute::Color => bytemuck::cast_slice::<f32, u8>(&arena.colors),
        VertexAttribute::Uv => bytemuck::cast_slice::<f32, u8>(&arena.uvs),
        VertexAttribute::Id => bytemuck::cast_slice::<u32, u8>(&arena.ids),
    };
    // f32 and u32 components are both four bytes
    let element = std::mem::size_of::<u32>();

    let start = (range.offset * element).min(values.len());
    let end = match range.count {
        Some(count) => (start + count * element).min(values.len()),
        None => values.len(),
    };
    (start as wgpu::BufferAddress, &values[start..end])
}

/// Write every dirty arena range to the GPU and clear the dirty flags
pub fn upload_dirty(buffers: &mut ArenaGpuBuffers, arena: &mut VertexArenaData, queue: &Queue) {
    let updates = arena_operations::drain_dirty(arena);
    for (attribute, range) in updates {
        let (offset, bytes) = dirty_bytes(arena, attribute, range);
        if bytes.is_empty() {
            continue;
        }
        let target = match attribute {
            VertexAttribute::Position => &buffers.positions,
            VertexAttribute::Normal => &buffers.normals,
            VertexAttribute::Color => &buffers.colors,
            VertexAttribute::Uv => &buffers.uvs,
            VertexAttribute::Id => &buffers.ids,
        };
        queue.write_buffer(target, offset, bytes);
    }
    buffers.draw_count = arena.draw_count as u32;
}

/// Create the atlas texture and upload its pixels
pub fn create_atlas_texture(
    device: &Device,
    queue: &Queue,
    atlas: &mut AtlasTexture,
) -> (Texture, TextureView) {
    let size = wgpu::Extent3d {
        width: atlas.width,
        height: atlas.height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Batch Atlas"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &atlas.image,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4 * atlas.width),
            rows_per_image: Some(atlas.height),
        },
        size,
    );
    atlas.needs_upload = false;

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

fn init_buffer(device: &Device, label: &str, contents: &[u8], usage: wgpu::BufferUsages) -> Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents,
        usage,
    })
}

fn optional_buffer(device: &Device, label: &str, values: Option<&[f32]>) -> Option<Buffer> {
    values
        .filter(|values| !values.is_empty())
        .map(|values| init_buffer(device, label, bytemuck::cast_slice(values), wgpu::BufferUsages::VERTEX))
}

/// Upload a finished batch, including its atlas when it has one
pub fn upload_batch(device: &Device, queue: &Queue, batch: &mut OutputBatch) -> BatchGpuData {
    let geometry = &batch.geometry;
    let vertex_count = geometry.positions.len() / 3;

    let positions = init_buffer(
        device,
        "Batch Position Buffer",
        bytemuck::cast_slice(&geometry.positions),
        wgpu::BufferUsages::VERTEX,
    );
    let normals = init_buffer(
        device,
        "Batch Normal Buffer",
        bytemuck::cast_slice(&geometry.normals),
        wgpu::BufferUsages::VERTEX,
    );
    let colors = optional_buffer(
        device,
        "Batch Color Buffer",
        geometry.colors.as_ref().map(|colors| colors.data.as_slice()),
    );
    let uvs = optional_buffer(device, "Batch UV Buffer", geometry.uvs.as_deref());
    let ids = geometry
        .ids
        .as_deref()
        .filter(|ids| !ids.is_empty())
        .map(|ids| {
            init_buffer(
                device,
                "Batch Id Buffer",
                bytemuck::cast_slice(ids),
                wgpu::BufferUsages::VERTEX,
            )
        });
    let indices = geometry.indices.as_deref().map(|indices| {
        init_buffer(
            device,
            "Batch Index Buffer",
            bytemuck::cast_slice(indices),
            wgpu::BufferUsages::INDEX,
        )
    });
    let element_count = geometry
        .indices
        .as_ref()
        .map_or(vertex_count, |indices| indices.len()) as u32;

    let atlas = batch
        .texture
        .as_mut()
        .map(|atlas| create_atlas_texture(device, queue, atlas));

    BatchGpuData {
        positions,
        normals,
        colors,
        uvs,
        ids,
        indices,
        element_count,
        atlas,
    }
}

/// Bind a batch's vertex buffers in the order of `vertex_buffer_layouts`
pub fn bind_batch<'a>(data: &'a BatchGpuData, render_pass: &mut wgpu::RenderPass<'a>) {
    render_pass.set_vertex_buffer(0, data.positions.slice(..));
    render_pass.set_vertex_buffer(1, data.normals.slice(..));
    if let Some(buffer) = &data.colors {
        render_pass.set_vertex_buffer(2, buffer.slice(..));
    }
    if let Some(buffer) = &data.uvs {
        render_pass.set_vertex_buffer(3, buffer.slice(..));
    }
    if let Some(buffer) = &data.ids {
        render_pass.set_vertex_buffer(4, buffer.slice(..));
    }
    if let Some(buffer) = &data.indices {
        render_pass.set_index_buffer(buffer.slice(..), wgpu::IndexFormat::Uint32);
    }
}

/// View of the arena for callers that upload it themselves
pub fn arena_attribute_bytes(arena: &VertexArenaData, attribute: VertexAttribute) -> &[u8] {
    match arena_operations::draw_slice(arena, attribute) {
        AttributeSlice::F32(values) => bytemuck::cast_slice(values),
        AttributeSlice::U32(values) => bytemuck::cast_slice(values),
    }
}

/// Vertex buffer layouts: one buffer per attribute, locations 0..=4
pub fn vertex_buffer_layouts() -> [wgpu::VertexBufferLayout<'static>; 5] {
    const POSITION: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
    const NORMAL: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x3];
    const COLOR: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![2 => Float32x3];
    const UV: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![3 => Float32x2];
    const ID: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![4 => Uint32];

    let layout = |stride: usize, attributes: &'static [wgpu::VertexAttribute]| {
        wgpu::VertexBufferLayout {
            array_stride: stride as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes,
        }
    };

    [
        layout(std::mem::size_of::<[f32; 3]>(), &POSITION),
        layout(std::mem::size_of::<[f32; 3]>(), &NORMAL),
        layout(std::mem::size_of::<[f32; 3]>(), &COLOR),
        layout(std::mem::size_of::<[f32; 2]>(), &UV),
        layout(std::mem::size_of::<u32>(), &ID),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::atlas_data::AtlasSettings;
    use crate::geometry::geometry_data::Geometry;
    use crate::geometry::geometry_operations::create_source_mesh;

    fn arena_with_two_triangles() -> VertexArenaData {
        let mut arena = arena_operations::create_arena(
            64,
            AtlasSettings {
                max_size: 64,
                max_image_dimension: 32,
            },
        );
        for _ in 0..2 {
            let geometry = Geometry {
                positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0],
                normals: vec![0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0],
                ..Default::default()
            };
            let mut mesh = create_source_mesh("tri", geometry, Vec::new());
            arena_operations::merge_mesh(&mut arena, &mut mesh, false, false).expect("merge");
        }
        arena
    }

    #[test]
    fn test_dirty_bytes_cover_written_range() {
        let arena = arena_with_two_triangles();

        let (offset, bytes) = dirty_bytes(
            &arena,
            VertexAttribute::Position,
            UpdateRange {
                offset: 9,
                count: Some(9),
            },
        );
        assert_eq!(offset, 36);
        assert_eq!(bytes.len(), 36);

        let (offset, bytes) = dirty_bytes(
            &arena,
            VertexAttribute::Id,
            UpdateRange {
                offset: 0,
                count: None,
            },
        );
        assert_eq!(offset, 0);
        assert_eq!(bytes.len(), 6 * 4);
        assert_eq!(bytemuck::cast_slice::<u8, u32>(bytes), &[0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn test_dirty_bytes_clamp_past_the_end() {
        let arena = arena_with_two_triangles();
        let (_, bytes) = dirty_bytes(
            &arena,
            VertexAttribute::Uv,
            UpdateRange {
                offset: 10,
                count: Some(100),
            },
        );
        assert_eq!(bytes.len(), 2 * 4);
    }

    #[test]
    fn test_arena_attribute_bytes_follow_draw_range() {
        let arena = arena_with_two_triangles();
        assert_eq!(
            arena_attribute_bytes(&arena, VertexAttribute::Color).len(),
            6 * 3 * 4
        );
        assert_eq!(vertex_buffer_layouts()[3].array_stride, 8);
    }
}
