//! Example batching a procedural scene
//!
//! Builds a textured floor, a field of crates sharing two checker images and
//! a few untextured pillars, runs both batching passes on the CPU geometry
//! service and prints one line per output batch.
//!
//! Pass a directory as the first argument to also dump every batch atlas.

use anyhow::{Context, Result};
use chunk_mesher::{
    atlas::atlas_operations, create_mesher, get_chunks, mesher_operations, CpuGeometryService,
    Geometry, GeometryGateway, ImageHandle, Material, MesherConfig, SourceMesh, TextureMap,
};
use cgmath::{Matrix4, Vector3};
use image::{Rgba, RgbaImage};
use std::path::PathBuf;
use std::sync::Arc;

fn checker(size: u32, a: [u8; 3], b: [u8; 3]) -> ImageHandle {
    let image = RgbaImage::from_fn(size, size, |x, y| {
        let [r, g, bl] = if (x / 8 + y / 8) % 2 == 0 { a } else { b };
        Rgba([r, g, bl, 255])
    });
    ImageHandle(Arc::new(image))
}

fn textured(image: &ImageHandle) -> Material {
    Material {
        color: [1.0, 1.0, 1.0],
        map: Some(TextureMap {
            image: Some(image.clone()),
        }),
    }
}

fn flat(color: [f32; 3]) -> Material {
    Material { color, map: None }
}

/// Indexed XZ grid of `cells` x `cells` quads, `size` units across, facing +Y
fn floor_grid(cells: u32, size: f32) -> Geometry {
    let step = size / cells as f32;
    let mut geometry = Geometry::default();
    let mut uvs = Vec::new();

    for z in 0..=cells {
        for x in 0..=cells {
            geometry
                .positions
                .extend_from_slice(&[x as f32 * step, 0.0, z as f32 * step]);
            geometry.normals.extend_from_slice(&[0.0, 1.0, 0.0]);
            uvs.extend_from_slice(&[x as f32 / cells as f32, z as f32 / cells as f32]);
        }
    }

    let row = cells + 1;
    let mut indices = Vec::new();
    for z in 0..cells {
        for x in 0..cells {
            let i = z * row + x;
            indices.extend_from_slice(&[i, i + row, i + 1, i + 1, i + row, i + row + 1]);
        }
    }

    geometry.uvs = Some(uvs);
    geometry.indices = Some(indices);
    geometry
}

/// Unit cube centered on the origin, one quad per face
fn cube() -> Geometry {
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];

    let mut geometry = Geometry::default();
    let mut uvs = Vec::new();
    let mut indices = Vec::new();

    for (face, (normal, u, v)) in faces.iter().enumerate() {
        let base = face as u32 * 4;
        for (du, dv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            for axis in 0..3 {
                geometry
                    .positions
                    .push(normal[axis] * 0.5 + u[axis] * du + v[axis] * dv);
            }
            geometry.normals.extend_from_slice(normal);
            uvs.extend_from_slice(&[du + 0.5, dv + 0.5]);
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    geometry.uvs = Some(uvs);
    geometry.indices = Some(indices);
    geometry
}

fn placed(name: &str, geometry: Geometry, material: Material, transform: Matrix4<f32>) -> SourceMesh {
    let mut mesh = chunk_mesher::geometry::geometry_operations::create_source_mesh(
        name,
        geometry,
        vec![material],
    );
    mesh.transform = transform;
    mesh
}

fn build_scene() -> Vec<SourceMesh> {
    let grass = checker(256, [70, 140, 60], [60, 120, 50]);
    let wood = checker(64, [150, 110, 60], [120, 85, 40]);
    let metal = checker(128, [150, 150, 160], [110, 110, 120]);

    let mut meshes = vec![placed(
        "floor",
        floor_grid(32, 64.0),
        textured(&grass),
        Matrix4::from_translation(Vector3::new(-16.0, 0.0, -16.0)),
    )];

    for i in 0..24 {
        let x = -12.0 + (i % 6) as f32 * 8.0;
        let z = -12.0 + (i / 6) as f32 * 10.0;
        let image = if i % 3 == 0 { &metal } else { &wood };
        meshes.push(placed(
            &format!("crate_{i}"),
            cube(),
            textured(image),
            Matrix4::from_translation(Vector3::new(x, 0.75, z)) * Matrix4::from_scale(1.5),
        ));
    }

    for (i, color) in [[0.8, 0.2, 0.2], [0.2, 0.2, 0.8], [0.9, 0.8, 0.1]]
        .into_iter()
        .enumerate()
    {
        let x = 4.0 + i as f32 * 12.0;
        meshes.push(placed(
            &format!("pillar_{i}"),
            cube(),
            flat(color),
            Matrix4::from_translation(Vector3::new(x, 3.0, 30.0))
                * Matrix4::from_nonuniform_scale(1.0, 6.0, 1.0),
        ));
    }

    meshes
}

fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();

    println!("Chunk Mesher Batch Example");
    println!("==========================");

    let dump_dir = std::env::args().nth(1).map(PathBuf::from);
    if let Some(dir) = &dump_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let config = MesherConfig {
        max_vertices: 3 * 65_536,
        atlas_size: 1024,
        max_image_dimension: 128,
        ..MesherConfig::default()
    };
    let gateway = GeometryGateway::spawn(CpuGeometryService::default())
        .context("Failed to start geometry gateway")?;
    let mut mesher = create_mesher(config, gateway).context("Invalid mesher config")?;

    let scene = build_scene();
    let source_triangles: usize = scene
        .iter()
        .map(|mesh| chunk_mesher::geometry::geometry_operations::triangle_count(&mesh.geometry))
        .sum();
    let mesh_count = scene.len();
    println!("Scene: {} meshes, {} triangles", mesh_count, source_triangles);

    for mesh in scene {
        mesher_operations::add_mesh(&mut mesher, mesh);
    }

    let batches = pollster::block_on(get_chunks(&mut mesher)).context("Batching run failed")?;

    let mut total_triangles = 0;
    for batch in &batches {
        let vertices = batch.geometry.positions.len() / 3;
        total_triangles += vertices / 3;
        let cell = batch
            .cell
            .map(|cell| format!("({:>3}, {:>3})", cell.x, cell.z))
            .unwrap_or_else(|| "(  -,   -)".to_string());

        match &batch.texture {
            Some(texture) => {
                println!(
                    "  cell {cell}: {:>6} vertices, atlas {}x{}",
                    vertices, texture.width, texture.height
                );
                if let (Some(dir), Some(coord)) = (&dump_dir, batch.cell) {
                    let path = dir.join(format!("atlas_{}_{}.png", coord.x, coord.z));
                    atlas_operations::save_debug(texture, &path)
                        .with_context(|| format!("Failed to save {}", path.display()))?;
                }
            }
            None => println!("  cell {cell}: {:>6} vertices, untextured", vertices),
        }
    }

    println!(
        "{} draw calls instead of {}, {} triangles",
        batches.len(),
        mesh_count,
        total_triangles
    );
    let metrics = mesher.gateway.metrics();
    println!(
        "Geometry service: {} requests, {} failed",
        metrics.submitted, metrics.failed
    );

    Ok(())
}
