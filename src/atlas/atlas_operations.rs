//! Atlas Operations - Pure DOP Functions
//!
//! Registration dedupes images by identity. `repack` packs every entry of the
//! round, composites the atlas and rewrites arena UVs into atlas space.

use super::atlas_data::{AtlasBuilderData, AtlasEntry, AtlasSettings, AtlasTexture, PackedRect};
use super::packer::{self, PackItem};
use crate::constants::atlas::RECT_INSET;
use crate::error::MesherResult;
use crate::geometry::geometry_data::ImageHandle;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use rustc_hash::FxHashMap;
use std::path::Path;

/// Create an empty builder for one round
pub fn create_atlas_builder(settings: AtlasSettings) -> AtlasBuilderData {
    AtlasBuilderData {
        settings,
        entries: Vec::new(),
        width: 0,
        height: 0,
    }
}

/// Size an image occupies once downsampled to fit `max_dimension` on both
/// axes. Aspect ratio is kept and neither side drops below one pixel.
pub fn packed_size(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dimension {
        return (width.max(1), height.max(1));
    }

    let scaled = |side: u32| {
        ((side as u64 * max_dimension as u64 / longest as u64) as u32).clamp(1, max_dimension)
    };
    (scaled(width), scaled(height))
}

fn find_entry<'a>(
    data: &'a mut AtlasBuilderData,
    image: &ImageHandle,
) -> Option<&'a mut AtlasEntry> {
    data.entries.iter_mut().find(|entry| entry.image == *image)
}

/// Record that geometry tagged `id` samples `image`
pub fn register_image(data: &mut AtlasBuilderData, image: &ImageHandle, id: u32) {
    if let Some(entry) = find_entry(data, image) {
        entry.ids.push(id);
        return;
    }

    let (pack_width, pack_height) = packed_size(
        image.0.width(),
        image.0.height(),
        data.settings.max_image_dimension,
    );
    if (pack_width, pack_height) != image.0.dimensions() {
        log::debug!(
            "[atlas_operations::register_image] Downsampling {}x{} to {}x{}",
            image.0.width(),
            image.0.height(),
            pack_width,
            pack_height
        );
    }

    data.entries.push(AtlasEntry {
        image: image.clone(),
        ids: vec![id],
        pack_width,
        pack_height,
        rect: None,
    });
}

/// Re-register an entry carried over from an earlier round, shifting its ids
/// by `id_offset`. The packed size computed on first registration is kept.
pub fn register_entry(data: &mut AtlasBuilderData, carried: &AtlasEntry, id_offset: u32) {
    let ids = carried.ids.iter().map(|id| id + id_offset);
    match find_entry(data, &carried.image) {
        Some(entry) => entry.ids.extend(ids),
        None => data.entries.push(AtlasEntry {
            image: carried.image.clone(),
            ids: ids.collect(),
            pack_width: carried.pack_width,
            pack_height: carried.pack_height,
            rect: None,
        }),
    }
}

fn composite(canvas: &mut RgbaImage, entry: &AtlasEntry, rect: &PackedRect) {
    let source = entry.image.0.as_ref();
    if source.dimensions() == (rect.width, rect.height) {
        imageops::replace(canvas, source, rect.x as i64, rect.y as i64);
    } else {
        let resized = imageops::resize(source, rect.width, rect.height, FilterType::Triangle);
        imageops::replace(canvas, &resized, rect.x as i64, rect.y as i64);
    }
}

/// Pack every registered image, composite the atlas and remap `uvs`.
///
/// `ids` and `uvs` cover the arena's draw range (one id and two uv floats per
/// vertex). Returns `None` when nothing could be packed, leaving `uvs` as is.
pub fn repack(data: &mut AtlasBuilderData, ids: &[u32], uvs: &mut [f32]) -> Option<AtlasTexture> {
    debug_assert_eq!(ids.len() * 2, uvs.len());

    let items: Vec<PackItem> = data
        .entries
        .iter()
        .enumerate()
        .map(|(key, entry)| PackItem {
            key,
            width: entry.pack_width + RECT_INSET,
            height: entry.pack_height,
        })
        .collect();

    let max_size = data.settings.max_size;
    let bins = packer::pack_items(&items, max_size, max_size);
    let bin = bins.first()?;

    for entry in &mut data.entries {
        entry.rect = None;
    }
    for overflow in bins.iter().skip(1).flat_map(|bin| &bin.placements) {
        if let Some(entry) = data.entries.get(overflow.key) {
            log::warn!(
                "[atlas_operations::repack] {}x{} image for ids {:?} does not fit the atlas",
                entry.pack_width,
                entry.pack_height,
                entry.ids
            );
        }
    }

    let mut canvas = RgbaImage::new(bin.width, bin.height);
    // Texel sampled by the (0,0) "no UV" sentinel
    canvas.put_pixel(0, 0, Rgba([255, 255, 255, 255]));

    let mut rect_by_id: FxHashMap<u32, PackedRect> = FxHashMap::default();
    for placement in &bin.placements {
        let Some(entry) = data.entries.get_mut(placement.key) else {
            continue;
        };
        let rect = PackedRect {
            x: placement.rect.x + RECT_INSET,
            y: placement.rect.y,
            width: entry.pack_width,
            height: entry.pack_height,
        };
        composite(&mut canvas, entry, &rect);
        for &id in &entry.ids {
            rect_by_id.insert(id, rect);
        }
        entry.rect = Some(rect);
    }

    remap_uvs(ids, uvs, &rect_by_id, bin.width, bin.height);

    data.width = bin.width;
    data.height = bin.height;
    log::debug!(
        "[atlas_operations::repack] Packed {} of {} images into {}x{} ({:.1}% used)",
        bin.placements.len(),
        data.entries.len(),
        bin.width,
        bin.height,
        utilization(data)
    );

    Some(AtlasTexture {
        image: canvas,
        width: bin.width,
        height: bin.height,
        needs_upload: true,
    })
}

/// Rewrite UVs into atlas space, one run of equal ids at a time.
/// The (0,0) sentinel is left alone; other UVs are clamped to [0, 1] first.
pub fn remap_uvs(
    ids: &[u32],
    uvs: &mut [f32],
    rect_by_id: &FxHashMap<u32, PackedRect>,
    atlas_width: u32,
    atlas_height: u32,
) {
    let atlas_width = atlas_width as f32;
    let atlas_height = atlas_height as f32;

    let mut i = 0;
    while i < ids.len() {
        let id = ids[i];
        let Some(rect) = rect_by_id.get(&id) else {
            i += 1;
            continue;
        };

        while i < ids.len() && ids[i] == id {
            let u = uvs[i * 2];
            let v = uvs[i * 2 + 1];
            if u != 0.0 || v != 0.0 {
                let u = u.clamp(0.0, 1.0);
                let v = v.clamp(0.0, 1.0);
                uvs[i * 2] = (rect.x as f32 + u * rect.width as f32) / atlas_width;
                uvs[i * 2 + 1] = (rect.y as f32 + v * rect.height as f32) / atlas_height;
            }
            i += 1;
        }
    }
}

/// Percentage of the last composited atlas covered by packed images and gutters
pub fn utilization(data: &AtlasBuilderData) -> f32 {
    let total_area = data.width as u64 * data.height as u64;
    if total_area == 0 {
        return 0.0;
    }

    let used_area: u64 = data
        .entries
        .iter()
        .filter_map(|entry| entry.rect)
        .map(|rect| (rect.width + RECT_INSET) as u64 * rect.height as u64)
        .sum();
    (used_area as f32 / total_area as f32) * 100.0
}

/// Save atlas to file for debugging, creating missing parent directories
pub fn save_debug(texture: &AtlasTexture, path: impl AsRef<Path>) -> MesherResult<()> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    texture.image.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn settings() -> AtlasSettings {
        AtlasSettings {
            max_size: 4096,
            max_image_dimension: 512,
        }
    }

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> ImageHandle {
        ImageHandle(Arc::new(RgbaImage::from_pixel(width, height, Rgba(rgba))))
    }

    #[test]
    fn test_packed_size_downsamples_keeping_aspect() {
        assert_eq!(packed_size(1024, 256, 512), (512, 128));
        assert_eq!(packed_size(256, 1024, 512), (128, 512));
        assert_eq!(packed_size(100, 50, 512), (100, 50));
        assert_eq!(packed_size(4000, 1, 512), (512, 1));
    }

    #[test]
    fn test_register_dedupes_by_identity() {
        let mut atlas = create_atlas_builder(settings());
        let shared = solid(4, 4, [255, 0, 0, 255]);
        let twin = solid(4, 4, [255, 0, 0, 255]);

        register_image(&mut atlas, &shared, 3);
        register_image(&mut atlas, &shared, 5);
        register_image(&mut atlas, &twin, 6);

        assert_eq!(atlas.entries.len(), 2);
        assert_eq!(atlas.entries[0].ids, vec![3, 5]);
        assert_eq!(atlas.entries[1].ids, vec![6]);
    }

    #[test]
    fn test_register_entry_offsets_ids() {
        let mut source = create_atlas_builder(settings());
        let image = solid(1024, 8, [0, 0, 255, 255]);
        register_image(&mut source, &image, 0);

        let mut atlas = create_atlas_builder(settings());
        register_image(&mut atlas, &image, 2);
        register_entry(&mut atlas, &source.entries[0], 10);

        assert_eq!(atlas.entries.len(), 1);
        assert_eq!(atlas.entries[0].ids, vec![2, 10]);
        assert_eq!(
            (atlas.entries[0].pack_width, atlas.entries[0].pack_height),
            (512, 4)
        );
    }

    #[test]
    fn test_repack_without_entries_is_noop() {
        let mut atlas = create_atlas_builder(settings());
        let mut uvs = vec![0.25, 0.75];
        assert!(repack(&mut atlas, &[0], &mut uvs).is_none());
        assert_eq!(uvs, vec![0.25, 0.75]);
    }

    #[test]
    fn test_repack_composites_and_remaps() {
        let mut atlas = create_atlas_builder(settings());
        register_image(&mut atlas, &solid(8, 8, [255, 0, 0, 255]), 0);

        let ids = [0, 0, 0, 0];
        let mut uvs = vec![0.0, 0.0, 1.0, 1.0, 0.5, 0.5, 1.5, -0.5];
        let texture = repack(&mut atlas, &ids, &mut uvs).expect("one image packs");

        assert_eq!((texture.width, texture.height), (16, 8));
        assert!(texture.needs_upload);
        assert_eq!(*texture.image.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(*texture.image.get_pixel(1, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*texture.image.get_pixel(8, 7), Rgba([255, 0, 0, 255]));

        let expected = [0.0, 0.0, 0.5625, 1.0, 0.3125, 0.5, 0.5625, 0.0];
        for (got, want) in uvs.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "{:?}", uvs);
        }
        assert_eq!(
            atlas.entries[0].rect,
            Some(PackedRect {
                x: 1,
                y: 0,
                width: 8,
                height: 8
            })
        );
    }

    #[test]
    fn test_shared_image_maps_both_ids_to_one_rect() {
        let mut atlas = create_atlas_builder(settings());
        let shared = solid(16, 16, [0, 255, 0, 255]);
        register_image(&mut atlas, &shared, 0);
        register_image(&mut atlas, &shared, 1);

        let ids = [0, 0, 0, 1, 1, 1];
        let mut uvs = vec![1.0; 12];
        repack(&mut atlas, &ids, &mut uvs).expect("packs");

        assert_eq!(atlas.entries.len(), 1);
        assert_eq!(&uvs[0..6], &uvs[6..12]);
    }

    #[test]
    fn test_repack_is_stable_for_same_input() {
        let mut atlas = create_atlas_builder(settings());
        register_image(&mut atlas, &solid(32, 16, [1, 2, 3, 255]), 0);
        register_image(&mut atlas, &solid(8, 64, [4, 5, 6, 255]), 1);

        let ids = [0, 0, 0, 1, 1, 1];
        let input = vec![0.0, 0.0, 0.2, 0.4, 1.0, 1.0, 0.0, 0.0, 0.9, 0.1, 0.3, 0.3];

        let mut first = input.clone();
        repack(&mut atlas, &ids, &mut first).expect("packs");
        let mut second = input.clone();
        repack(&mut atlas, &ids, &mut second).expect("packs");

        assert_eq!(first, second);
        assert_eq!(&first[0..2], &[0.0, 0.0]);
        assert_eq!(&first[6..8], &[0.0, 0.0]);
    }

    #[test]
    fn test_unregistered_ids_keep_their_uvs() {
        let mut atlas = create_atlas_builder(settings());
        register_image(&mut atlas, &solid(4, 4, [9, 9, 9, 255]), 1);

        let ids = [0, 0, 0, 1, 1, 1];
        let mut uvs = vec![0.5; 12];
        repack(&mut atlas, &ids, &mut uvs).expect("packs");

        assert_eq!(&uvs[0..6], &[0.5; 6]);
        assert_ne!(uvs[6], 0.5);
    }

    #[test]
    fn test_downsampled_image_fills_its_rect() {
        let mut atlas = create_atlas_builder(settings());
        register_image(&mut atlas, &solid(1024, 16, [7, 7, 7, 255]), 0);

        let texture = repack(&mut atlas, &[], &mut []).expect("packs");
        let rect = atlas.entries[0].rect.expect("placed");
        assert_eq!((rect.width, rect.height), (512, 8));
        assert_eq!(texture.width, 1024);
        assert_eq!(*texture.image.get_pixel(512, 7), Rgba([7, 7, 7, 255]));
        assert!(utilization(&atlas) > 0.0);
    }

    #[test]
    fn test_save_debug_writes_png() {
        let mut atlas = create_atlas_builder(settings());
        register_image(&mut atlas, &solid(4, 4, [255, 255, 0, 255]), 0);
        let texture = repack(&mut atlas, &[], &mut []).expect("packs");

        let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("cells").join("atlas.png");
        save_debug(&texture, &path).expect("Failed to save atlas");
        assert!(path.exists());

        // A file where the directory should be
        let blocked = dir.path().join("cells").join("atlas.png").join("nested.png");
        assert!(matches!(
            save_debug(&texture, &blocked),
            Err(crate::error::MesherError::Io(_))
        ));
    }
}
