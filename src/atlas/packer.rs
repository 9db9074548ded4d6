/// MaxRects rectangle packer
///
/// Packs axis-aligned rectangles into bins no larger than a fixed maximum.
/// Rotation is never used. Bins are "smart": they start empty and grow to the
/// extent actually used, and report power-of-two dimensions. Items that do not
/// fit into an existing bin open a new one.
use super::atlas_data::PackedRect;

/// One rectangle to place; `key` is handed back with its placement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackItem {
    pub key: usize,
    pub width: u32,
    pub height: u32,
}

/// Where an item landed inside its bin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinPlacement {
    pub key: usize,
    pub rect: PackedRect,
}

/// A finished bin. `width`/`height` are the power-of-two cover of the used
/// extent, clamped to the maximum bin size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedBin {
    pub width: u32,
    pub height: u32,
    pub placements: Vec<BinPlacement>,
}

/// Working state of one bin while packing
#[derive(Debug)]
struct BinState {
    used_width: u32,
    used_height: u32,
    free_rects: Vec<PackedRect>,
    placements: Vec<BinPlacement>,
}

fn create_bin(max_width: u32, max_height: u32) -> BinState {
    BinState {
        used_width: 0,
        used_height: 0,
        free_rects: vec![PackedRect {
            x: 0,
            y: 0,
            width: max_width,
            height: max_height,
        }],
        placements: Vec::new(),
    }
}

fn pot_cover(used: u32, max: u32) -> u32 {
    used.max(1).next_power_of_two().min(max)
}

/// Pick the free rect that keeps the bin smallest; ties go to the tighter
/// short-side fit.
fn find_position(bin: &BinState, width: u32, height: u32) -> Option<PackedRect> {
    let mut best: Option<(u64, u32, PackedRect)> = None;

    for free in &bin.free_rects {
        if free.width < width || free.height < height {
            continue;
        }

        let grown_width = bin.used_width.max(free.x + width) as u64;
        let grown_height = bin.used_height.max(free.y + height) as u64;
        let area = grown_width * grown_height;
        let short_side = (free.width - width).min(free.height - height);

        let better = match &best {
            None => true,
            Some((best_area, best_short, _)) => {
                area < *best_area || (area == *best_area && short_side < *best_short)
            }
        };
        if better {
            best = Some((
                area,
                short_side,
                PackedRect {
                    x: free.x,
                    y: free.y,
                    width,
                    height,
                },
            ));
        }
    }

    best.map(|(_, _, rect)| rect)
}

fn intersects(a: &PackedRect, b: &PackedRect) -> bool {
    a.x < b.x + b.width && a.x + a.width > b.x && a.y < b.y + b.height && a.y + a.height > b.y
}

fn contains(outer: &PackedRect, inner: &PackedRect) -> bool {
    inner.x >= outer.x
        && inner.y >= outer.y
        && inner.x + inner.width <= outer.x + outer.width
        && inner.y + inner.height <= outer.y + outer.height
}

/// Split `free` around `used` into up to four maximal free rects
fn split_free_rect(free: &PackedRect, used: &PackedRect, out: &mut Vec<PackedRect>) {
    if used.x > free.x {
        out.push(PackedRect {
            x: free.x,
            y: free.y,
            width: used.x - free.x,
            height: free.height,
        });
    }
    if used.x + used.width < free.x + free.width {
        out.push(PackedRect {
            x: used.x + used.width,
            y: free.y,
            width: free.x + free.width - (used.x + used.width),
            height: free.height,
        });
    }
    if used.y > free.y {
        out.push(PackedRect {
            x: free.x,
            y: free.y,
            width: free.width,
            height: used.y - free.y,
        });
    }
    if used.y + used.height < free.y + free.height {
        out.push(PackedRect {
            x: free.x,
            y: used.y + used.height,
            width: free.width,
            height: free.y + free.height - (used.y + used.height),
        });
    }
}

fn prune_free_rects(free_rects: &mut Vec<PackedRect>) {
    let mut i = 0;
    while i < free_rects.len() {
        let mut removed = false;
        let mut j = i + 1;
        while j < free_rects.len() {
            if contains(&free_rects[j], &free_rects[i]) {
                free_rects.swap_remove(i);
                removed = true;
                break;
            }
            if contains(&free_rects[i], &free_rects[j]) {
                free_rects.swap_remove(j);
            } else {
                j += 1;
            }
        }
        if !removed {
            i += 1;
        }
    }
}

fn place(bin: &mut BinState, key: usize, rect: PackedRect) {
    let mut next = Vec::with_capacity(bin.free_rects.len() + 4);
    for free in bin.free_rects.drain(..) {
        if intersects(&free, &rect) {
            split_free_rect(&free, &rect, &mut next);
        } else {
            next.push(free);
        }
    }
    bin.free_rects = next;
    prune_free_rects(&mut bin.free_rects);

    bin.used_width = bin.used_width.max(rect.x + rect.width);
    bin.used_height = bin.used_height.max(rect.y + rect.height);
    bin.placements.push(BinPlacement { key, rect });
}

/// Pack every item, largest side first. Items bigger than the maximum bin
/// are dropped; everything else lands in the first bin with room.
pub fn pack_items(items: &[PackItem], max_width: u32, max_height: u32) -> Vec<PackedBin> {
    let mut order: Vec<&PackItem> = items.iter().collect();
    order.sort_by(|a, b| {
        b.width
            .max(b.height)
            .cmp(&a.width.max(a.height))
            .then((b.width * b.height).cmp(&(a.width * a.height)))
    });

    let mut bins: Vec<BinState> = Vec::new();
    for item in order {
        if item.width == 0 || item.height == 0 || item.width > max_width || item.height > max_height
        {
            log::warn!(
                "[packer::pack_items] Item {} ({}x{}) cannot fit a {}x{} bin",
                item.key,
                item.width,
                item.height,
                max_width,
                max_height
            );
            continue;
        }

        let existing = bins.iter_mut().find_map(|bin| {
            find_position(bin, item.width, item.height).map(|rect| (bin, rect))
        });
        match existing {
            Some((bin, rect)) => place(bin, item.key, rect),
            None => {
                let mut bin = create_bin(max_width, max_height);
                if let Some(rect) = find_position(&bin, item.width, item.height) {
                    place(&mut bin, item.key, rect);
                }
                bins.push(bin);
            }
        }
    }

    bins.into_iter()
        .map(|bin| PackedBin {
            width: pot_cover(bin.used_width, max_width),
            height: pot_cover(bin.used_height, max_height),
            placements: bin.placements,
        })
        .collect()
}
