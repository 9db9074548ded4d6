//! In-process geometry service
//!
//! Decimation is quadric-error edge collapse over a welded copy of the input
//! soup. Clipping is Sutherland-Hodgman against the four vertical planes of a
//! cell.

use super::gateway_data::{ClipBounds, ClipResponse, DecimateParams, DecimateResponse};
use super::service::GeometryService;
use crate::constants::decimation::MAX_ITERATIONS;
use crate::geometry::geometry_data::GeometryBuffers;
use rustc_hash::FxHashMap;

/// Smallest cosine between a triangle's normal before and after a collapse
const MIN_NORMAL_DOT: f64 = 0.2;

/// Triangles with less area than this are dropped from clip output
const MIN_CLIP_AREA: f32 = 1e-12;

/// CPU implementation of the geometry service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuGeometryService {
    /// Upper bound on collapse sweeps per decimation
    pub max_iterations: u32,
}

impl Default for CpuGeometryService {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
        }
    }
}

/// Symmetric 4x4 error quadric, upper triangle
type Quadric = [f64; 10];

#[derive(Debug, Clone)]
struct Triangle {
    /// Welded vertex indices
    v: [usize; 3],
    /// Source vertex each corner takes its attributes from
    corner: [usize; 3],
    normal: [f64; 3],
    deleted: bool,
    dirty: bool,
}

struct Mesh {
    positions: Vec<[f64; 3]>,
    quadrics: Vec<Quadric>,
    locked: Vec<bool>,
    refs: Vec<Vec<usize>>,
    triangles: Vec<Triangle>,
    live: usize,
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Unit normal, or `None` for a degenerate triangle
fn face_normal(p0: [f64; 3], p1: [f64; 3], p2: [f64; 3]) -> Option<[f64; 3]> {
    let n = cross(sub(p1, p0), sub(p2, p0));
    let len = dot(n, n).sqrt();
    if len <= f64::EPSILON {
        return None;
    }
    Some([n[0] / len, n[1] / len, n[2] / len])
}

fn plane_quadric(n: [f64; 3], d: f64) -> Quadric {
    let [a, b, c] = n;
    [
        a * a,
        a * b,
        a * c,
        a * d,
        b * b,
        b * c,
        b * d,
        c * c,
        c * d,
        d * d,
    ]
}

fn add_quadric(q: &mut Quadric, other: &Quadric) {
    for (a, b) in q.iter_mut().zip(other) {
        *a += b;
    }
}

fn quadric_error(q: &Quadric, p: [f64; 3]) -> f64 {
    let [x, y, z] = p;
    q[0] * x * x + 2.0 * q[1] * x * y + 2.0 * q[2] * x * z + 2.0 * q[3] * x
        + q[4] * y * y
        + 2.0 * q[5] * y * z
        + 2.0 * q[6] * y
        + q[7] * z * z
        + 2.0 * q[8] * z
        + q[9]
}

/// Normalize -0.0 so both zeros weld together
fn weld_bits(value: f32) -> u32 {
    if value == 0.0 {
        0
    } else {
        value.to_bits()
    }
}

fn build_mesh(buffers: &GeometryBuffers) -> Mesh {
    let vertex_count = buffers.positions.len() / 3;
    let mut welded: FxHashMap<[u32; 4], usize> = FxHashMap::default();
    let mut positions = Vec::new();
    let mut remap = Vec::with_capacity(vertex_count);

    for i in 0..vertex_count {
        let p = &buffers.positions[i * 3..i * 3 + 3];
        let id = buffers.ids.get(i).copied().unwrap_or(0);
        let key = [weld_bits(p[0]), weld_bits(p[1]), weld_bits(p[2]), id];
        let index = *welded.entry(key).or_insert_with(|| {
            positions.push([p[0] as f64, p[1] as f64, p[2] as f64]);
            positions.len() - 1
        });
        remap.push(index);
    }

    let mut quadrics = vec![[0.0; 10]; positions.len()];
    let mut refs = vec![Vec::new(); positions.len()];
    let mut triangles = Vec::with_capacity(vertex_count / 3);
    let mut edge_uses: FxHashMap<(usize, usize), u32> = FxHashMap::default();

    for t in 0..vertex_count / 3 {
        let corner = [t * 3, t * 3 + 1, t * 3 + 2];
        let v = [remap[corner[0]], remap[corner[1]], remap[corner[2]]];
        if v[0] == v[1] || v[1] == v[2] || v[0] == v[2] {
            continue;
        }

        let normal = face_normal(positions[v[0]], positions[v[1]], positions[v[2]]);
        if let Some(n) = normal {
            let q = plane_quadric(n, -dot(n, positions[v[0]]));
            for &vi in &v {
                add_quadric(&mut quadrics[vi], &q);
            }
        }

        for j in 0..3 {
            let (a, b) = (v[j], v[(j + 1) % 3]);
            *edge_uses.entry((a.min(b), a.max(b))).or_insert(0) += 1;
        }

        let index = triangles.len();
        for &vi in &v {
            refs[vi].push(index);
        }
        triangles.push(Triangle {
            v,
            corner,
            normal: normal.unwrap_or([0.0; 3]),
            deleted: false,
            dirty: false,
        });
    }

    // Open edges pin their vertices so the silhouette survives
    let mut locked = vec![false; positions.len()];
    for (&(a, b), &uses) in &edge_uses {
        if uses == 1 {
            locked[a] = true;
            locked[b] = true;
        }
    }

    let live = triangles.len();
    Mesh {
        positions,
        quadrics,
        locked,
        refs,
        triangles,
        live,
    }
}

/// Cheapest of the two endpoints and the midpoint under the summed quadric
fn best_position(mesh: &Mesh, v0: usize, v1: usize) -> ([f64; 3], f64) {
    let mut q = mesh.quadrics[v0];
    add_quadric(&mut q, &mesh.quadrics[v1]);

    let p0 = mesh.positions[v0];
    let p1 = mesh.positions[v1];
    let mid = [
        (p0[0] + p1[0]) * 0.5,
        (p0[1] + p1[1]) * 0.5,
        (p0[2] + p1[2]) * 0.5,
    ];

    [p0, p1, mid]
        .into_iter()
        .map(|p| (p, quadric_error(&q, p)))
        .fold((p0, f64::MAX), |best, candidate| {
            if candidate.1 < best.1 {
                candidate
            } else {
                best
            }
        })
}

/// Would moving `moving` to `target` flip or collapse a surrounding triangle
/// that does not also contain `other`?
fn flips(mesh: &Mesh, moving: usize, other: usize, target: [f64; 3]) -> bool {
    for &t in &mesh.refs[moving] {
        let tri = &mesh.triangles[t];
        if tri.deleted || tri.v.contains(&other) {
            continue;
        }
        if tri.dirty {
            return true;
        }

        let mut p = [
            mesh.positions[tri.v[0]],
            mesh.positions[tri.v[1]],
            mesh.positions[tri.v[2]],
        ];
        for (slot, &vi) in p.iter_mut().zip(&tri.v) {
            if vi == moving {
                *slot = target;
            }
        }

        match face_normal(p[0], p[1], p[2]) {
            Some(n) if dot(n, tri.normal) >= MIN_NORMAL_DOT => {}
            _ => return true,
        }
    }
    false
}

fn refresh_normal(mesh: &mut Mesh, t: usize) {
    let v = mesh.triangles[t].v;
    if let Some(n) = face_normal(mesh.positions[v[0]], mesh.positions[v[1]], mesh.positions[v[2]])
    {
        mesh.triangles[t].normal = n;
    }
}

/// Merge `v1` into `v0`, which moves to `target`
fn collapse(mesh: &mut Mesh, v0: usize, v1: usize, target: [f64; 3]) {
    mesh.positions[v0] = target;
    let q1 = mesh.quadrics[v1];
    add_quadric(&mut mesh.quadrics[v0], &q1);

    let moved = std::mem::take(&mut mesh.refs[v1]);
    for t in moved {
        let tri = &mut mesh.triangles[t];
        if tri.deleted {
            continue;
        }
        if tri.v.contains(&v0) {
            tri.deleted = true;
            mesh.live -= 1;
            continue;
        }
        for vi in tri.v.iter_mut() {
            if *vi == v1 {
                *vi = v0;
            }
        }
        tri.dirty = true;
        mesh.refs[v0].push(t);
    }

    let touched: Vec<usize> = mesh.refs[v0]
        .iter()
        .copied()
        .filter(|&t| !mesh.triangles[t].deleted)
        .collect();
    for t in &touched {
        mesh.triangles[*t].dirty = true;
        refresh_normal(mesh, *t);
    }
    mesh.refs[v0] = touched;
}

fn simplify(mesh: &mut Mesh, params: &DecimateParams, max_iterations: u32) -> u32 {
    let mut iterations = 0;
    for iteration in 0..max_iterations {
        if mesh.live <= params.target_triangles {
            break;
        }
        iterations = iteration + 1;

        for tri in mesh.triangles.iter_mut() {
            tri.dirty = false;
        }

        let threshold = params.error_base
            * ((iteration + params.iteration_offset) as f64).powf(params.aggressiveness);

        for t in 0..mesh.triangles.len() {
            if mesh.live <= params.target_triangles {
                break;
            }
            if mesh.triangles[t].deleted || mesh.triangles[t].dirty {
                continue;
            }

            for j in 0..3 {
                let v = mesh.triangles[t].v;
                let (v0, v1) = (v[j], v[(j + 1) % 3]);
                if mesh.locked[v0] || mesh.locked[v1] {
                    continue;
                }

                let (target, error) = best_position(mesh, v0, v1);
                if error > threshold {
                    continue;
                }
                if flips(mesh, v0, v1, target) || flips(mesh, v1, v0, target) {
                    continue;
                }

                collapse(mesh, v0, v1, target);
                break;
            }
        }
    }
    iterations
}

fn decimate_buffers(
    buffers: &GeometryBuffers,
    params: &DecimateParams,
    max_iterations: u32,
) -> DecimateResponse {
    let mut mesh = build_mesh(buffers);
    let before = mesh.live;
    let iterations = simplify(&mut mesh, params, max_iterations);

    let mut output = GeometryBuffers::default();
    let mut indices = Vec::with_capacity(mesh.live * 3);
    let mut emitted: FxHashMap<(usize, usize), u32> = FxHashMap::default();

    for tri in mesh.triangles.iter().filter(|tri| !tri.deleted) {
        for (&vi, &source) in tri.v.iter().zip(&tri.corner) {
            let next = emitted.len() as u32;
            let index = *emitted.entry((vi, source)).or_insert_with(|| {
                let p = mesh.positions[vi];
                output
                    .positions
                    .extend_from_slice(&[p[0] as f32, p[1] as f32, p[2] as f32]);
                extend_from(&mut output.normals, &buffers.normals, source, 3);
                extend_from(&mut output.colors, &buffers.colors, source, 3);
                extend_from(&mut output.uvs, &buffers.uvs, source, 2);
                output
                    .ids
                    .push(buffers.ids.get(source).copied().unwrap_or(0));
                next
            });
            indices.push(index);
        }
    }

    log::debug!(
        "[CpuGeometryService::decimate] {} -> {} triangles (target {}) in {} iterations",
        before,
        mesh.live,
        params.target_triangles,
        iterations
    );

    DecimateResponse {
        buffers: output,
        indices,
    }
}

fn extend_from(out: &mut Vec<f32>, source: &[f32], vertex: usize, width: usize) {
    match source.get(vertex * width..vertex * width + width) {
        Some(values) => out.extend_from_slice(values),
        None => out.extend(std::iter::repeat(0.0).take(width)),
    }
}

/// One polygon corner while clipping
#[derive(Debug, Clone, Copy)]
struct ClipVertex {
    position: [f32; 3],
    normal: [f32; 3],
    color: [f32; 3],
    uv: [f32; 2],
    id: u32,
}

#[derive(Debug, Clone, Copy)]
enum Plane {
    MinX(f32),
    MaxX(f32),
    MinZ(f32),
    MaxZ(f32),
}

fn plane_axis(plane: Plane) -> (usize, f32) {
    match plane {
        Plane::MinX(value) | Plane::MaxX(value) => (0, value),
        Plane::MinZ(value) | Plane::MaxZ(value) => (2, value),
    }
}

fn inside(plane: Plane, vertex: &ClipVertex) -> bool {
    match plane {
        Plane::MinX(value) => vertex.position[0] >= value,
        Plane::MaxX(value) => vertex.position[0] <= value,
        Plane::MinZ(value) => vertex.position[2] >= value,
        Plane::MaxZ(value) => vertex.position[2] <= value,
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Interpolated positions stay within the span of their endpoints
fn lerp_bounded(a: f32, b: f32, t: f32) -> f32 {
    lerp(a, b, t).clamp(a.min(b), a.max(b))
}

/// Point where edge `a -> b` crosses the plane; it takes `a`'s id
fn intersect(plane: Plane, a: &ClipVertex, b: &ClipVertex) -> ClipVertex {
    let (axis, value) = plane_axis(plane);
    let t = (value - a.position[axis]) / (b.position[axis] - a.position[axis]);

    let mut position = [0.0; 3];
    let mut normal = [0.0; 3];
    let mut color = [0.0; 3];
    for k in 0..3 {
        position[k] = lerp_bounded(a.position[k], b.position[k], t);
        normal[k] = lerp(a.normal[k], b.normal[k], t);
        color[k] = lerp(a.color[k], b.color[k], t);
    }
    position[axis] = value;

    let len = (normal[0] * normal[0] + normal[1] * normal[1] + normal[2] * normal[2]).sqrt();
    if len > 0.0 {
        for n in normal.iter_mut() {
            *n /= len;
        }
    }

    ClipVertex {
        position,
        normal,
        color,
        uv: [lerp(a.uv[0], b.uv[0], t), lerp(a.uv[1], b.uv[1], t)],
        id: a.id,
    }
}

fn clip_polygon(polygon: &[ClipVertex], plane: Plane, out: &mut Vec<ClipVertex>) {
    out.clear();
    for (i, current) in polygon.iter().enumerate() {
        let next = &polygon[(i + 1) % polygon.len()];
        let current_inside = inside(plane, current);
        if current_inside {
            out.push(*current);
        }
        if current_inside != inside(plane, next) {
            out.push(intersect(plane, current, next));
        }
    }
}

fn fetch_vertex(buffers: &GeometryBuffers, index: usize) -> Option<ClipVertex> {
    let p = buffers.positions.get(index * 3..index * 3 + 3)?;
    let read3 = |source: &[f32]| -> [f32; 3] {
        source
            .get(index * 3..index * 3 + 3)
            .map_or([0.0; 3], |v| [v[0], v[1], v[2]])
    };
    Some(ClipVertex {
        position: [p[0], p[1], p[2]],
        normal: read3(&buffers.normals),
        color: read3(&buffers.colors),
        uv: buffers
            .uvs
            .get(index * 2..index * 2 + 2)
            .map_or([0.0; 2], |v| [v[0], v[1]]),
        id: buffers.ids.get(index).copied().unwrap_or(0),
    })
}

fn triangle_area(a: &ClipVertex, b: &ClipVertex, c: &ClipVertex) -> f32 {
    let ab = [
        b.position[0] - a.position[0],
        b.position[1] - a.position[1],
        b.position[2] - a.position[2],
    ];
    let ac = [
        c.position[0] - a.position[0],
        c.position[1] - a.position[1],
        c.position[2] - a.position[2],
    ];
    let n = [
        ab[1] * ac[2] - ab[2] * ac[1],
        ab[2] * ac[0] - ab[0] * ac[2],
        ab[0] * ac[1] - ab[1] * ac[0],
    ];
    0.5 * (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt()
}

fn push_vertex(out: &mut GeometryBuffers, vertex: &ClipVertex) {
    out.positions.extend_from_slice(&vertex.position);
    out.normals.extend_from_slice(&vertex.normal);
    out.colors.extend_from_slice(&vertex.color);
    out.uvs.extend_from_slice(&vertex.uv);
    out.ids.push(vertex.id);
}

/// Cells are half-open, so a polygon lying flat on a max plane belongs to the
/// neighbouring cell
fn on_max_plane(polygon: &[ClipVertex], bounds: &ClipBounds) -> bool {
    polygon.iter().all(|v| v.position[0] == bounds.max.x)
        || polygon.iter().all(|v| v.position[2] == bounds.max.z)
}

fn clip_buffers(buffers: &GeometryBuffers, indices: &[u32], bounds: &ClipBounds) -> ClipResponse {
    let planes = [
        Plane::MinX(bounds.min.x),
        Plane::MaxX(bounds.max.x),
        Plane::MinZ(bounds.min.z),
        Plane::MaxZ(bounds.max.z),
    ];

    let mut output = GeometryBuffers::default();
    let mut polygon = Vec::with_capacity(9);
    let mut scratch = Vec::with_capacity(9);

    for tri in indices.chunks_exact(3) {
        polygon.clear();
        for &index in tri {
            if let Some(vertex) = fetch_vertex(buffers, index as usize) {
                polygon.push(vertex);
            }
        }
        if polygon.len() < 3 {
            continue;
        }

        for &plane in &planes {
            clip_polygon(&polygon, plane, &mut scratch);
            std::mem::swap(&mut polygon, &mut scratch);
            if polygon.len() < 3 {
                break;
            }
        }
        if polygon.len() < 3 || on_max_plane(&polygon, bounds) {
            continue;
        }

        for i in 1..polygon.len().saturating_sub(1) {
            let (a, b, c) = (&polygon[0], &polygon[i], &polygon[i + 1]);
            if triangle_area(a, b, c) < MIN_CLIP_AREA {
                continue;
            }
            push_vertex(&mut output, a);
            push_vertex(&mut output, b);
            push_vertex(&mut output, c);
        }
    }

    ClipResponse { buffers: output }
}

impl GeometryService for CpuGeometryService {
    fn decimate(
        &mut self,
        buffers: GeometryBuffers,
        params: &DecimateParams,
    ) -> Result<DecimateResponse, String> {
        if buffers.positions.len() % 9 != 0 {
            return Err(format!(
                "decimate expects whole triangles, got {} position floats",
                buffers.positions.len()
            ));
        }
        Ok(decimate_buffers(&buffers, params, self.max_iterations))
    }

    fn clip(
        &mut self,
        buffers: GeometryBuffers,
        indices: Vec<u32>,
        bounds: &ClipBounds,
    ) -> Result<ClipResponse, String> {
        let response = clip_buffers(&buffers, &indices, bounds);
        log::debug!(
            "[CpuGeometryService::clip] {} -> {} triangles inside x {}..{} z {}..{}",
            indices.len() / 3,
            response.buffers.positions.len() / 9,
            bounds.min.x,
            bounds.max.x,
            bounds.min.z,
            bounds.max.z
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Point3;

    /// Flat `cells` x `cells` grid of unit quads on the XZ plane as a soup
    fn grid(cells: usize, id: u32) -> GeometryBuffers {
        let mut buffers = GeometryBuffers::default();
        let mut push = |x: f32, z: f32| {
            buffers.positions.extend_from_slice(&[x, 0.0, z]);
            buffers.normals.extend_from_slice(&[0.0, 1.0, 0.0]);
            buffers.colors.extend_from_slice(&[x / cells as f32, 0.5, z / cells as f32]);
            buffers.uvs.extend_from_slice(&[x / cells as f32, z / cells as f32]);
            buffers.ids.push(id);
        };
        for i in 0..cells {
            for j in 0..cells {
                let (x, z) = (i as f32, j as f32);
                for (px, pz) in [
                    (x, z),
                    (x, z + 1.0),
                    (x + 1.0, z + 1.0),
                    (x, z),
                    (x + 1.0, z + 1.0),
                    (x + 1.0, z),
                ] {
                    push(px, pz);
                }
            }
        }
        buffers
    }

    fn params(target_triangles: usize) -> DecimateParams {
        DecimateParams {
            target_triangles,
            aggressiveness: 7.0,
            error_base: 1e-9,
            iteration_offset: 3,
        }
    }

    #[test]
    fn test_decimate_reduces_flat_grid() {
        let mut service = CpuGeometryService::default();
        let input = grid(8, 4);
        let triangles = input.positions.len() / 9;
        let target = triangles / 2;

        let response = service.decimate(input, &params(target)).expect("decimate");
        let vertex_count = response.buffers.positions.len() / 3;

        assert!(response.indices.len() / 3 <= target);
        assert!(response.indices.len() % 3 == 0);
        assert!(response.indices.iter().all(|&i| (i as usize) < vertex_count));
        assert_eq!(response.buffers.normals.len(), vertex_count * 3);
        assert_eq!(response.buffers.colors.len(), vertex_count * 3);
        assert_eq!(response.buffers.uvs.len(), vertex_count * 2);
        assert!(response.buffers.ids.iter().all(|&id| id == 4));
    }

    #[test]
    fn test_decimate_keeps_open_boundary() {
        let mut service = CpuGeometryService::default();
        let response = service
            .decimate(grid(4, 0), &params(1))
            .expect("decimate");

        // Every corner of the grid survives since boundary vertices are pinned
        let corners = [[0.0, 0.0], [4.0, 0.0], [0.0, 4.0], [4.0, 4.0]];
        for corner in corners {
            assert!(response
                .buffers
                .positions
                .chunks_exact(3)
                .any(|p| p[0] == corner[0] && p[2] == corner[1]));
        }
        assert!(response.indices.len() / 3 < 32);
    }

    #[test]
    fn test_decimate_single_triangle_is_untouched() {
        let mut service = CpuGeometryService::default();
        let input = GeometryBuffers {
            positions: vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0],
            normals: vec![0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            colors: vec![1.0; 9],
            uvs: vec![0.0; 6],
            ids: vec![2, 2, 2],
        };
        let response = service.decimate(input, &params(0)).expect("decimate");
        assert_eq!(response.indices, vec![0, 1, 2]);
        assert_eq!(response.buffers.positions.len(), 9);
    }

    #[test]
    fn test_decimate_rejects_partial_triangles() {
        let mut service = CpuGeometryService::default();
        let input = GeometryBuffers {
            positions: vec![0.0; 6],
            ..Default::default()
        };
        assert!(service.decimate(input, &params(0)).is_err());
    }

    #[test]
    fn test_clip_keeps_geometry_inside_cell() {
        let mut service = CpuGeometryService::default();
        let input = grid(3, 1);
        let indices: Vec<u32> = (0..(input.positions.len() / 3) as u32).collect();
        let bounds = ClipBounds {
            min: Point3::new(0.5, 0.0, 0.5),
            max: Point3::new(2.0, 0.0, 1.5),
        };

        let response = service.clip(input, indices, &bounds).expect("clip");
        let buffers = &response.buffers;

        assert!(!buffers.positions.is_empty());
        assert_eq!(buffers.positions.len() % 9, 0);
        for p in buffers.positions.chunks_exact(3) {
            assert!(p[0] >= 0.5 && p[0] <= 2.0, "x out of bounds: {:?}", p);
            assert!(p[2] >= 0.5 && p[2] <= 1.5, "z out of bounds: {:?}", p);
        }
        assert_eq!(buffers.ids.len(), buffers.positions.len() / 3);
        assert!(buffers.ids.iter().all(|&id| id == 1));

        // Clipped area matches the cell's footprint on the grid
        let area: f32 = buffers
            .positions
            .chunks_exact(9)
            .map(|t| {
                let (ax, az) = (t[3] - t[0], t[5] - t[2]);
                let (bx, bz) = (t[6] - t[0], t[8] - t[2]);
                0.5 * (ax * bz - az * bx).abs()
            })
            .sum();
        assert!((area - 1.5).abs() < 1e-4, "area {}", area);
    }

    #[test]
    fn test_clip_interpolates_attributes_on_the_cut() {
        let mut service = CpuGeometryService::default();
        let input = GeometryBuffers {
            positions: vec![0.0, 0.0, 0.0, 0.0, 0.0, 2.0, 2.0, 0.0, 0.0],
            normals: vec![0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            colors: vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
            uvs: vec![0.0, 0.0, 0.0, 1.0, 1.0, 0.0],
            ids: vec![7, 7, 7],
        };
        let bounds = ClipBounds {
            min: Point3::new(-1.0, 0.0, -1.0),
            max: Point3::new(1.0, 0.0, 3.0),
        };

        let response = service
            .clip(input, vec![0, 1, 2], &bounds)
            .expect("clip");
        let buffers = &response.buffers;

        let cut = buffers
            .positions
            .chunks_exact(3)
            .position(|p| p[0] == 1.0 && p[2] == 0.0)
            .expect("vertex on the cut");
        assert!((buffers.colors[cut * 3] - 0.5).abs() < 1e-6);
        assert!((buffers.uvs[cut * 2] - 0.5).abs() < 1e-6);
        assert!((buffers.normals[cut * 3 + 1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_clip_wall_on_shared_edge_goes_to_one_cell() {
        let mut service = CpuGeometryService::default();
        let wall = GeometryBuffers {
            positions: vec![16.0, 0.0, 2.0, 16.0, 4.0, 2.0, 16.0, 0.0, 6.0],
            normals: vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            colors: vec![1.0; 9],
            uvs: vec![0.0; 6],
            ids: vec![3, 3, 3],
        };
        let left = ClipBounds {
            min: Point3::new(0.0, 0.0, 0.0),
            max: Point3::new(16.0, 0.0, 16.0),
        };
        let right = ClipBounds {
            min: Point3::new(16.0, 0.0, 0.0),
            max: Point3::new(32.0, 0.0, 16.0),
        };

        let kept_left = service
            .clip(wall.clone(), vec![0, 1, 2], &left)
            .expect("clip left");
        let kept_right = service
            .clip(wall, vec![0, 1, 2], &right)
            .expect("clip right");

        assert!(kept_left.buffers.positions.is_empty());
        assert_eq!(kept_right.buffers.positions.len(), 9);
    }

    #[test]
    fn test_clip_outside_cell_is_empty() {
        let mut service = CpuGeometryService::default();
        let bounds = ClipBounds {
            min: Point3::new(16.0, 0.0, 16.0),
            max: Point3::new(32.0, 0.0, 32.0),
        };
        let input = grid(2, 0);
        let indices: Vec<u32> = (0..(input.positions.len() / 3) as u32).collect();
        let response = service.clip(input, indices, &bounds).expect("clip");
        assert!(response.buffers.positions.is_empty());
    }
}
