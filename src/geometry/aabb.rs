//! Data-Oriented Axis-Aligned Bounding Box System
//!
//! Pure functions over bounds - no methods, just data transformations.
//! Cell quantization only snaps the horizontal axes (X and Z); Y is left as
//! measured.

use cgmath::Point3;

/// Axis-Aligned Bounding Box - pure data structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

/// Create new AABB from min/max points
pub fn create_aabb(min: Point3<f32>, max: Point3<f32>) -> AABB {
    AABB { min, max }
}

/// Grow AABB to include a point (mutating)
pub fn aabb_expand_point(aabb: &mut AABB, point: Point3<f32>) {
    aabb.min.x = aabb.min.x.min(point.x);
    aabb.min.y = aabb.min.y.min(point.y);
    aabb.min.z = aabb.min.z.min(point.z);
    aabb.max.x = aabb.max.x.max(point.x);
    aabb.max.y = aabb.max.y.max(point.y);
    aabb.max.z = aabb.max.z.max(point.z);
}

/// Smallest AABB containing both inputs
pub fn aabb_union(a: &AABB, b: &AABB) -> AABB {
    AABB {
        min: Point3::new(a.min.x.min(b.min.x), a.min.y.min(b.min.y), a.min.z.min(b.min.z)),
        max: Point3::new(a.max.x.max(b.max.x), a.max.y.max(b.max.y), a.max.z.max(b.max.z)),
    }
}

/// Snap the horizontal extent outward to multiples of `cell_size`.
///
/// Cells are half-open, so a max lying exactly on a grid line still reaches
/// into the next cell. This also gives a mesh that is flat on a grid line one
/// cell of width.
pub fn aabb_quantize_xz(aabb: &AABB, cell_size: f32) -> AABB {
    let snap = |min: f32, max: f32| {
        let lo = (min / cell_size).floor() * cell_size;
        let hi = ((max / cell_size).floor() + 1.0) * cell_size;
        (lo, hi)
    };
    let (min_x, max_x) = snap(aabb.min.x, aabb.max.x);
    let (min_z, max_z) = snap(aabb.min.z, aabb.max.z);
    AABB {
        min: Point3::new(min_x, aabb.min.y, min_z),
        max: Point3::new(max_x, aabb.max.y, max_z),
    }
}

/// Inclusive containment of a point on the horizontal plane
pub fn aabb_contains_xz(aabb: &AABB, x: f32, z: f32) -> bool {
    aabb.min.x <= x && aabb.max.x >= x && aabb.min.z <= z && aabb.max.z >= z
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_snaps_outward() {
        let aabb = create_aabb(Point3::new(1.0, -3.0, -0.5), Point3::new(17.0, 4.0, 15.0));
        let q = aabb_quantize_xz(&aabb, 16.0);
        assert_eq!(q.min, Point3::new(0.0, -3.0, -16.0));
        assert_eq!(q.max, Point3::new(32.0, 4.0, 16.0));
    }

    #[test]
    fn test_quantize_max_on_grid_line_reaches_next_cell() {
        let aabb = create_aabb(Point3::new(0.0, 0.0, -16.0), Point3::new(32.0, 1.0, 16.0));
        let q = aabb_quantize_xz(&aabb, 16.0);
        assert_eq!((q.min.x, q.max.x), (0.0, 48.0));
        assert_eq!((q.min.z, q.max.z), (-16.0, 32.0));
    }

    #[test]
    fn test_quantize_widens_degenerate_axis() {
        let aabb = create_aabb(Point3::new(16.0, 0.0, 2.0), Point3::new(16.0, 0.0, 3.0));
        let q = aabb_quantize_xz(&aabb, 16.0);
        assert_eq!((q.min.x, q.max.x), (16.0, 32.0));
        assert_eq!((q.min.z, q.max.z), (0.0, 16.0));
    }

    #[test]
    fn test_union_and_contains() {
        let a = create_aabb(Point3::new(0.0, 0.0, 0.0), Point3::new(16.0, 1.0, 16.0));
        let b = create_aabb(Point3::new(-16.0, -1.0, 16.0), Point3::new(0.0, 0.0, 32.0));
        let u = aabb_union(&a, &b);
        assert_eq!(u.min, Point3::new(-16.0, -1.0, 0.0));
        assert_eq!(u.max, Point3::new(16.0, 1.0, 32.0));

        assert!(aabb_contains_xz(&a, 16.0, 0.0));
        assert!(!aabb_contains_xz(&a, 16.5, 8.0));
    }
}
