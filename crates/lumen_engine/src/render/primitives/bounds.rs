//! Axis-aligned bounding boxes and rays

use crate::foundation::math::{Mat4, Point3, Vec3};

/// Ray with a normalized direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Ray origin
    pub origin: Vec3,
    /// Unit direction
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray, normalizing `direction`
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Point at parametric distance `t`
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Axis-aligned bounding box
///
/// A cleared box is inverted (min = +inf, max = -inf) so the first
/// [`grow`](Self::grow) snaps it onto that point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox {
    /// An inverted box containing nothing
    pub fn empty() -> Self {
        Self {
            min: Vec3::repeat(f32::INFINITY),
            max: Vec3::repeat(f32::NEG_INFINITY),
        }
    }

    /// Create a box from its corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Reset to the empty box
    pub fn clear(&mut self) {
        *self = Self::empty();
    }

    /// Whether nothing has been grown into the box
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Extend the box to contain `point`
    pub fn grow(&mut self, point: Vec3) {
        self.min = self.min.inf(&point);
        self.max = self.max.sup(&point);
    }

    /// Box center
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half-size along each axis
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Whether `point` lies inside or on the box
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// The eight corners
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Box enclosing this box after transformation by `matrix`
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        let mut result = Self::empty();
        for corner in self.corners() {
            result.grow(matrix.transform_point(&Point3::from(corner)).coords);
        }
        result
    }

    /// Slab test against a ray
    ///
    /// Returns the distance along the ray to the entry point (zero when the
    /// origin is inside), or `None` when the ray misses. A ray parallel to an
    /// axis misses as soon as its origin lies outside that axis' slab.
    pub fn intersects(&self, ray: &Ray) -> Option<f32> {
        let mut t_min = 0.0f32;
        let mut t_max = f32::MAX;

        for axis in 0..3 {
            let origin = ray.origin[axis];
            let direction = ray.direction[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);

            if direction.abs() < f32::EPSILON {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / direction;
            let mut t1 = (lo - origin) * inv;
            let mut t2 = (hi - origin) * inv;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }

            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }

        Some(t_min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_grow_from_empty() {
        let mut bounds = BoundingBox::empty();
        assert!(bounds.is_empty());
        bounds.grow(Vec3::new(1.0, 2.0, 3.0));
        bounds.grow(Vec3::new(-1.0, 0.0, 5.0));
        assert_eq!(bounds.min, Vec3::new(-1.0, 0.0, 3.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 2.0, 5.0));
        assert_eq!(bounds.center(), Vec3::new(0.0, 1.0, 4.0));
    }

    #[test]
    fn test_ray_hits_box_in_front() {
        let bounds = BoundingBox::new(Vec3::repeat(-1.0), Vec3::repeat(1.0));
        let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, -1.0));
        let distance = bounds.intersects(&ray).expect("hit");
        assert_relative_eq!(distance, 9.0, epsilon = 1e-5);
    }

    #[test]
    fn test_ray_pointing_away_misses() {
        let bounds = BoundingBox::new(Vec3::repeat(-1.0), Vec3::repeat(1.0));
        let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, 1.0));
        assert!(bounds.intersects(&ray).is_none());
    }

    #[test]
    fn test_parallel_ray_outside_slab_misses() {
        let bounds = BoundingBox::new(Vec3::repeat(-1.0), Vec3::repeat(1.0));
        let ray = Ray::new(Vec3::new(0.0, 5.0, 10.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(bounds.intersects(&ray).is_none());
    }

    #[test]
    fn test_box_grown_over_ray_always_intersects() {
        let rays = [
            Ray::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)),
            Ray::new(Vec3::new(3.0, -2.0, 1.0), Vec3::new(-1.0, 2.0, 0.5)),
            Ray::new(Vec3::new(-4.0, 7.0, 2.0), Vec3::new(0.0, -1.0, 0.0)),
        ];
        for ray in rays {
            let mut bounds = BoundingBox::empty();
            bounds.grow(ray.origin);
            bounds.grow(ray.point_at(4.0));
            let distance = bounds.intersects(&ray).expect("ray must hit its own box");
            assert!(distance >= 0.0);
        }
    }

    #[test]
    fn test_transformed_box_follows_translation() {
        let bounds = BoundingBox::new(Vec3::repeat(-1.0), Vec3::repeat(1.0));
        let moved = bounds.transformed(&Mat4::new_translation(&Vec3::new(10.0, 0.0, 0.0)));
        assert_relative_eq!(moved.min, Vec3::new(9.0, -1.0, -1.0));
        assert_relative_eq!(moved.max, Vec3::new(11.0, 1.0, 1.0));
    }
}
