//! View frustum extraction and culling

use super::bounds::BoundingBox;
use crate::foundation::math::{Mat4, Vec3, Vec4};

/// Index of each plane inside [`Frustum::planes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrustumPlane {
    /// Left clip plane
    Left = 0,
    /// Right clip plane
    Right = 1,
    /// Bottom clip plane
    Bottom = 2,
    /// Top clip plane
    Top = 3,
    /// Near clip plane
    Near = 4,
    /// Far clip plane
    Far = 5,
}

/// Six normalized clip planes `(a, b, c, d)` with inward-facing normals
///
/// A point `p` is on the positive (inside) side of a plane when
/// `a*p.x + b*p.y + c*p.z + d >= 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far
    pub planes: [Vec4; 6],
}

impl Default for Frustum {
    fn default() -> Self {
        Self::from_view_projection(&Mat4::identity())
    }
}

impl Frustum {
    /// Extract the planes from a combined `projection * view` matrix
    /// (Gribb-Hartmann, OpenGL clip space)
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let m = view_projection;
        let row = |r: usize| Vec4::new(m[(r, 0)], m[(r, 1)], m[(r, 2)], m[(r, 3)]);
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        let mut planes = [
            r3 + r0, // left
            r3 - r0, // right
            r3 + r1, // bottom
            r3 - r1, // top
            r3 + r2, // near
            r3 - r2, // far
        ];

        for plane in &mut planes {
            let length = plane.xyz().norm();
            if length > f32::EPSILON {
                *plane /= length;
            }
        }

        Self { planes }
    }

    /// Single plane
    pub fn plane(&self, which: FrustumPlane) -> Vec4 {
        self.planes[which as usize]
    }

    fn distance(plane: &Vec4, point: &Vec3) -> f32 {
        plane.x * point.x + plane.y * point.y + plane.z * point.z + plane.w
    }

    /// Whether `point` is inside all six planes
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|plane| Self::distance(plane, &point) >= 0.0)
    }

    /// Conservative box test
    ///
    /// A plane rejects the box only when all eight corners lie on its
    /// negative side. Boxes near the frustum's corners can pass although
    /// they are outside; a visible box is never rejected.
    pub fn contains(&self, bounds: &BoundingBox) -> bool {
        if bounds.is_empty() {
            return false;
        }
        let corners = bounds.corners();
        for plane in &self.planes {
            let any_inside = corners
                .iter()
                .any(|corner| Self::distance(plane, corner) >= 0.0);
            if !any_inside {
                return false;
            }
        }
        true
    }
}
