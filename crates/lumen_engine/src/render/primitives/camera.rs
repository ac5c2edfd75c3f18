//! # 3D Camera
//!
//! Perspective camera component. The camera does not own a position: its
//! view matrix is the inverse of the owning transform's world matrix, which
//! the render pipeline hands in through [`Camera::sync`] every frame.
//!
//! The projection and the six frustum planes are cached and recomputed only
//! when the owning transform reports a new revision, the viewport aspect
//! ratio changes, or an intrinsic parameter is set.

use super::bounds::Ray;
use super::frustum::Frustum;
use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec3, Vec4};
use crate::render::device::Viewport;

/// Perspective camera
#[derive(Debug, Clone)]
pub struct Camera {
    field_of_view: f32,
    near: f32,
    far: f32,
    aspect: f32,
    clear_color: [f32; 4],

    projection: Mat4,
    view: Mat4,
    position: Vec3,
    frustum: Frustum,

    dirty: bool,
    synced_revision: Option<u64>,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(60.0, 0.1, 1000.0)
    }
}

impl Camera {
    /// Create a camera (`field_of_view` in degrees, vertical)
    pub fn new(field_of_view: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            field_of_view,
            near,
            far,
            aspect: 16.0 / 9.0,
            clear_color: [0.1, 0.1, 0.1, 1.0],
            projection: Mat4::identity(),
            view: Mat4::identity(),
            position: Vec3::zeros(),
            frustum: Frustum::default(),
            dirty: true,
            synced_revision: None,
        };
        camera.initialize();
        camera
    }

    /// Recompute the projection matrix and the frustum planes
    pub fn initialize(&mut self) {
        self.projection = Mat4::perspective(
            utils::deg_to_rad(self.field_of_view),
            self.aspect,
            self.near,
            self.far,
        );
        self.frustum = Frustum::from_view_projection(&self.view_projection());
        self.dirty = false;
    }

    /// Bring the camera in line with its transform and viewport
    ///
    /// Returns `true` when the cached matrices were recomputed.
    pub fn sync(&mut self, world_matrix: &Mat4, revision: u64, aspect: f32) -> bool {
        let aspect_changed = (self.aspect - aspect).abs() > f32::EPSILON;
        let moved = self.synced_revision != Some(revision);
        if !(self.dirty || moved || aspect_changed) {
            return false;
        }

        if aspect_changed {
            log::debug!("Camera aspect ratio changed: {:.3} -> {:.3}", self.aspect, aspect);
            self.aspect = aspect;
        }

        self.view = world_matrix.try_inverse().unwrap_or_else(|| {
            log::warn!("Camera transform is not invertible, using identity view");
            Mat4::identity()
        });
        self.position = utils::translation_of(world_matrix);
        self.synced_revision = Some(revision);
        self.initialize();
        true
    }

    /// Vertical field of view in degrees
    pub fn field_of_view(&self) -> f32 {
        self.field_of_view
    }

    /// Set the vertical field of view in degrees
    pub fn set_field_of_view(&mut self, degrees: f32) {
        self.field_of_view = degrees;
        self.dirty = true;
    }

    /// Near clipping distance
    pub fn near(&self) -> f32 {
        self.near
    }

    /// Set the near clipping distance
    pub fn set_near(&mut self, near: f32) {
        self.near = near;
        self.dirty = true;
    }

    /// Far clipping distance
    pub fn far(&self) -> f32 {
        self.far
    }

    /// Set the far clipping distance
    pub fn set_far(&mut self, far: f32) {
        self.far = far;
        self.dirty = true;
    }

    /// Aspect ratio last synced from the viewport
    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    /// Color the 3D pass clears to
    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    /// Set the clear color
    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    /// Cached projection matrix
    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    /// Cached view matrix
    pub fn view(&self) -> &Mat4 {
        &self.view
    }

    /// `projection * view`
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// World-space position
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Cached frustum
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// Whether a parameter changed since the last recompute
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Projection for an arbitrary depth range with this camera's fov and aspect
    pub fn projection_for_range(&self, near: f32, far: f32) -> Mat4 {
        Mat4::perspective(utils::deg_to_rad(self.field_of_view), self.aspect, near, far)
    }

    /// World-space ray through a pixel (top-left origin window coordinates)
    pub fn screen_point_to_ray(&self, x: f32, y: f32, viewport: Viewport) -> Ray {
        let width = viewport.width.max(1) as f32;
        let height = viewport.height.max(1) as f32;
        let ndc_x = ((x - viewport.x as f32) / width) * 2.0 - 1.0;
        let ndc_y = 1.0 - ((y - viewport.y as f32) / height) * 2.0;

        let inverse = self.view_projection().try_inverse().unwrap_or_else(Mat4::identity);
        let unproject = |z: f32| {
            let p = inverse * Vec4::new(ndc_x, ndc_y, z, 1.0);
            if p.w.abs() > f32::EPSILON {
                p.xyz() / p.w
            } else {
                p.xyz()
            }
        };

        let near = unproject(-1.0);
        let far = unproject(1.0);
        Ray::new(self.position, far - near)
    }
}
