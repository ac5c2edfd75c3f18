//! Cascaded shadow map
//!
//! The view range of the main camera is split into bands at fixed distances
//! (fractions of a reference far plane). Each band gets its own light-space
//! matrix, fitted tightly around the band's slice of the camera frustum, and
//! its own layer of a depth texture array. The last band always ends at the
//! camera's current far plane.
//!
//! The depth pass renders all layers at once: the depth program's geometry
//! stage replicates every triangle into each layer with that layer's matrix.

use crate::config::{ShadowConfig, MAX_SHADOW_MATRICES};
use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec3, Vec4};
use crate::render::device::{
    Capability, ClearFlags, Face, FramebufferId, GraphicsDevice, TextureId, Viewport,
};
use crate::render::primitives::Camera;
use crate::render::uniforms::ShadowBlock;
use crate::render::RenderError;

/// State saved by [`ShadowMap::bind`]
#[derive(Debug, Clone, Copy)]
struct SavedState {
    viewport: Viewport,
    cull_enabled: bool,
    cull_face: Face,
}

/// Depth texture array plus the per-band light matrices
#[derive(Debug)]
pub struct ShadowMap {
    levels: Vec<f32>,
    resolution: u32,
    bias: f32,
    enabled: bool,
    texture: TextureId,
    framebuffer: FramebufferId,
    matrices: Vec<Mat4>,
    saved: Option<SavedState>,
}

impl ShadowMap {
    /// Allocate one depth layer per band
    pub fn new(device: &mut dyn GraphicsDevice, config: &ShadowConfig) -> Result<Self, RenderError> {
        let levels = config.cascade_levels();
        if levels.is_empty() || levels.len() + 1 > MAX_SHADOW_MATRICES {
            return Err(RenderError::InitializationFailed(format!(
                "{} cascade splits do not fit the shadow block",
                levels.len()
            )));
        }

        let layers = levels.len() as u32 + 1;
        let texture = device.create_depth_texture_array(config.resolution, config.resolution, layers)?;
        let framebuffer = device.create_depth_framebuffer(texture)?;
        log::info!(
            "Shadow map: {} cascades at {:?}, {}x{} per layer",
            layers,
            levels,
            config.resolution,
            config.resolution
        );

        Ok(Self {
            levels,
            resolution: config.resolution,
            bias: config.bias,
            enabled: config.enabled,
            texture,
            framebuffer,
            matrices: Vec::new(),
            saved: None,
        })
    }

    /// Split distances in world units
    pub fn cascade_levels(&self) -> &[f32] {
        &self.levels
    }

    /// Number of split distances
    pub fn cascade_count(&self) -> usize {
        self.levels.len()
    }

    /// Number of depth layers (one per band)
    pub fn layer_count(&self) -> usize {
        self.levels.len() + 1
    }

    /// Whether the shadow pass runs
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turn the shadow pass on or off
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Depth texture array sampled by lit materials
    pub fn texture(&self) -> TextureId {
        self.texture
    }

    /// Light-space matrices computed by the last [`update`](Self::update)
    pub fn matrices(&self) -> &[Mat4] {
        &self.matrices
    }

    /// Near and far distance of every band for the given camera
    pub fn cascade_bands(&self, camera: &Camera) -> Vec<(f32, f32)> {
        let mut bands = Vec::with_capacity(self.layer_count());
        let mut near = camera.near();
        for &level in &self.levels {
            bands.push((near, level));
            near = level;
        }
        bands.push((near, camera.far()));
        bands
    }

    /// Recompute every band's light matrix and publish them into `block`
    ///
    /// `light_direction` is the direction the light shines in.
    pub fn update(&mut self, camera: &Camera, light_direction: Vec3, block: &mut ShadowBlock) {
        let to_light = if light_direction.norm_squared() > f32::EPSILON {
            -light_direction.normalize()
        } else {
            Vec3::y()
        };

        self.matrices = self
            .cascade_bands(camera)
            .into_iter()
            .map(|(near, far)| light_space_matrix(camera, near, far, to_light))
            .collect();

        *block = ShadowBlock::default();
        block.cascade_count = self.levels.len() as i32;
        block.bias = self.bias;
        block.far_plane = camera.far();
        block.enabled = i32::from(self.enabled);
        for (slot, matrix) in block.light_space_matrices.iter_mut().zip(&self.matrices) {
            *slot = utils::mat4_to_cols(matrix);
        }
        for (slot, level) in block.cascade_planes.iter_mut().zip(&self.levels) {
            slot[0] = *level;
        }
    }

    /// Redirect rendering into the depth array
    ///
    /// Saves viewport and culling state, culls front faces and clears depth.
    /// Must be paired with [`unbind`](Self::unbind).
    pub fn bind(&mut self, device: &mut dyn GraphicsDevice) {
        if self.saved.is_some() {
            log::warn!("ShadowMap::bind called twice without unbind");
            return;
        }
        self.saved = Some(SavedState {
            viewport: device.current_viewport(),
            cull_enabled: device.is_enabled(Capability::CullFace),
            cull_face: device.current_cull_face(),
        });

        let size = self.resolution as i32;
        device.bind_framebuffer(self.framebuffer);
        device.set_viewport(Viewport::new(0, 0, size, size));
        device.enable(Capability::DepthTest);
        device.depth_mask(true);
        device.enable(Capability::CullFace);
        device.cull_face(Face::Front);
        device.clear(ClearFlags::DEPTH);
    }

    /// Return to the default framebuffer and restore the saved state
    pub fn unbind(&mut self, device: &mut dyn GraphicsDevice) {
        let Some(saved) = self.saved.take() else {
            log::warn!("ShadowMap::unbind called without bind");
            return;
        };
        device.bind_framebuffer(FramebufferId::NONE);
        device.cull_face(saved.cull_face);
        device.set_enabled(Capability::CullFace, saved.cull_enabled);
        device.set_viewport(saved.viewport);
    }

    /// Whether the depth array is currently bound
    pub fn is_bound(&self) -> bool {
        self.saved.is_some()
    }

    /// Delete the framebuffer and the depth array
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        if !self.framebuffer.is_none() {
            device.delete_framebuffer(self.framebuffer);
            self.framebuffer = FramebufferId::NONE;
        }
        if !self.texture.is_none() {
            device.delete_texture(self.texture);
            self.texture = TextureId::NONE;
        }
    }
}

/// World-space corners of the camera frustum between `near` and `far`
pub fn frustum_corners(camera: &Camera, near: f32, far: f32) -> [Vec3; 8] {
    let inverse = (camera.projection_for_range(near, far) * camera.view())
        .try_inverse()
        .unwrap_or_else(Mat4::identity);

    let mut corners = [Vec3::zeros(); 8];
    let mut index = 0;
    for x in [-1.0, 1.0] {
        for y in [-1.0, 1.0] {
            for z in [-1.0, 1.0] {
                let point = inverse * Vec4::new(x, y, z, 1.0);
                corners[index] = point.xyz() / point.w;
                index += 1;
            }
        }
    }
    corners
}

/// Orthographic `projection * view` enclosing one band of the camera frustum
fn light_space_matrix(camera: &Camera, near: f32, far: f32, to_light: Vec3) -> Mat4 {
    let corners = frustum_corners(camera, near, far);
    let center = corners.iter().fold(Vec3::zeros(), |sum, c| sum + c) / corners.len() as f32;

    let up = if to_light.cross(&Vec3::y()).norm_squared() < 1e-6 {
        Vec3::z()
    } else {
        Vec3::y()
    };
    let view = Mat4::look_at(center + to_light, center, up);

    let mut min = Vec3::repeat(f32::MAX);
    let mut max = Vec3::repeat(f32::MIN);
    for corner in &corners {
        let point = view.transform_point(&(*corner).into()).coords;
        min = min.inf(&point);
        max = max.sup(&point);
    }

    let projection = Mat4::orthographic(min.x, max.x, min.y, max.y, -max.z, -min.z);
    projection * view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::device::{DeviceCommand, HeadlessDevice};
    use approx::assert_relative_eq;

    fn camera_at_origin(far: f32) -> Camera {
        let mut camera = Camera::new(60.0, 0.1, far);
        camera.sync(&Mat4::identity(), 1, 1.0);
        camera
    }

    fn shadow_map(device: &mut HeadlessDevice) -> ShadowMap {
        ShadowMap::new(device, &ShadowConfig::default()).expect("shadow map")
    }

    #[test]
    fn test_levels_are_fractions_of_far_plane() {
        let mut device = HeadlessDevice::new(800, 600);
        let shadows = shadow_map(&mut device);
        assert_eq!(shadows.cascade_levels(), &[20.0, 40.0, 100.0, 500.0]);
        assert_eq!(shadows.cascade_count(), 4);
        assert_eq!(device.texture_size(shadows.texture()), Some((2048, 2048, 5)));
    }

    #[test]
    fn test_last_band_ends_at_camera_far() {
        let mut device = HeadlessDevice::new(800, 600);
        let shadows = shadow_map(&mut device);
        for far in [300.0, 750.0, 4000.0] {
            let bands = shadows.cascade_bands(&camera_at_origin(far));
            assert_eq!(bands.len(), 5);
            assert_relative_eq!(bands[0].0, 0.1);
            assert_relative_eq!(bands[4].1, far);
        }
    }

    #[test]
    fn test_update_fills_block() {
        let mut device = HeadlessDevice::new(800, 600);
        let mut shadows = shadow_map(&mut device);
        let camera = camera_at_origin(800.0);
        let mut block = ShadowBlock::default();
        shadows.update(&camera, Vec3::new(-0.3, -1.0, -0.2), &mut block);

        assert_eq!(block.cascade_count, 4);
        assert_relative_eq!(block.far_plane, 800.0);
        assert_eq!(block.enabled, 1);
        assert_relative_eq!(block.cascade_planes[1][0], 40.0);
        assert_eq!(shadows.matrices().len(), 5);
        assert_ne!(block.light_space_matrices[4], [[0.0; 4]; 4]);
        assert_eq!(block.light_space_matrices[5], [[0.0; 4]; 4]);
    }

    #[test]
    fn test_band_corners_land_inside_light_clip_space() {
        let mut device = HeadlessDevice::new(800, 600);
        let mut shadows = shadow_map(&mut device);
        let camera = camera_at_origin(1000.0);
        let mut block = ShadowBlock::default();
        shadows.update(&camera, Vec3::new(0.0, -1.0, 0.0), &mut block);

        for (band, (near, far)) in shadows.cascade_bands(&camera).into_iter().enumerate() {
            let matrix = shadows.matrices()[band];
            for corner in frustum_corners(&camera, near, far) {
                let clip = matrix * corner.push(1.0);
                let ndc = clip.xyz() / clip.w;
                for value in ndc.iter() {
                    assert!(value.abs() <= 1.0 + 1e-3, "band {} corner outside: {:?}", band, ndc);
                }
            }
        }
    }

    #[test]
    fn test_bind_unbind_restore_state() {
        let mut device = HeadlessDevice::new(800, 600);
        let mut shadows = shadow_map(&mut device);
        device.clear_commands();

        shadows.bind(&mut device);
        assert!(shadows.is_bound());
        assert_eq!(device.current_viewport(), Viewport::new(0, 0, 2048, 2048));
        assert_eq!(device.current_cull_face(), Face::Front);
        assert!(device.commands().contains(&DeviceCommand::Clear(ClearFlags::DEPTH)));

        shadows.unbind(&mut device);
        assert!(!shadows.is_bound());
        assert_eq!(device.current_viewport(), Viewport::new(0, 0, 800, 600));
        assert_eq!(device.current_cull_face(), Face::Back);
        assert!(!device.is_enabled(Capability::CullFace));
        assert_eq!(device.current_framebuffer(), FramebufferId::NONE);
    }

    #[test]
    fn test_unpaired_unbind_is_ignored() {
        let mut device = HeadlessDevice::new(800, 600);
        let mut shadows = shadow_map(&mut device);
        device.clear_commands();
        shadows.unbind(&mut device);
        assert!(device.commands().is_empty());
    }
}
