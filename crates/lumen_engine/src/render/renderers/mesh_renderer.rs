//! Mesh renderer

use std::any::Any;

use super::{RenderContext, Renderer, RendererOptions};
use crate::assets::{MaterialHandle, MeshHandle};
use crate::foundation::math::Mat4;
use crate::render::material::{DrawPart, RenderSettings};

/// Draws one or more mesh/material pairs at the owner's transform
#[derive(Debug, Clone, PartialEq)]
pub struct MeshRenderer {
    /// Queue and shadow flags
    pub options: RendererOptions,
    parts: Vec<DrawPart>,
}

impl MeshRenderer {
    /// Single mesh with a material
    pub fn new(mesh: MeshHandle, material: MaterialHandle) -> Self {
        Self::with_parts(vec![DrawPart::new(mesh, material)])
    }

    /// Several sub-meshes, drawn in order
    pub fn with_parts(parts: Vec<DrawPart>) -> Self {
        Self {
            options: RendererOptions::default(),
            parts,
        }
    }

    /// Apply the same settings to every part
    pub fn with_settings(mut self, settings: RenderSettings) -> Self {
        for part in &mut self.parts {
            part.settings = settings;
        }
        self
    }

    /// Replace the sort key
    pub fn with_render_queue(mut self, render_queue: i32) -> Self {
        self.options.render_queue = render_queue;
        self
    }

    /// Replace the shadow flags
    pub fn with_shadows(mut self, cast: bool, receive: bool) -> Self {
        self.options.cast_shadows = cast;
        self.options.receive_shadows = receive;
        self
    }

    /// Append a part
    pub fn add_part(&mut self, part: DrawPart) {
        self.parts.push(part);
    }

    /// Parts in draw order
    pub fn parts(&self) -> &[DrawPart] {
        &self.parts
    }

    /// Mutable parts
    pub fn parts_mut(&mut self) -> &mut [DrawPart] {
        &mut self.parts
    }
}

impl Renderer for MeshRenderer {
    fn options(&self) -> &RendererOptions {
        &self.options
    }

    fn render(&self, ctx: &mut RenderContext<'_>, model: &Mat4) {
        for part in &self.parts {
            ctx.draw_part(part, model, self.options.receive_shadows);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::Resources;
    use crate::foundation::math::Vec3;
    use crate::render::device::{
        Capability, DeviceCommand, GraphicsDevice, HeadlessDevice, PolygonMode, TextureId,
    };
    use crate::render::primitives::Camera;
    use crate::render::renderers::{RenderPass, RenderStats};

    fn setup() -> (HeadlessDevice, Resources, Camera) {
        let mut device = HeadlessDevice::new(800, 600);
        let mut resources = Resources::new();
        resources.create_defaults(&mut device, 5).expect("defaults");
        let mut camera = Camera::default();
        // Camera at z = 5 looking down -Z
        let world = Mat4::new_translation(&Vec3::new(0.0, 0.0, 5.0));
        camera.sync(&world, 1, 800.0 / 600.0);
        device.clear_commands();
        (device, resources, camera)
    }

    fn render(
        renderer: &MeshRenderer,
        device: &mut HeadlessDevice,
        resources: &Resources,
        camera: &Camera,
        model: &Mat4,
    ) -> RenderStats {
        let mut ctx = RenderContext {
            device,
            resources,
            camera,
            pass: RenderPass::Forward,
            shadow_map: TextureId::NONE,
            depth_material: None,
            stats: RenderStats::default(),
        };
        renderer.render(&mut ctx, model);
        ctx.stats
    }

    #[test]
    fn test_visible_cube_draws_once() {
        let (mut device, resources, camera) = setup();
        let defaults = resources.defaults().expect("defaults");
        let renderer = MeshRenderer::new(defaults.cube_mesh, defaults.default_material);

        let stats = render(&renderer, &mut device, &resources, &camera, &Mat4::identity());
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(device.draw_call_count(), 1);
    }

    #[test]
    fn test_cube_behind_camera_is_culled() {
        let (mut device, resources, camera) = setup();
        let defaults = resources.defaults().expect("defaults");
        let renderer = MeshRenderer::new(defaults.cube_mesh, defaults.default_material);

        let behind = Mat4::new_translation(&Vec3::new(0.0, 0.0, 20.0));
        let stats = render(&renderer, &mut device, &resources, &camera, &behind);
        assert_eq!(stats.culled, 1);
        assert_eq!(device.draw_call_count(), 0);
    }

    #[test]
    fn test_missing_material_skips_silently() {
        let (mut device, mut resources, camera) = setup();
        let defaults = resources.defaults().expect("defaults");
        let material = defaults.default_material;
        let mesh = defaults.cube_mesh;
        resources.remove_material(material);

        let renderer = MeshRenderer::new(mesh, material);
        let stats = render(&renderer, &mut device, &resources, &camera, &Mat4::identity());
        assert_eq!(stats.skipped, 1);
        assert_eq!(device.draw_call_count(), 0);
    }

    #[test]
    fn test_settings_applied_before_draw() {
        let (mut device, resources, camera) = setup();
        let defaults = resources.defaults().expect("defaults");
        let settings = RenderSettings { wireframe: true, cull_face: false, ..RenderSettings::default() };
        let renderer = MeshRenderer::new(defaults.cube_mesh, defaults.default_material).with_settings(settings);

        render(&renderer, &mut device, &resources, &camera, &Mat4::identity());
        assert!(!device.is_enabled(Capability::CullFace));
        assert!(device.commands().contains(&DeviceCommand::PolygonMode(PolygonMode::Line)));
    }

    #[test]
    fn test_builder_flags() {
        let renderer = MeshRenderer::with_parts(Vec::new()).with_render_queue(3000).with_shadows(false, true);
        assert_eq!(renderer.render_queue(), 3000);
        assert!(!renderer.cast_shadows());
        assert!(renderer.receive_shadows());
    }
}
