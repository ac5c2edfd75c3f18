//! Instanced draws of one mesh at many offsets

use std::any::Any;

use super::{RenderContext, Renderer, RendererOptions};
use crate::assets::{MaterialHandle, MeshHandle};
use crate::foundation::math::{Mat4, Vec3};
use crate::render::material::DrawPart;

/// Draws one mesh/material pair at several local offsets under the owner
///
/// Every instance is culled on its own, so a large scattered batch only pays
/// for the instances in view.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRenderer {
    /// Queue and shadow flags
    pub options: RendererOptions,
    part: DrawPart,
    offsets: Vec<Vec3>,
}

impl BatchRenderer {
    /// Empty batch
    pub fn new(mesh: MeshHandle, material: MaterialHandle) -> Self {
        Self {
            options: RendererOptions::default(),
            part: DrawPart::new(mesh, material),
            offsets: Vec::new(),
        }
    }

    /// Batch with initial offsets
    pub fn with_offsets(mut self, offsets: Vec<Vec3>) -> Self {
        self.offsets = offsets;
        self
    }

    /// Shared mesh/material pair
    pub fn part(&self) -> &DrawPart {
        &self.part
    }

    /// Mutable shared pair
    pub fn part_mut(&mut self) -> &mut DrawPart {
        &mut self.part
    }

    /// Add an instance
    pub fn add(&mut self, offset: Vec3) {
        self.offsets.push(offset);
    }

    /// Remove every instance
    pub fn clear(&mut self) {
        self.offsets.clear();
    }

    /// Instance offsets in the owner's local space
    pub fn offsets(&self) -> &[Vec3] {
        &self.offsets
    }
}

impl Renderer for BatchRenderer {
    fn options(&self) -> &RendererOptions {
        &self.options
    }

    fn render(&self, ctx: &mut RenderContext<'_>, model: &Mat4) {
        for offset in &self.offsets {
            let instance = model * Mat4::new_translation(offset);
            ctx.draw_part(&self.part, &instance, self.options.receive_shadows);
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
    use crate::render::device::{HeadlessDevice, TextureId};
    use crate::render::primitives::Camera;
    use crate::render::renderers::{RenderPass, RenderStats};

    #[test]
    fn test_instances_culled_individually() {
        let mut device = HeadlessDevice::new(800, 600);
        let mut resources = Resources::new();
        resources.create_defaults(&mut device, 5).expect("defaults");
        let defaults = resources.defaults().expect("defaults");

        let mut camera = Camera::default();
        camera.sync(&Mat4::new_translation(&Vec3::new(0.0, 0.0, 10.0)), 1, 1.0);

        let batch = BatchRenderer::new(defaults.cube_mesh, defaults.default_material).with_offsets(vec![
            Vec3::zeros(),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 50.0),
        ]);

        let mut ctx = RenderContext {
            device: &mut device,
            resources: &resources,
            camera: &camera,
            pass: RenderPass::Forward,
            shadow_map: TextureId::NONE,
            depth_material: None,
            stats: RenderStats::default(),
        };
        batch.render(&mut ctx, &Mat4::identity());
        assert_eq!(ctx.stats.draw_calls, 2);
        assert_eq!(ctx.stats.culled, 1);
    }
}
