//! Renderer components
//!
//! A renderer is the component that turns an object into draw calls. The
//! pipeline hands every renderer a [`RenderContext`] and the owner's world
//! matrix, once for the shadow pass (if it casts shadows) and once for the
//! forward pass.
//!
//! All renderers funnel their draws through [`RenderContext::draw_part`],
//! which owns the per-draw protocol: frustum cull (forward pass only), look
//! up mesh and material, apply the part's render settings, bind the material,
//! draw. A missing mesh or material skips the draw without an error.

mod batch_renderer;
mod mesh_renderer;
mod terrain;

pub use batch_renderer::BatchRenderer;
pub use mesh_renderer::MeshRenderer;
pub use terrain::Terrain;

use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::assets::{MaterialHandle, Resources};
use crate::foundation::math::Mat4;
use crate::render::device::{GraphicsDevice, PrimitiveMode, TextureId};
use crate::render::material::{DrawPart, MaterialContext};
use crate::render::primitives::Camera;
use crate::render::render_queue::QUEUE_GEOMETRY;

/// Which pass a renderer is drawing for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPass {
    /// Depth-only cascade pass
    Shadow,
    /// Lit color pass
    Forward,
}

/// Counters accumulated over a pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Draw calls issued
    pub draw_calls: usize,
    /// Parts rejected by the frustum test
    pub culled: usize,
    /// Parts skipped for a missing mesh, material or shader
    pub skipped: usize,
}

impl std::ops::AddAssign for RenderStats {
    fn add_assign(&mut self, other: Self) {
        self.draw_calls += other.draw_calls;
        self.culled += other.culled;
        self.skipped += other.skipped;
    }
}

/// Per-pass state shared by all renderers
pub struct RenderContext<'a> {
    /// Device to draw with
    pub device: &'a mut dyn GraphicsDevice,
    /// Meshes, materials, shaders, textures
    pub resources: &'a Resources,
    /// Main camera
    pub camera: &'a Camera,
    /// Current pass
    pub pass: RenderPass,
    /// Cascade depth array sampled by lit materials
    pub shadow_map: TextureId,
    /// Material every part is drawn with during the shadow pass
    pub depth_material: Option<MaterialHandle>,
    /// Counters of this pass
    pub stats: RenderStats,
}

impl RenderContext<'_> {
    /// Draw one mesh/material pair; returns whether a draw call was issued
    pub fn draw_part(&mut self, part: &DrawPart, model: &Mat4, receive_shadows: bool) -> bool {
        let Some(mesh) = self.resources.mesh(part.mesh) else {
            self.stats.skipped += 1;
            return false;
        };

        let shadow_pass = self.pass == RenderPass::Shadow;
        if !shadow_pass && !self.camera.frustum().contains(&mesh.bounds().transformed(model)) {
            self.stats.culled += 1;
            return false;
        }

        let material_handle = if shadow_pass { self.depth_material } else { Some(part.material) };
        let Some(material) = material_handle.and_then(|handle| self.resources.material(handle)) else {
            self.stats.skipped += 1;
            return false;
        };

        part.settings.apply(self.device, shadow_pass);

        let mut material_ctx = MaterialContext {
            device: &mut *self.device,
            resources: self.resources,
            model,
            camera: self.camera,
            receive_shadows,
            shadow_map: self.shadow_map,
        };
        if !material.apply(&mut material_ctx) {
            self.stats.skipped += 1;
            return false;
        }

        if mesh.draw(self.device, PrimitiveMode::Triangles) {
            self.stats.draw_calls += 1;
            true
        } else {
            false
        }
    }
}

/// Ordering and shadow flags common to every renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererOptions {
    /// Sort key, lower values draw first
    pub render_queue: i32,
    /// Drawn into the shadow cascades
    pub cast_shadows: bool,
    /// Samples the shadow cascades
    pub receive_shadows: bool,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            render_queue: QUEUE_GEOMETRY,
            cast_shadows: true,
            receive_shadows: true,
        }
    }
}

/// Draw submission component
pub trait Renderer: Any {
    /// Queue, shadow flags
    fn options(&self) -> &RendererOptions;

    /// Issue this renderer's draws for the current pass
    fn render(&self, ctx: &mut RenderContext<'_>, model: &Mat4);

    /// Downcast support
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Sort key, lower values draw first
    fn render_queue(&self) -> i32 {
        self.options().render_queue
    }

    /// Whether the shadow pass draws this renderer
    fn cast_shadows(&self) -> bool {
        self.options().cast_shadows
    }

    /// Whether lit materials sample the shadow cascades for this renderer
    fn receive_shadows(&self) -> bool {
        self.options().receive_shadows
    }
}
