//! Heightmap terrain
//!
//! The grid is centered on the owner's origin and spans `width` along X and
//! `depth` along Z. Heights are sampled row by row, x fastest.

use std::any::Any;

use super::{RenderContext, Renderer, RendererOptions};
use crate::assets::{MaterialHandle, Resources};
use crate::foundation::math::{utils, Mat4};
use crate::render::device::GraphicsDevice;
use crate::render::material::DrawPart;
use crate::render::primitives::MeshGenerator;

/// Heightmap renderer
#[derive(Debug, Clone, PartialEq)]
pub struct Terrain {
    /// Queue and shadow flags
    pub options: RendererOptions,
    part: DrawPart,
    width: f32,
    depth: f32,
    cells_x: u32,
    cells_z: u32,
    heights: Vec<f32>,
}

impl Terrain {
    /// Build the grid mesh and register it under `name`
    ///
    /// Returns `None` when the mesh name is already taken.
    pub fn new(
        device: &mut dyn GraphicsDevice,
        resources: &mut Resources,
        name: &str,
        size: (f32, f32),
        cells: (u32, u32),
        heights: Vec<f32>,
        material: MaterialHandle,
    ) -> Option<Self> {
        let (width, depth) = size;
        let cells_x = cells.0.max(1);
        let cells_z = cells.1.max(1);
        let mesh = MeshGenerator::terrain(width, depth, cells_x, cells_z, &heights);
        let handle = resources.add_mesh(device, name, mesh)?;

        log::info!("Terrain '{}' {}x{} cells over {}x{} units", name, cells_x, cells_z, width, depth);
        Some(Self {
            options: RendererOptions::default(),
            part: DrawPart::new(handle, material),
            width,
            depth,
            cells_x,
            cells_z,
            heights,
        })
    }

    /// Mesh/material pair
    pub fn part(&self) -> &DrawPart {
        &self.part
    }

    /// Raw height sample at grid coordinates, 0 when out of range
    pub fn sample(&self, x: u32, z: u32) -> f32 {
        let columns = self.cells_x + 1;
        if x > self.cells_x || z > self.cells_z {
            return 0.0;
        }
        self.heights.get((z * columns + x) as usize).copied().unwrap_or(0.0)
    }

    /// Bilinear height at a local XZ position, clamped to the grid edges
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        let gx = ((x / self.width + 0.5) * self.cells_x as f32).clamp(0.0, self.cells_x as f32);
        let gz = ((z / self.depth + 0.5) * self.cells_z as f32).clamp(0.0, self.cells_z as f32);

        let x0 = (gx.floor() as u32).min(self.cells_x.saturating_sub(1));
        let z0 = (gz.floor() as u32).min(self.cells_z.saturating_sub(1));
        let tx = gx - x0 as f32;
        let tz = gz - z0 as f32;

        let near = utils::lerp(self.sample(x0, z0), self.sample(x0 + 1, z0), tx);
        let far = utils::lerp(self.sample(x0, z0 + 1), self.sample(x0 + 1, z0 + 1), tx);
        utils::lerp(near, far, tz)
    }
}

impl Renderer for Terrain {
    fn options(&self) -> &RendererOptions {
        &self.options
    }

    fn render(&self, ctx: &mut RenderContext<'_>, model: &Mat4) {
        ctx.draw_part(&self.part, model, self.options.receive_shadows);
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
    use crate::render::device::HeadlessDevice;
    use approx::assert_relative_eq;

    fn terrain() -> (Terrain, Resources) {
        let mut device = HeadlessDevice::new(64, 64);
        let mut resources = Resources::new();
        resources.create_defaults(&mut device, 5).expect("defaults");
        let material = resources.defaults().expect("defaults").default_material;
        // 2x2 cells over 4x4 units, heights rising along x
        let heights = vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 0.0, 1.0, 2.0];
        let terrain = Terrain::new(&mut device, &mut resources, "ground", (4.0, 4.0), (2, 2), heights, material)
            .expect("terrain");
        (terrain, resources)
    }

    #[test]
    fn test_height_interpolates_between_samples() {
        let (terrain, _) = terrain();
        assert_relative_eq!(terrain.height_at(-2.0, 0.0), 0.0);
        assert_relative_eq!(terrain.height_at(0.0, 0.0), 1.0);
        assert_relative_eq!(terrain.height_at(1.0, -1.5), 1.5);
        assert_relative_eq!(terrain.height_at(2.0, 2.0), 2.0);
    }

    #[test]
    fn test_height_clamps_outside_grid() {
        let (terrain, _) = terrain();
        assert_relative_eq!(terrain.height_at(100.0, 0.0), 2.0);
        assert_relative_eq!(terrain.height_at(-100.0, 0.0), 0.0);
    }

    #[test]
    fn test_mesh_registered_with_bounds() {
        let (terrain, resources) = terrain();
        let mesh = resources.mesh(terrain.part().mesh).expect("mesh");
        assert!(mesh.buffers().is_some());
        assert_relative_eq!(mesh.bounds().max.y, 2.0);
        assert_eq!(resources.find_mesh("ground"), Some(terrain.part().mesh));
    }
}
