//! Frame pipeline
//!
//! [`Graphics`] owns the shared uniform buffers, the shadow map and the
//! render queue, and drives one frame in a fixed order:
//!
//! 1. publish lights, camera, world/fog and shadow blocks
//! 2. without an active main camera, stop here (warn once)
//! 3. shadow pass: shadow casters in render-queue order into the cascades
//! 4. forward pass: clear, then every renderer in render-queue order
//!
//! The 2D batcher and the UI overlay are flushed separately through
//! [`Graphics::render_overlay`] after behaviours had their `on_render` and
//! `on_gui` turn.

use crate::assets::Resources;
use crate::config::{FogConfig, GraphicsConfig};
use crate::foundation::math::utils;
use crate::render::device::{BufferId, ClearFlags, GraphicsDevice};
use crate::render::graphics2d::Graphics2D;
use crate::render::lighting::pack_lights;
use crate::render::primitives::Camera;
use crate::render::render_queue::RenderQueue;
use crate::render::renderers::{RenderContext, RenderPass, RenderStats};
use crate::render::shadow_map::ShadowMap;
use crate::render::uniforms::{
    CameraBlock, LightsBlock, ShadowBlock, UniformBuffer, WorldBlock, CAMERA_BINDING,
    LIGHTS_BINDING, SHADOW_BINDING, WORLD_BINDING,
};
use crate::render::RenderError;
use crate::scene::{RendererId, Scene};

/// Host-side UI drawn after the 2D batcher (an immediate-mode GUI, a debug HUD)
pub trait Overlay {
    /// Draw on top of the finished frame
    fn render(&mut self, device: &mut dyn GraphicsDevice);
}

/// What the last frame did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Whether a main camera was available
    pub rendered_3d: bool,
    /// Shadow pass counters
    pub shadow: RenderStats,
    /// Forward pass counters
    pub forward: RenderStats,
}

/// Render pipeline
pub struct Graphics {
    lights: UniformBuffer<LightsBlock>,
    camera: UniformBuffer<CameraBlock>,
    world: UniformBuffer<WorldBlock>,
    shadow: UniformBuffer<ShadowBlock>,
    shadow_map: ShadowMap,
    queue: RenderQueue<RendererId>,
    fog: FogConfig,
    missing_camera_logged: bool,
    overlay: Option<Box<dyn Overlay>>,
    stats: FrameStats,
}

impl Graphics {
    /// Allocate the uniform buffers and the shadow map
    ///
    /// The uniform buffers are published in `resources` under `Lights`,
    /// `Camera`, `World` and `Shadow`.
    pub fn new(
        device: &mut dyn GraphicsDevice,
        resources: &mut Resources,
        config: &GraphicsConfig,
    ) -> Result<Self, RenderError> {
        let graphics = Self {
            lights: UniformBuffer::new(device, LIGHTS_BINDING),
            camera: UniformBuffer::new(device, CAMERA_BINDING),
            world: UniformBuffer::new(device, WORLD_BINDING),
            shadow: UniformBuffer::new(device, SHADOW_BINDING),
            shadow_map: ShadowMap::new(device, &config.shadows)?,
            queue: RenderQueue::new(),
            fog: config.fog.clone(),
            missing_camera_logged: false,
            overlay: None,
            stats: FrameStats::default(),
        };

        for (name, buffer, binding) in [
            ("Lights", graphics.lights.buffer(), LIGHTS_BINDING),
            ("Camera", graphics.camera.buffer(), CAMERA_BINDING),
            ("World", graphics.world.buffer(), WORLD_BINDING),
            ("Shadow", graphics.shadow.buffer(), SHADOW_BINDING),
        ] {
            resources.add_uniform_buffer(name, buffer, binding);
        }

        log::info!("Render pipeline ready");
        Ok(graphics)
    }

    /// Cascaded shadow map
    pub fn shadow_map(&self) -> &ShadowMap {
        &self.shadow_map
    }

    /// Mutable shadow map, for toggling the pass
    pub fn shadow_map_mut(&mut self) -> &mut ShadowMap {
        &mut self.shadow_map
    }

    /// Fog settings
    pub fn fog(&self) -> &FogConfig {
        &self.fog
    }

    /// Replace the fog settings
    pub fn set_fog(&mut self, fog: FogConfig) {
        self.fog = fog;
    }

    /// Install the UI overlay
    pub fn set_overlay(&mut self, overlay: Box<dyn Overlay>) {
        self.overlay = Some(overlay);
    }

    /// Counters of the last frame
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Last published camera block
    pub fn camera_block(&self) -> &CameraBlock {
        self.camera.data()
    }

    /// Last published lights block
    pub fn lights_block(&self) -> &LightsBlock {
        self.lights.data()
    }

    /// Last published world block
    pub fn world_block(&self) -> &WorldBlock {
        self.world.data()
    }

    /// Last published shadow block
    pub fn shadow_block(&self) -> &ShadowBlock {
        self.shadow.data()
    }

    /// GL names of the lights, camera, world and shadow buffers
    pub fn uniform_buffers(&self) -> [BufferId; 4] {
        [self.lights.buffer(), self.camera.buffer(), self.world.buffer(), self.shadow.buffer()]
    }

    /// Render the 3D part of a frame
    pub fn render_scene(
        &mut self,
        device: &mut dyn GraphicsDevice,
        scene: &mut Scene,
        resources: &Resources,
        time: f32,
    ) -> FrameStats {
        self.stats = FrameStats::default();
        let aspect = device.current_viewport().aspect_ratio();
        scene.sync_main_camera(aspect);
        let scene: &Scene = scene;

        self.update_uniforms(device, scene, time);

        let Some(camera) = scene.active_main_camera() else {
            if !self.missing_camera_logged {
                log::warn!("No main camera, skipping 3D rendering");
                self.missing_camera_logged = true;
            }
            return self.stats;
        };
        if self.missing_camera_logged {
            log::info!("Main camera available again");
            self.missing_camera_logged = false;
        }
        self.stats.rendered_3d = true;

        if self.shadow_map.is_enabled() && scene.main_light_direction().is_some() {
            self.stats.shadow = self.shadow_pass(device, scene, resources, camera);
        }
        self.stats.forward = self.forward_pass(device, scene, resources, camera);

        log::trace!("Frame stats: {:?}", self.stats);
        self.stats
    }

    fn update_uniforms(&mut self, device: &mut dyn GraphicsDevice, scene: &Scene, time: f32) {
        let dropped = pack_lights(scene.lights_in_order(), self.lights.data_mut());
        if dropped > 0 {
            log::debug!("{} lights over the slot limit were dropped", dropped);
        }
        self.lights.upload(device);

        let camera = scene.active_main_camera();
        if let Some(camera) = camera {
            *self.camera.data_mut() = CameraBlock {
                view: utils::mat4_to_cols(camera.view()),
                projection: utils::mat4_to_cols(camera.projection()),
                view_projection: utils::mat4_to_cols(&camera.view_projection()),
                position: utils::vec3_to_padded(&camera.position(), 1.0),
            };
        }
        self.camera.upload(device);

        *self.world.data_mut() = WorldBlock {
            fog_color: self.fog.color,
            fog_density: self.fog.density,
            fog_gradient: self.fog.gradient,
            fog_enabled: i32::from(self.fog.enabled),
            time,
        };
        self.world.upload(device);

        match (camera, scene.main_light_direction()) {
            (Some(camera), Some(direction)) if self.shadow_map.is_enabled() => {
                self.shadow_map.update(camera, direction, self.shadow.data_mut());
            }
            _ => *self.shadow.data_mut() = ShadowBlock::default(),
        }
        self.shadow.upload(device);
    }

    fn shadow_pass(
        &mut self,
        device: &mut dyn GraphicsDevice,
        scene: &Scene,
        resources: &Resources,
        camera: &Camera,
    ) -> RenderStats {
        for (id, renderer) in scene.renderers_in_order() {
            if renderer.cast_shadows() {
                self.queue.push(renderer.render_queue(), id);
            }
        }

        self.shadow_map.bind(device);
        let mut ctx = RenderContext {
            device: &mut *device,
            resources,
            camera,
            pass: RenderPass::Shadow,
            shadow_map: self.shadow_map.texture(),
            depth_material: resources.defaults().map(|d| d.depth_material),
            stats: RenderStats::default(),
        };
        drain_queue(&mut self.queue, scene, &mut ctx);
        let stats = ctx.stats;
        self.shadow_map.unbind(device);
        stats
    }

    fn forward_pass(
        &mut self,
        device: &mut dyn GraphicsDevice,
        scene: &Scene,
        resources: &Resources,
        camera: &Camera,
    ) -> RenderStats {
        device.clear_color(camera.clear_color());
        device.clear(ClearFlags::COLOR | ClearFlags::DEPTH);

        for (id, renderer) in scene.renderers_in_order() {
            self.queue.push(renderer.render_queue(), id);
        }

        let mut ctx = RenderContext {
            device,
            resources,
            camera,
            pass: RenderPass::Forward,
            shadow_map: self.shadow_map.texture(),
            depth_material: None,
            stats: RenderStats::default(),
        };
        drain_queue(&mut self.queue, scene, &mut ctx);
        ctx.stats
    }

    /// Flush the 2D batcher, then draw the overlay
    pub fn render_overlay(&mut self, device: &mut dyn GraphicsDevice, gui: &mut Graphics2D) {
        gui.flush(device);
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.render(device);
        }
    }

    /// Delete the uniform buffers and the shadow map
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        self.lights.release(device);
        self.camera.release(device);
        self.world.release(device);
        self.shadow.release(device);
        self.shadow_map.release(device);
    }
}

fn drain_queue(queue: &mut RenderQueue<RendererId>, scene: &Scene, ctx: &mut RenderContext<'_>) {
    while let Some(id) = queue.pop() {
        if let Some((renderer, model)) = scene.renderer_entry(id) {
            renderer.render(ctx, &model);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::device::{DeviceCommand, FramebufferId, HeadlessDevice};
    use crate::render::lighting::Light;
    use crate::render::primitives::MeshGenerator;
    use crate::render::renderers::MeshRenderer;
    use crate::scene::GameObjectId;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Setup {
        device: HeadlessDevice,
        resources: Resources,
        graphics: Graphics,
        scene: Scene,
    }

    fn setup() -> Setup {
        let mut device = HeadlessDevice::new(800, 600);
        let mut resources = Resources::new();
        let config = GraphicsConfig::default();
        resources.create_defaults(&mut device, config.shadows.cascade_fractions.len() + 1).expect("defaults");
        let graphics = Graphics::new(&mut device, &mut resources, &config).expect("graphics");
        Setup { device, resources, graphics, scene: Scene::new() }
    }

    fn add_cube(s: &mut Setup, name: &str) -> GameObjectId {
        let defaults = s.resources.defaults().expect("defaults");
        let object = s.scene.create_object(name);
        s.scene.add_renderer(object, MeshRenderer::new(defaults.cube_mesh, defaults.default_material));
        object
    }

    fn add_camera(s: &mut Setup) {
        let object = s.scene.create_object("camera");
        let transform = s.scene.transform_of(object).expect("transform");
        s.scene.transforms_mut().set_position(transform, Vec3::new(0.0, 0.0, 5.0));
        s.scene.add_camera(object, Camera::default());
    }

    fn render(s: &mut Setup) -> FrameStats {
        s.device.clear_commands();
        s.graphics.render_scene(&mut s.device, &mut s.scene, &s.resources, 0.0)
    }

    fn draw_counts(device: &HeadlessDevice) -> Vec<u32> {
        device
            .draws()
            .filter_map(|c| match c {
                DeviceCommand::DrawElements { count, .. } => Some(*count),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_buffers_published_by_name() {
        let s = setup();
        let camera = s.resources.find_uniform_buffer("Camera").expect("camera buffer");
        assert_eq!(camera.binding, CAMERA_BINDING);
        assert_eq!(s.device.uniform_binding(SHADOW_BINDING), s.graphics.uniform_buffers()[3]);
    }

    #[test]
    fn test_no_camera_skips_3d_but_updates_uniforms() {
        let mut s = setup();
        add_cube(&mut s, "cube");

        let stats = render(&mut s);
        assert!(!stats.rendered_3d);
        assert_eq!(s.device.draw_call_count(), 0);
        let uploads = s
            .device
            .commands()
            .iter()
            .filter(|c| matches!(c, DeviceCommand::BufferSubData { .. }))
            .count();
        assert_eq!(uploads, 4);
    }

    #[test]
    fn test_visible_cube_drawn_once_per_frame() {
        let mut s = setup();
        add_cube(&mut s, "cube");
        add_camera(&mut s);

        for _ in 0..3 {
            let stats = render(&mut s);
            assert!(stats.rendered_3d);
            assert_eq!(stats.forward.draw_calls, 1);
            assert_eq!(s.device.draw_call_count(), 1);
        }
    }

    #[test]
    fn test_camera_block_matches_camera() {
        let mut s = setup();
        add_camera(&mut s);
        render(&mut s);
        let block = s.graphics.camera_block();
        assert_eq!(block.position, [0.0, 0.0, 5.0, 1.0]);
        let bytes = s.device.buffer_contents(s.graphics.uniform_buffers()[1]).expect("camera buffer");
        assert_eq!(bytes, bytemuck::bytes_of(block));
    }

    #[test]
    fn test_queue_order_then_insertion_order() {
        let mut s = setup();
        let defaults = s.resources.defaults().expect("defaults");
        let quad = s.resources.add_mesh(&mut s.device, "Quad", MeshGenerator::quad()).expect("quad");
        add_camera(&mut s);

        let late = s.scene.create_object("late");
        s.scene.add_renderer(
            late,
            MeshRenderer::new(defaults.cube_mesh, defaults.default_material).with_render_queue(3000),
        );
        let early = s.scene.create_object("early");
        s.scene.add_renderer(early, MeshRenderer::new(quad, defaults.default_material));
        let tie = s.scene.create_object("tie");
        s.scene.add_renderer(tie, MeshRenderer::new(defaults.cube_mesh, defaults.default_material));

        render(&mut s);
        assert_eq!(draw_counts(&s.device), vec![6, 36, 36]);
        assert_eq!(s.device.draw_call_count(), 3);
    }

    #[test]
    fn test_shadow_pass_draws_casters_into_cascades() {
        let mut s = setup();
        add_camera(&mut s);
        let sun = s.scene.create_object("sun");
        s.scene.add_light(sun, Light::default());
        let sun_transform = s.scene.transform_of(sun).expect("transform");
        s.scene.transforms_mut().rotate(sun_transform, Vec3::x(), -60.0);

        add_cube(&mut s, "caster");
        let defaults = s.resources.defaults().expect("defaults");
        let receiver = s.scene.create_object("receiver");
        s.scene.add_renderer(
            receiver,
            MeshRenderer::new(defaults.cube_mesh, defaults.default_material).with_shadows(false, true),
        );

        let stats = render(&mut s);
        assert_eq!(stats.shadow.draw_calls, 1);
        assert_eq!(stats.forward.draw_calls, 2);

        let framebuffers: Vec<FramebufferId> = s
            .device
            .draws()
            .filter_map(|c| match c {
                DeviceCommand::DrawElements { framebuffer, .. } => Some(*framebuffer),
                _ => None,
            })
            .collect();
        assert!(!framebuffers[0].is_none());
        assert!(framebuffers[1..].iter().all(|f| f.is_none()));
        assert_eq!(s.graphics.shadow_block().enabled, 1);
        assert_eq!(s.graphics.shadow_block().cascade_count, 4);
    }

    #[test]
    fn test_disabled_shadows_skip_pass() {
        let mut s = setup();
        add_camera(&mut s);
        let sun = s.scene.create_object("sun");
        s.scene.add_light(sun, Light::default());
        add_cube(&mut s, "cube");
        s.graphics.shadow_map_mut().set_enabled(false);

        let stats = render(&mut s);
        assert_eq!(stats.shadow, RenderStats::default());
        assert_eq!(s.graphics.shadow_block().enabled, 0);
    }

    #[test]
    fn test_overlay_runs_after_flush() {
        struct Counter(Rc<Cell<u32>>);
        impl Overlay for Counter {
            fn render(&mut self, _device: &mut dyn GraphicsDevice) {
                self.0.set(self.0.get() + 1);
            }
        }

        let mut s = setup();
        let calls = Rc::new(Cell::new(0));
        s.graphics.set_overlay(Box::new(Counter(Rc::clone(&calls))));
        let mut gui = Graphics2D::new(&mut s.device).expect("gui");
        s.graphics.render_overlay(&mut s.device, &mut gui);
        assert_eq!(calls.get(), 1);
    }
}
