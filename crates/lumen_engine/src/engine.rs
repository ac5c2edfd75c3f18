//! Core engine implementation
//!
//! [`Engine`] owns every subsystem and runs the single-threaded frame loop.
//! One call to [`Engine::tick`] is one frame:
//!
//! 1. poll platform events, adopt the platform viewport
//! 2. advance the frame timer and drain the fixed-step debt
//!    (`on_fixed_update`, then a physics step, per fixed step)
//! 3. `on_update`, the application's update, `on_late_update`
//! 4. `on_resource_loaded` for resources registered since the last frame
//! 5. 3D rendering, then `on_render`
//! 6. `on_gui`, then the 2D batcher and overlay flush
//! 7. objects queued for destruction are torn down
//! 8. swap buffers

use crate::{
    application::Application,
    assets::Resources,
    config::{ConfigError, EngineConfig},
    foundation::{
        logging,
        time::{FixedStep, Timer},
    },
    render::{
        device::{GraphicsDevice, Viewport},
        graphics::Graphics,
        graphics2d::Graphics2D,
        primitives::Camera,
        RenderError,
    },
    scene::{CameraId, FrameTime, GameObjectId, Scene},
};
use thiserror::Error;

/// Window and input collaborator
///
/// Windowing and input are owned by the host; the engine only needs a few
/// answers from it each frame.
pub trait Platform {
    /// Pump window and input events
    fn poll_events(&mut self);

    /// Current framebuffer rectangle
    fn viewport(&self) -> Viewport;

    /// Monotonic time in seconds
    fn time(&self) -> f64;

    /// Whether the user asked to close the window
    fn should_close(&self) -> bool;

    /// Present the finished frame
    fn swap_buffers(&mut self);
}

/// Scripted platform for tests and offline tools
///
/// Every poll advances time by a constant frame length. The platform asks
/// to close once its frame limit (if any) has been swapped.
#[derive(Debug, Clone)]
pub struct HeadlessPlatform {
    viewport: Viewport,
    frame_time: f64,
    time: f64,
    frame_limit: Option<u64>,
    swaps: u64,
    close_requested: bool,
}

impl HeadlessPlatform {
    /// Create a platform with a fixed framebuffer size and frame length
    pub fn new(width: i32, height: i32, frame_time: f64) -> Self {
        Self {
            viewport: Viewport::new(0, 0, width, height),
            frame_time,
            time: 0.0,
            frame_limit: None,
            swaps: 0,
            close_requested: false,
        }
    }

    /// Request close after `frames` presented frames
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Resize the framebuffer
    pub fn resize(&mut self, width: i32, height: i32) {
        self.viewport = Viewport::new(0, 0, width, height);
    }

    /// Request close at the next check
    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    /// Frames presented so far
    pub fn swap_count(&self) -> u64 {
        self.swaps
    }
}

impl Platform for HeadlessPlatform {
    fn poll_events(&mut self) {
        self.time += self.frame_time;
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn time(&self) -> f64 {
        self.time
    }

    fn should_close(&self) -> bool {
        self.close_requested || self.frame_limit.is_some_and(|limit| self.swaps >= limit)
    }

    fn swap_buffers(&mut self) {
        self.swaps += 1;
    }
}

/// Main engine struct
///
/// The engine coordinates all subsystems and manages the main loop.
pub struct Engine<D: GraphicsDevice, P: Platform> {
    /// Graphics device everything renders through
    pub device: D,

    /// Scene graph with every object and component
    pub scene: Scene,

    /// Named shaders, textures, meshes, materials and fonts
    pub resources: Resources,

    /// 3D frame pipeline
    pub graphics: Graphics,

    /// 2D draw-list batcher handed to `on_gui`
    pub gui: Graphics2D,

    platform: P,
    timer: Timer,
    fixed_step: FixedStep,
    config: EngineConfig,
    running: bool,
    shut_down: bool,
}

impl<D: GraphicsDevice, P: Platform> Engine<D, P> {
    /// Create a new engine instance
    ///
    /// Fails when the configuration is invalid or a built-in shader or
    /// framebuffer cannot be created.
    pub fn new(config: EngineConfig, mut device: D, platform: P) -> Result<Self, EngineError> {
        logging::init_with_level(&config.log_level);
        log::info!("Initializing engine...");

        config.validate()?;

        device.set_viewport(platform.viewport());

        let mut resources = Resources::new();
        let shadow_layers = config.graphics.shadows.cascade_fractions.len() + 1;
        resources.create_defaults(&mut device, shadow_layers)?;
        let graphics = Graphics::new(&mut device, &mut resources, &config.graphics)?;
        let gui = Graphics2D::new(&mut device)?;

        let fixed_step = FixedStep::new(config.time.fixed_timestep, config.time.max_fixed_steps);

        log::info!(
            "Engine ready ({}x{}, fixed step {:.4}s)",
            config.window.width,
            config.window.height,
            config.time.fixed_timestep
        );

        Ok(Self {
            device,
            platform,
            scene: Scene::new(),
            resources,
            graphics,
            gui,
            timer: Timer::new(),
            fixed_step,
            config,
            running: true,
            shut_down: false,
        })
    }

    /// Run the main loop until the platform or the application asks to stop
    ///
    /// Shutdown runs after the application's `cleanup`.
    pub fn run<A: Application>(&mut self, app: &mut A) -> Result<(), EngineError> {
        app.initialize(self)
            .map_err(|e| EngineError::Application(format!("App initialization: {}", e)))?;
        self.resources.mark_started();

        log::info!("Starting main loop...");

        while self.running && !self.platform.should_close() {
            self.tick(app)?;
        }

        app.cleanup(self);
        self.shutdown();

        log::info!("Engine shutdown complete");
        Ok(())
    }

    /// Run a single frame
    pub fn tick<A: Application>(&mut self, app: &mut A) -> Result<(), EngineError> {
        self.platform.poll_events();
        let viewport = self.platform.viewport();
        if viewport != self.device.current_viewport() {
            log::debug!("Viewport changed to {}x{}", viewport.width, viewport.height);
            self.device.set_viewport(viewport);
        }

        self.timer.update(self.platform.time());
        let delta_time = self.timer.delta_time();
        let steps = self.fixed_step.accumulate(delta_time);
        self.scene.set_time(FrameTime {
            delta: delta_time,
            total: self.timer.total_time(),
            fixed_delta: self.fixed_step.step(),
            frame: self.timer.frame_count(),
        });

        for _ in 0..steps {
            self.scene.fixed_update();
            self.scene.step_physics(self.fixed_step.step());
        }

        self.scene.update();
        app.update(self, delta_time)
            .map_err(|e| EngineError::Application(format!("App update: {}", e)))?;
        self.scene.late_update();

        for name in self.resources.take_loaded() {
            self.scene.dispatch_resource_loaded(&name);
        }

        let time = self.timer.total_time();
        self.graphics.render_scene(&mut self.device, &mut self.scene, &self.resources, time);
        self.scene.dispatch_render(&mut self.device);

        self.gui.begin_frame(viewport, time);
        self.scene.dispatch_gui(&mut self.gui);
        self.graphics.render_overlay(&mut self.device, &mut self.gui);

        self.scene.process_destroy_queue();
        self.platform.swap_buffers();
        Ok(())
    }

    /// Tear everything down
    ///
    /// Every behaviour gets `on_application_quit`, then all objects are
    /// destroyed descendants-first, then GPU resources are released. Later
    /// calls do nothing.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.running = false;

        self.scene.dispatch_application_quit();
        let destroyed = self.scene.destroy_all();
        log::debug!("Destroyed {} objects at shutdown", destroyed);

        self.graphics.release(&mut self.device);
        self.gui.release(&mut self.device);
        self.resources.release(&mut self.device);
    }

    /// Create an object carrying a camera cleared with the configured color
    ///
    /// The first camera in the scene becomes the main camera.
    pub fn create_camera(
        &mut self,
        name: &str,
        field_of_view: f32,
        near: f32,
        far: f32,
    ) -> Option<(GameObjectId, CameraId)> {
        let mut camera = Camera::new(field_of_view, near, far);
        camera.set_clear_color(self.config.graphics.clear_color);
        let object = self.scene.create_object(name);
        let id = self.scene.add_camera(object, camera)?;
        Some((object, id))
    }

    /// Request engine shutdown
    pub fn quit(&mut self) {
        log::info!("Engine shutdown requested");
        self.running = false;
    }

    /// Whether the main loop keeps going
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Get the platform
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Get mutable access to the platform
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the current frame delta time
    pub fn delta_time(&self) -> f32 {
        self.timer.delta_time()
    }

    /// Frames run so far
    pub fn frame_count(&self) -> u64 {
        self.timer.frame_count()
    }
}

/// Engine-level errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Render pipeline setup failed
    #[error("Rendering error: {0}")]
    Render(#[from] RenderError),

    /// Application error
    #[error("Application error: {0}")]
    Application(String),
}
