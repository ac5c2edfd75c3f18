//! Whole-frame scenarios driven through [`Engine`] with the headless device

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use approx::assert_relative_eq;

use crate::foundation::math::{Mat4, Quat, Vec2, Vec3, Vec4};
use crate::render::device::{Capability, DeviceCommand, GraphicsDevice, HeadlessDevice, PolygonMode};
use crate::render::graphics2d::{Graphics2D, Rect};
use crate::render::lighting::Light;
use crate::render::material::RenderSettings;
use crate::render::primitives::MeshGenerator;
use crate::render::renderers::MeshRenderer;
use crate::scene::{Behaviour, BehaviourContext, GameObjectId};
use crate::{AppError, Application, Engine, EngineConfig, HeadlessPlatform, Platform};

type TestEngine = Engine<HeadlessDevice, HeadlessPlatform>;
type Log = Rc<RefCell<Vec<String>>>;

fn engine() -> TestEngine {
    Engine::new(
        EngineConfig::default(),
        HeadlessDevice::new(800, 600),
        HeadlessPlatform::new(800, 600, 0.05),
    )
    .expect("engine")
}

#[derive(Default)]
struct CountingApp {
    initialized: bool,
    updates: u32,
    cleaned_up: bool,
}

impl Application for CountingApp {
    fn initialize<D: GraphicsDevice, P: Platform>(&mut self, _engine: &mut Engine<D, P>) -> Result<(), AppError> {
        self.initialized = true;
        Ok(())
    }

    fn update<D: GraphicsDevice, P: Platform>(
        &mut self,
        _engine: &mut Engine<D, P>,
        _delta_time: f32,
    ) -> Result<(), AppError> {
        self.updates += 1;
        Ok(())
    }

    fn cleanup<D: GraphicsDevice, P: Platform>(&mut self, _engine: &mut Engine<D, P>) {
        self.cleaned_up = true;
    }
}

/// Logs lifecycle hooks as `name:hook`
struct Recorder {
    name: &'static str,
    log: Log,
}

impl Recorder {
    fn new(name: &'static str, log: &Log) -> Self {
        Self { name, log: Rc::clone(log) }
    }

    fn push(&self, hook: &str) {
        self.log.borrow_mut().push(format!("{}:{}", self.name, hook));
    }
}

impl Behaviour for Recorder {
    fn on_enable(&mut self, _ctx: &mut BehaviourContext<'_>) {
        self.push("enable");
    }

    fn on_disable(&mut self, _ctx: &mut BehaviourContext<'_>) {
        self.push("disable");
    }

    fn on_update(&mut self, _ctx: &mut BehaviourContext<'_>) {
        self.push("update");
    }

    fn on_fixed_update(&mut self, _ctx: &mut BehaviourContext<'_>) {
        self.push("fixed");
    }

    fn on_resource_loaded(&mut self, _ctx: &mut BehaviourContext<'_>, name: &str) {
        self.push(&format!("loaded {}", name));
    }

    fn on_application_quit(&mut self, _ctx: &mut BehaviourContext<'_>) {
        self.push("quit");
    }

    fn on_destroy(&mut self, _ctx: &mut BehaviourContext<'_>) {
        self.push("destroy");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Draws one line per frame and remembers the batch size it produced
struct LineDrawer {
    batch: Rc<Cell<(usize, usize)>>,
}

impl Behaviour for LineDrawer {
    fn on_gui(&mut self, _ctx: &mut BehaviourContext<'_>, gui: &mut Graphics2D) {
        gui.add_line(
            Vec2::new(10.0, 10.0),
            Vec2::new(200.0, 10.0),
            2.0,
            0.0,
            Vec4::new(1.0, 1.0, 1.0, 1.0),
            Rect::NONE,
        );
        self.batch.set((gui.vertex_count(), gui.index_count()));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

fn add_cube(engine: &mut TestEngine) -> GameObjectId {
    let defaults = engine.resources.defaults().expect("defaults");
    let cube = engine.scene.create_object("cube");
    engine.scene.add_renderer(cube, MeshRenderer::new(defaults.cube_mesh, defaults.default_material));
    cube
}

fn add_camera(engine: &mut TestEngine, far: f32) -> GameObjectId {
    let (object, _) = engine.create_camera("camera", 60.0, 0.1, far).expect("camera");
    let transform = engine.scene.transform_of(object).expect("transform");
    engine.scene.transforms_mut().set_position(transform, Vec3::new(0.0, 0.0, 5.0));
    object
}

fn tick(engine: &mut TestEngine) -> usize {
    engine.device.clear_commands();
    engine.tick(&mut CountingApp::default()).expect("tick");
    engine.device.draw_call_count()
}

#[test]
fn test_missing_camera_skips_frames_until_one_exists() {
    let mut engine = engine();
    add_cube(&mut engine);

    for _ in 0..3 {
        assert_eq!(tick(&mut engine), 0);
        assert!(!engine.graphics.stats().rendered_3d);
    }

    add_camera(&mut engine, 1000.0);
    for _ in 0..3 {
        assert_eq!(tick(&mut engine), 1);
        assert!(engine.graphics.stats().rendered_3d);
    }
}

#[test]
fn test_gui_line_is_one_quad_in_one_draw() {
    let mut engine = engine();
    let batch = Rc::new(Cell::new((0, 0)));
    let object = engine.scene.create_object("hud");
    engine.scene.add_behaviour(object, LineDrawer { batch: Rc::clone(&batch) });

    assert_eq!(tick(&mut engine), 1);
    assert_eq!(batch.get(), (4, 6));

    let stats = engine.gui.last_stats();
    assert_eq!(stats.items, 1);
    assert_eq!(stats.draw_calls, 1);
    assert!(engine.device.draws().all(|c| matches!(c, DeviceCommand::DrawElements { count: 6, .. })));
    // The batch is emptied by the flush
    assert_eq!(engine.gui.vertex_count(), 0);
}

#[test]
fn test_gui_after_wireframe_scene_draws_filled_and_unculled() {
    let mut engine = engine();
    add_camera(&mut engine, 1000.0);
    let defaults = engine.resources.defaults().expect("defaults");
    let wireframe = RenderSettings { wireframe: true, ..RenderSettings::default() };
    let cube = engine.scene.create_object("wire cube");
    engine.scene.add_renderer(
        cube,
        MeshRenderer::new(defaults.cube_mesh, defaults.default_material).with_settings(wireframe),
    );
    let object = engine.scene.create_object("hud");
    engine.scene.add_behaviour(object, LineDrawer { batch: Rc::new(Cell::new((0, 0))) });

    assert_eq!(tick(&mut engine), 2);

    let commands = engine.device.commands();
    let gui_draw = commands
        .iter()
        .rposition(|c| matches!(c, DeviceCommand::DrawElements { .. }))
        .expect("gui draw");
    let before = &commands[..gui_draw];
    let last_polygon_mode = before.iter().rev().find_map(|c| match c {
        DeviceCommand::PolygonMode(mode) => Some(*mode),
        _ => None,
    });
    let last_cull_toggle = before.iter().rev().find_map(|c| match c {
        DeviceCommand::Enable(Capability::CullFace) => Some(true),
        DeviceCommand::Disable(Capability::CullFace) => Some(false),
        _ => None,
    });
    assert_eq!(last_polygon_mode, Some(PolygonMode::Fill));
    assert_eq!(last_cull_toggle, Some(false));

    // The scene's state is handed back after the overlay
    assert!(engine.device.is_enabled(Capability::CullFace));
    assert_eq!(engine.device.current_polygon_mode(), PolygonMode::Line);
}

#[test]
fn test_deactivated_subtree_stops_receiving_updates() {
    let mut engine = engine();
    let log = Log::default();
    let parent = engine.scene.create_object("parent");
    let child = engine.scene.create_child(parent, "child").expect("child");
    engine.scene.add_behaviour(parent, Recorder::new("parent", &log));
    engine.scene.add_behaviour(child, Recorder::new("child", &log));

    tick(&mut engine);
    assert_eq!(entries(&log), vec!["parent:enable", "child:enable", "parent:update", "child:update"]);

    log.borrow_mut().clear();
    engine.scene.set_active(parent, false);
    tick(&mut engine);
    assert_eq!(entries(&log), vec!["parent:disable", "child:disable"]);

    log.borrow_mut().clear();
    engine.scene.set_active(parent, true);
    assert_eq!(entries(&log), vec!["parent:enable", "child:enable"]);
}

#[test]
fn test_fixed_updates_drain_elapsed_time() {
    let mut engine = engine();
    let log = Log::default();
    let object = engine.scene.create_object("ticker");
    engine.scene.add_behaviour(object, Recorder::new("ticker", &log));

    // First frame only establishes the time base
    tick(&mut engine);
    log.borrow_mut().clear();

    // 0.05s at a 0.02s step
    tick(&mut engine);
    assert_eq!(entries(&log), vec!["ticker:fixed", "ticker:fixed", "ticker:update"]);
    assert_relative_eq!(engine.scene.time().delta, 0.05, epsilon = 1e-5);
}

#[test]
fn test_resources_added_after_start_are_announced() {
    let mut engine = engine();
    let log = Log::default();
    let object = engine.scene.create_object("listener");
    engine.scene.add_behaviour(object, Recorder::new("listener", &log));
    engine.resources.mark_started();

    engine
        .resources
        .add_mesh(&mut engine.device, "Ground", MeshGenerator::plane(10.0, 4))
        .expect("mesh");
    log.borrow_mut().clear();

    tick(&mut engine);
    assert!(entries(&log).contains(&"listener:loaded Ground".to_string()));

    log.borrow_mut().clear();
    tick(&mut engine);
    assert!(!entries(&log).iter().any(|e| e.contains("loaded")));
}

#[test]
fn test_last_cascade_ends_at_camera_far_plane() {
    let mut engine = engine();
    add_cube(&mut engine);
    let camera_object = add_camera(&mut engine, 800.0);
    let sun = engine.scene.create_object("sun");
    engine.scene.add_light(sun, Light::directional(Vec3::new(1.0, 1.0, 1.0), 1.0));

    // Shadow pass plus forward pass
    assert_eq!(tick(&mut engine), 2);

    let camera_id = engine.scene.main_camera().expect("main camera");
    let camera = engine.scene.camera(camera_id).expect("camera");
    let bands = engine.graphics.shadow_map().cascade_bands(camera);
    assert_eq!(bands.len(), 5);
    assert_relative_eq!(bands[0].0, 0.1);
    assert_relative_eq!(bands[4].1, 800.0);

    let block = engine.graphics.shadow_block();
    assert_eq!(block.cascade_count, 4);
    assert_relative_eq!(block.far_plane, 800.0);
    assert!(engine.scene.is_active(camera_object));
}

#[test]
fn test_model_matrix_is_product_of_local_matrices() {
    let mut engine = engine();
    let a = engine.scene.create_object("a");
    let b = engine.scene.create_child(a, "b").expect("b");
    let c = engine.scene.create_child(b, "c").expect("c");
    let other = engine.scene.create_object("other");
    let [ta, tb, tc, t_other] = [a, b, c, other].map(|id| engine.scene.transform_of(id).expect("transform"));

    let transforms = engine.scene.transforms_mut();
    transforms.set_local_position(ta, Vec3::new(1.0, 2.0, 3.0));
    transforms.set_local_rotation(tb, Quat::from_axis_angle(&Vec3::y_axis(), 0.5));
    transforms.set_local_scale(tb, Vec3::new(2.0, 2.0, 2.0));
    transforms.set_local_position(tc, Vec3::new(0.0, 0.0, -4.0));

    let transforms = engine.scene.transforms();
    let expected: Mat4 = transforms.get(ta).expect("a").local_matrix()
        * transforms.get(tb).expect("b").local_matrix()
        * transforms.get(tc).expect("c").local_matrix();
    assert_relative_eq!(transforms.world_matrix(tc), expected, epsilon = 1e-5);
    assert_eq!(transforms.root(tc), Some(ta));

    assert!(engine.scene.set_parent(b, Some(other)));
    assert_eq!(engine.scene.transforms().root(tc), Some(t_other));
    assert!(engine.scene.set_parent(c, None));
    assert_eq!(engine.scene.transforms().root(tc), Some(tc));
}

#[test]
fn test_shutdown_quits_then_destroys_children_first() {
    let mut engine = engine();
    let log = Log::default();
    let parent = engine.scene.create_object("parent");
    let child = engine.scene.create_child(parent, "child").expect("child");
    engine.scene.add_behaviour(parent, Recorder::new("parent", &log));
    engine.scene.add_behaviour(child, Recorder::new("child", &log));
    add_cube(&mut engine);
    add_camera(&mut engine, 100.0);
    tick(&mut engine);
    log.borrow_mut().clear();

    engine.shutdown();
    assert_eq!(
        entries(&log),
        vec!["parent:quit", "child:quit", "child:disable", "child:destroy", "parent:disable", "parent:destroy"]
    );
    assert!(engine.scene.objects().is_empty());
    assert_eq!(engine.device.live_object_count(), 0);

    // A second shutdown has nothing left to do
    log.borrow_mut().clear();
    engine.shutdown();
    assert!(entries(&log).is_empty());
}

#[test]
fn test_run_stops_at_platform_close() {
    let mut engine = Engine::new(
        EngineConfig::default(),
        HeadlessDevice::new(320, 240),
        HeadlessPlatform::new(320, 240, 1.0 / 60.0).with_frame_limit(3),
    )
    .expect("engine");
    let mut app = CountingApp::default();

    engine.run(&mut app).expect("run");

    assert!(app.initialized);
    assert_eq!(app.updates, 3);
    assert!(app.cleaned_up);
    assert_eq!(engine.platform().swap_count(), 3);
    assert!(!engine.is_running());
}

#[test]
fn test_viewport_follows_platform_resize() {
    let mut engine = engine();
    engine.platform_mut().resize(1024, 512);
    tick(&mut engine);
    let viewport = engine.device.current_viewport();
    assert_eq!((viewport.width, viewport.height), (1024, 512));
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = EngineConfig::default();
    config.time.fixed_timestep = 0.0;
    let result = Engine::new(config, HeadlessDevice::new(64, 64), HeadlessPlatform::new(64, 64, 0.1));
    assert!(matches!(result, Err(crate::EngineError::Config(_))));
}
