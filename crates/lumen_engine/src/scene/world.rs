//! The scene: game objects, their components and the lifecycle dispatcher
//!
//! Behaviour hooks receive `&mut Scene`. To make that possible a behaviour is
//! taken out of its slot for the duration of a hook and put back afterwards;
//! a hook that runs while its own slot is empty (re-entrant dispatch, or the
//! behaviour removed itself) is simply skipped.
//!
//! Destruction is deferred: [`Scene::destroy`] only queues the object, and
//! [`Scene::process_destroy_queue`] tears the queued subtrees down at the end
//! of the frame, children before parents.

use std::collections::HashMap;

use slotmap::SlotMap;

use super::behaviour::{Behaviour, BehaviourContext};
use super::game_object::{Component, GameObject, Layers};
use super::transform::Transforms;
use super::{BehaviourId, CameraId, GameObjectId, LightId, RendererId, RigidbodyId, TransformId};
use crate::foundation::math::{Mat4, Vec3};
use crate::physics::{BodyDesc, BodyHandle, BodyKind, Collision, PhysicsWorld, Rigidbody};
use crate::render::device::GraphicsDevice;
use crate::render::graphics2d::Graphics2D;
use crate::render::lighting::{Light, LightType};
use crate::render::primitives::Camera;
use crate::render::renderers::Renderer;

/// Timing of the current frame as seen by behaviours
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTime {
    /// Seconds since the previous frame
    pub delta: f32,
    /// Seconds since startup
    pub total: f32,
    /// Length of one fixed step
    pub fixed_delta: f32,
    /// Frames rendered so far
    pub frame: u64,
}

struct BehaviourSlot {
    owner: GameObjectId,
    behaviour: Option<Box<dyn Behaviour>>,
}

struct Owned<T> {
    owner: GameObjectId,
    value: T,
}

/// Game objects, components and the hierarchy they hang off
pub struct Scene {
    transforms: Transforms,
    objects: SlotMap<GameObjectId, GameObject>,
    object_order: Vec<GameObjectId>,

    behaviours: SlotMap<BehaviourId, BehaviourSlot>,
    behaviour_order: Vec<BehaviourId>,
    renderers: SlotMap<RendererId, Owned<Box<dyn Renderer>>>,
    renderer_order: Vec<RendererId>,
    cameras: SlotMap<CameraId, Owned<Camera>>,
    lights: SlotMap<LightId, Owned<Light>>,
    light_order: Vec<LightId>,
    rigidbodies: SlotMap<RigidbodyId, Owned<Rigidbody>>,

    main_camera: Option<CameraId>,
    main_light: Option<LightId>,
    destroy_queue: Vec<GameObjectId>,
    physics: Option<Box<dyn PhysicsWorld>>,
    time: FrameTime,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Empty scene without a physics world
    pub fn new() -> Self {
        Self {
            transforms: Transforms::new(),
            objects: SlotMap::with_key(),
            object_order: Vec::new(),
            behaviours: SlotMap::with_key(),
            behaviour_order: Vec::new(),
            renderers: SlotMap::with_key(),
            renderer_order: Vec::new(),
            cameras: SlotMap::with_key(),
            lights: SlotMap::with_key(),
            light_order: Vec::new(),
            rigidbodies: SlotMap::with_key(),
            main_camera: None,
            main_light: None,
            destroy_queue: Vec::new(),
            physics: None,
            time: FrameTime::default(),
        }
    }

    // === Time ===

    /// Timing of the current frame
    pub fn time(&self) -> FrameTime {
        self.time
    }

    /// Publish the timing of a new frame
    pub fn set_time(&mut self, time: FrameTime) {
        self.time = time;
        self.transforms.set_delta_time(time.delta);
    }

    // === Objects ===

    /// Create an active root object
    pub fn create_object(&mut self, name: &str) -> GameObjectId {
        let id = self.objects.insert(GameObject::new(name, TransformId::default()));
        let transform = self.transforms.create(Some(id));
        if let Some(object) = self.objects.get_mut(id) {
            object.transform = transform;
        }
        self.object_order.push(id);
        log::trace!("Created object '{}' {:?}", name, id);
        id
    }

    /// Create an object parented under `parent`
    ///
    /// The child inherits the parent's activation state.
    pub fn create_child(&mut self, parent: GameObjectId, name: &str) -> Option<GameObjectId> {
        let parent_object = self.objects.get(parent)?;
        let (parent_transform, active) = (parent_object.transform, parent_object.active);
        let id = self.create_object(name);
        let transform = self.objects.get(id).map(|object| object.transform)?;
        self.transforms.set_parent(transform, Some(parent_transform));
        if let Some(object) = self.objects.get_mut(id) {
            object.active = active;
        }
        Some(id)
    }

    /// Object lookup
    pub fn object(&self, id: GameObjectId) -> Option<&GameObject> {
        self.objects.get(id)
    }

    /// First object with the given name, in creation order
    pub fn find_object(&self, name: &str) -> Option<GameObjectId> {
        self.object_order
            .iter()
            .copied()
            .find(|id| self.objects.get(*id).is_some_and(|object| object.name == name))
    }

    /// Live objects in creation order
    pub fn objects(&self) -> &[GameObjectId] {
        &self.object_order
    }

    /// Transform of an object
    pub fn transform_of(&self, id: GameObjectId) -> Option<TransformId> {
        self.objects.get(id).map(|object| object.transform)
    }

    /// The transform arena
    pub fn transforms(&self) -> &Transforms {
        &self.transforms
    }

    /// The transform arena, for moving objects
    pub fn transforms_mut(&mut self) -> &mut Transforms {
        &mut self.transforms
    }

    /// Reparent an object's transform; `None` makes it a root
    pub fn set_parent(&mut self, child: GameObjectId, parent: Option<GameObjectId>) -> bool {
        let Some(child_transform) = self.transform_of(child) else {
            return false;
        };
        let parent_transform = match parent {
            Some(parent) => match self.transform_of(parent) {
                Some(transform) => Some(transform),
                None => return false,
            },
            None => None,
        };
        self.transforms.set_parent(child_transform, parent_transform)
    }

    /// Replace an object's layer mask
    pub fn set_layers(&mut self, id: GameObjectId, layers: Layers) {
        if let Some(object) = self.objects.get_mut(id) {
            object.layers = layers;
        }
    }

    /// Whether an object exists and is active
    pub fn is_active(&self, id: GameObjectId) -> bool {
        self.objects.get(id).is_some_and(|object| object.active)
    }

    /// Activate or deactivate an object and every descendant
    ///
    /// Behaviours of each object whose state actually changes receive
    /// `on_enable` or `on_disable`. Nothing is destroyed.
    pub fn set_active(&mut self, id: GameObjectId, active: bool) {
        let Some(transform) = self.transform_of(id) else {
            return;
        };
        let mut affected = vec![id];
        affected.extend(
            self.transforms
                .descendants(transform)
                .into_iter()
                .filter_map(|node| self.transforms.get(node).and_then(|node| node.owner())),
        );

        for object_id in affected {
            let Some(object) = self.objects.get_mut(object_id) else {
                continue;
            };
            if object.active == active {
                continue;
            }
            object.active = active;
            let behaviours = behaviour_ids(&object.components);
            for behaviour in behaviours {
                if active {
                    self.invoke(behaviour, |b, ctx| b.on_enable(ctx));
                } else {
                    self.invoke(behaviour, |b, ctx| b.on_disable(ctx));
                }
            }
        }
    }

    fn attach(&mut self, object: GameObjectId, component: Component) {
        if let Some(object) = self.objects.get_mut(object) {
            object.components.push(component);
        }
    }

    fn detach(&mut self, object: GameObjectId, component: Component) {
        if let Some(object) = self.objects.get_mut(object) {
            object.components.retain(|c| *c != component);
        }
    }

    // === Behaviours ===

    /// Attach a behaviour; fires `on_awake`, then `on_enable` if the object is active
    pub fn add_behaviour<B: Behaviour>(&mut self, object: GameObjectId, behaviour: B) -> Option<BehaviourId> {
        if !self.objects.contains_key(object) {
            log::warn!("add_behaviour: unknown object {:?}", object);
            return None;
        }
        let id = self.behaviours.insert(BehaviourSlot {
            owner: object,
            behaviour: Some(Box::new(behaviour)),
        });
        self.behaviour_order.push(id);
        self.attach(object, Component::Behaviour(id));

        self.invoke(id, |b, ctx| b.on_awake(ctx));
        if self.is_active(object) {
            self.invoke(id, |b, ctx| b.on_enable(ctx));
        }
        Some(id)
    }

    /// Typed access to a behaviour
    pub fn behaviour<T: Behaviour>(&self, id: BehaviourId) -> Option<&T> {
        self.behaviours
            .get(id)?
            .behaviour
            .as_ref()?
            .as_any()
            .downcast_ref::<T>()
    }

    /// Typed mutable access to a behaviour
    pub fn behaviour_mut<T: Behaviour>(&mut self, id: BehaviourId) -> Option<&mut T> {
        self.behaviours
            .get_mut(id)?
            .behaviour
            .as_mut()?
            .as_any_mut()
            .downcast_mut::<T>()
    }

    /// First behaviour of type `T` on an object
    pub fn find_behaviour<T: Behaviour>(&self, object: GameObjectId) -> Option<BehaviourId> {
        let object = self.objects.get(object)?;
        behaviour_ids(&object.components)
            .into_iter()
            .find(|id| self.behaviour::<T>(*id).is_some())
    }

    /// Number of attached behaviours
    pub fn behaviour_count(&self) -> usize {
        self.behaviours.len()
    }

    /// Detach a behaviour; fires `on_disable` (if active) and `on_destroy`
    pub fn remove_behaviour(&mut self, id: BehaviourId) -> bool {
        let Some(owner) = self.behaviours.get(id).map(|slot| slot.owner) else {
            return false;
        };
        if self.is_active(owner) {
            self.invoke(id, |b, ctx| b.on_disable(ctx));
        }
        self.invoke(id, |b, ctx| b.on_destroy(ctx));

        self.behaviours.remove(id);
        self.behaviour_order.retain(|b| *b != id);
        self.detach(owner, Component::Behaviour(id));
        true
    }

    /// Detach every behaviour of an object, last attached first
    pub fn remove_behaviours(&mut self, object: GameObjectId) -> usize {
        let Some(ids) = self.objects.get(object).map(|o| behaviour_ids(&o.components)) else {
            return 0;
        };
        let mut removed = 0;
        for index in (0..ids.len()).rev() {
            if self.remove_behaviour(ids[index]) {
                removed += 1;
            }
        }
        removed
    }

    fn invoke<F>(&mut self, id: BehaviourId, mut hook: F)
    where
        F: FnMut(&mut dyn Behaviour, &mut BehaviourContext<'_>),
    {
        let Some(slot) = self.behaviours.get_mut(id) else {
            return;
        };
        let owner = slot.owner;
        let Some(mut behaviour) = slot.behaviour.take() else {
            return;
        };

        {
            let mut ctx = BehaviourContext { scene: &mut *self, object: owner, behaviour: id };
            hook(behaviour.as_mut(), &mut ctx);
        }

        if let Some(slot) = self.behaviours.get_mut(id) {
            slot.behaviour = Some(behaviour);
        }
    }

    fn dispatch<F>(&mut self, mut hook: F)
    where
        F: FnMut(&mut dyn Behaviour, &mut BehaviourContext<'_>),
    {
        let order = self.behaviour_order.clone();
        for id in order {
            let active = self.behaviours.get(id).is_some_and(|slot| self.is_active(slot.owner));
            if active {
                self.invoke(id, &mut hook);
            }
        }
    }

    fn dispatch_to_object<F>(&mut self, object: GameObjectId, mut hook: F)
    where
        F: FnMut(&mut dyn Behaviour, &mut BehaviourContext<'_>),
    {
        let Some(ids) = self.objects.get(object).filter(|o| o.active).map(|o| behaviour_ids(&o.components)) else {
            return;
        };
        for id in ids {
            self.invoke(id, &mut hook);
        }
    }

    /// `on_update` for every behaviour of an active object
    pub fn update(&mut self) {
        self.dispatch(|b, ctx| b.on_update(ctx));
    }

    /// `on_late_update` for every behaviour of an active object
    pub fn late_update(&mut self) {
        self.dispatch(|b, ctx| b.on_late_update(ctx));
    }

    /// `on_fixed_update` for every behaviour of an active object
    pub fn fixed_update(&mut self) {
        self.dispatch(|b, ctx| b.on_fixed_update(ctx));
    }

    /// `on_gui` for every behaviour of an active object
    pub fn dispatch_gui(&mut self, gui: &mut Graphics2D) {
        self.dispatch(|b, ctx| b.on_gui(ctx, gui));
    }

    /// `on_render` for every behaviour of an active object
    pub fn dispatch_render(&mut self, device: &mut dyn GraphicsDevice) {
        self.dispatch(|b, ctx| b.on_render(ctx, &mut *device));
    }

    /// `on_resource_loaded` for every behaviour of an active object
    pub fn dispatch_resource_loaded(&mut self, name: &str) {
        self.dispatch(|b, ctx| b.on_resource_loaded(ctx, name));
    }

    /// `on_application_quit` for every behaviour of an active object
    pub fn dispatch_application_quit(&mut self) {
        self.dispatch(|b, ctx| b.on_application_quit(ctx));
    }

    // === Renderers ===

    /// Attach a renderer
    pub fn add_renderer<R: Renderer>(&mut self, object: GameObjectId, renderer: R) -> Option<RendererId> {
        if !self.objects.contains_key(object) {
            log::warn!("add_renderer: unknown object {:?}", object);
            return None;
        }
        let id = self.renderers.insert(Owned { owner: object, value: Box::new(renderer) });
        self.renderer_order.push(id);
        self.attach(object, Component::Renderer(id));
        Some(id)
    }

    /// Typed access to a renderer
    pub fn renderer<T: Renderer>(&self, id: RendererId) -> Option<&T> {
        self.renderers.get(id)?.value.as_any().downcast_ref::<T>()
    }

    /// Typed mutable access to a renderer
    pub fn renderer_mut<T: Renderer>(&mut self, id: RendererId) -> Option<&mut T> {
        self.renderers.get_mut(id)?.value.as_any_mut().downcast_mut::<T>()
    }

    /// Detach a renderer
    pub fn remove_renderer(&mut self, id: RendererId) -> bool {
        let Some(slot) = self.renderers.remove(id) else {
            return false;
        };
        self.renderer_order.retain(|r| *r != id);
        self.detach(slot.owner, Component::Renderer(id));
        true
    }

    /// Renderers of active objects in registration order
    pub fn renderers_in_order(&self) -> impl Iterator<Item = (RendererId, &dyn Renderer)> + '_ {
        self.renderer_order.iter().filter_map(move |id| {
            let slot = self.renderers.get(*id)?;
            self.is_active(slot.owner).then_some((*id, slot.value.as_ref()))
        })
    }

    /// A renderer and the world matrix of its owner
    pub fn renderer_entry(&self, id: RendererId) -> Option<(&dyn Renderer, Mat4)> {
        let slot = self.renderers.get(id)?;
        let transform = self.transform_of(slot.owner)?;
        Some((slot.value.as_ref(), self.transforms.world_matrix(transform)))
    }

    // === Cameras ===

    /// Attach a camera; the first camera registered becomes the main camera
    pub fn add_camera(&mut self, object: GameObjectId, camera: Camera) -> Option<CameraId> {
        if !self.objects.contains_key(object) {
            log::warn!("add_camera: unknown object {:?}", object);
            return None;
        }
        let id = self.cameras.insert(Owned { owner: object, value: camera });
        self.attach(object, Component::Camera(id));
        if self.main_camera.is_none() {
            log::debug!("Main camera set to {:?}", id);
            self.main_camera = Some(id);
        }
        Some(id)
    }

    /// Camera lookup
    pub fn camera(&self, id: CameraId) -> Option<&Camera> {
        self.cameras.get(id).map(|slot| &slot.value)
    }

    /// Mutable camera lookup
    pub fn camera_mut(&mut self, id: CameraId) -> Option<&mut Camera> {
        self.cameras.get_mut(id).map(|slot| &mut slot.value)
    }

    /// Current main camera
    pub fn main_camera(&self) -> Option<CameraId> {
        self.main_camera
    }

    /// Replace the main camera
    pub fn set_main_camera(&mut self, id: CameraId) -> bool {
        if !self.cameras.contains_key(id) {
            return false;
        }
        self.main_camera = Some(id);
        true
    }

    /// Bring the main camera in line with its transform and the viewport
    ///
    /// Returns `false` when there is no main camera on an active object.
    pub fn sync_main_camera(&mut self, aspect: f32) -> bool {
        let Some(slot) = self.main_camera.and_then(|id| self.cameras.get_mut(id)) else {
            return false;
        };
        let Some(object) = self.objects.get(slot.owner).filter(|o| o.active) else {
            return false;
        };
        let world = self.transforms.world_matrix(object.transform);
        let revision = self.transforms.revision(object.transform);
        slot.value.sync(&world, revision, aspect);
        true
    }

    /// The main camera, if its object is active
    pub fn active_main_camera(&self) -> Option<&Camera> {
        let slot = self.cameras.get(self.main_camera?)?;
        self.is_active(slot.owner).then_some(&slot.value)
    }

    // === Lights ===

    /// Attach a light; the first directional light becomes the main light
    pub fn add_light(&mut self, object: GameObjectId, light: Light) -> Option<LightId> {
        if !self.objects.contains_key(object) {
            log::warn!("add_light: unknown object {:?}", object);
            return None;
        }
        let directional = light.light_type == LightType::Directional;
        let id = self.lights.insert(Owned { owner: object, value: light });
        self.light_order.push(id);
        self.attach(object, Component::Light(id));
        if directional && self.main_light.is_none() {
            self.main_light = Some(id);
        }
        Some(id)
    }

    /// Light lookup
    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.lights.get(id).map(|slot| &slot.value)
    }

    /// Mutable light lookup
    pub fn light_mut(&mut self, id: LightId) -> Option<&mut Light> {
        self.lights.get_mut(id).map(|slot| &mut slot.value)
    }

    /// Light driving the shadow cascades
    pub fn main_light(&self) -> Option<LightId> {
        self.main_light
    }

    /// Replace the shadow-casting light
    pub fn set_main_light(&mut self, id: LightId) -> bool {
        if !self.lights.contains_key(id) {
            return false;
        }
        self.main_light = Some(id);
        true
    }

    /// World forward axis of the main light, if its object is active
    pub fn main_light_direction(&self) -> Option<Vec3> {
        let slot = self.lights.get(self.main_light?)?;
        let object = self.objects.get(slot.owner).filter(|o| o.active)?;
        Some(self.transforms.forward(object.transform))
    }

    /// Lights of active objects with their world position and direction
    pub fn lights_in_order(&self) -> Vec<(&Light, Vec3, Vec3)> {
        self.light_order
            .iter()
            .filter_map(|id| {
                let slot = self.lights.get(*id)?;
                let object = self.objects.get(slot.owner).filter(|o| o.active)?;
                Some((
                    &slot.value,
                    self.transforms.position(object.transform),
                    self.transforms.forward(object.transform),
                ))
            })
            .collect()
    }

    // === Physics ===

    /// Install the physics world; existing rigidbodies are registered with it
    pub fn set_physics(&mut self, mut physics: Box<dyn PhysicsWorld>) {
        if let Some(old) = self.physics.as_mut() {
            for slot in self.rigidbodies.values() {
                old.remove_body(slot.value.handle);
            }
        }
        for slot in self.rigidbodies.values_mut() {
            let Some(object) = self.objects.get(slot.owner) else {
                continue;
            };
            let position = self.transforms.position(object.transform);
            let rotation = self.transforms.rotation(object.transform);
            slot.value.handle = physics.add_body(&slot.value.desc, position, rotation);
        }
        self.physics = Some(physics);
    }

    /// Installed physics world
    pub fn physics(&self) -> Option<&dyn PhysicsWorld> {
        self.physics.as_deref()
    }

    /// Attach a rigidbody at the object's current pose
    pub fn add_rigidbody(&mut self, object: GameObjectId, desc: BodyDesc) -> Option<RigidbodyId> {
        let transform = self.transform_of(object)?;
        let Some(physics) = self.physics.as_mut() else {
            log::warn!("add_rigidbody: no physics world installed");
            return None;
        };
        let handle = physics.add_body(
            &desc,
            self.transforms.position(transform),
            self.transforms.rotation(transform),
        );
        let id = self.rigidbodies.insert(Owned {
            owner: object,
            value: Rigidbody { desc, handle },
        });
        self.attach(object, Component::Rigidbody(id));
        Some(id)
    }

    /// Rigidbody lookup
    pub fn rigidbody(&self, id: RigidbodyId) -> Option<&Rigidbody> {
        self.rigidbodies.get(id).map(|slot| &slot.value)
    }

    /// Step the physics world and write poses back
    ///
    /// Kinematic bodies follow their transforms, dynamic bodies move their
    /// transforms. Collisions are delivered to the behaviours of both objects.
    pub fn step_physics(&mut self, delta_time: f32) {
        let Some(physics) = self.physics.as_mut() else {
            return;
        };

        for slot in self.rigidbodies.values() {
            if slot.value.desc.kind != BodyKind::Kinematic {
                continue;
            }
            if let Some(object) = self.objects.get(slot.owner) {
                physics.set_body_pose(
                    slot.value.handle,
                    self.transforms.position(object.transform),
                    self.transforms.rotation(object.transform),
                );
            }
        }

        physics.step(delta_time);

        let mut owners: HashMap<BodyHandle, GameObjectId> = HashMap::new();
        for slot in self.rigidbodies.values() {
            owners.insert(slot.value.handle, slot.owner);
            if slot.value.desc.kind != BodyKind::Dynamic {
                continue;
            }
            let (Some(object), Some((position, rotation))) =
                (self.objects.get(slot.owner), physics.body_pose(slot.value.handle))
            else {
                continue;
            };
            self.transforms.set_position(object.transform, position);
            self.transforms.set_rotation(object.transform, rotation);
        }

        let events = physics.drain_collisions();
        for event in events {
            let (Some(a), Some(b)) = (owners.get(&event.a).copied(), owners.get(&event.b).copied()) else {
                continue;
            };
            let for_a = Collision { other: b, point: event.point, normal: event.normal, depth: event.depth };
            let for_b = Collision { other: a, point: event.point, normal: -event.normal, depth: event.depth };
            self.dispatch_to_object(a, |behaviour, ctx| behaviour.on_collision(ctx, &for_a));
            self.dispatch_to_object(b, |behaviour, ctx| behaviour.on_collision(ctx, &for_b));
        }
    }

    // === Destruction ===

    /// Queue an object (and its descendants) for destruction at end of frame
    pub fn destroy(&mut self, id: GameObjectId) {
        let Some(object) = self.objects.get_mut(id) else {
            return;
        };
        if !object.pending_destroy {
            object.pending_destroy = true;
            self.destroy_queue.push(id);
        }
    }

    /// Objects waiting to be destroyed
    pub fn pending_destroy_count(&self) -> usize {
        self.destroy_queue.len()
    }

    /// Tear down every queued object, descendants before their parents
    pub fn process_destroy_queue(&mut self) -> usize {
        let mut destroyed = 0;
        while !self.destroy_queue.is_empty() {
            let queue = std::mem::take(&mut self.destroy_queue);
            for id in queue {
                let Some(transform) = self.transform_of(id) else {
                    continue;
                };
                let mut subtree: Vec<GameObjectId> = vec![id];
                subtree.extend(
                    self.transforms
                        .descendants(transform)
                        .into_iter()
                        .filter_map(|node| self.transforms.get(node).and_then(|node| node.owner())),
                );
                for object in subtree.into_iter().rev() {
                    if self.destroy_now(object) {
                        destroyed += 1;
                    }
                }
            }
        }
        if destroyed > 0 {
            log::debug!("Destroyed {} objects", destroyed);
        }
        destroyed
    }

    /// Queue every object and tear them all down
    pub fn destroy_all(&mut self) -> usize {
        let roots: Vec<GameObjectId> = self
            .object_order
            .iter()
            .copied()
            .filter(|id| self.transform_of(*id).is_some_and(|t| self.transforms.parent(t).is_none()))
            .collect();
        for id in roots {
            self.destroy(id);
        }
        self.process_destroy_queue()
    }

    fn destroy_now(&mut self, id: GameObjectId) -> bool {
        let Some(components) = self.objects.get(id).map(|object| object.components.clone()) else {
            return false;
        };

        for component in components.into_iter().rev() {
            match component {
                Component::Behaviour(behaviour) => {
                    self.remove_behaviour(behaviour);
                }
                Component::Renderer(renderer) => {
                    self.remove_renderer(renderer);
                }
                Component::Camera(camera) => {
                    self.cameras.remove(camera);
                    if self.main_camera == Some(camera) {
                        log::debug!("Main camera {:?} destroyed", camera);
                        self.main_camera = None;
                    }
                }
                Component::Light(light) => {
                    self.lights.remove(light);
                    self.light_order.retain(|l| *l != light);
                    if self.main_light == Some(light) {
                        self.main_light = None;
                    }
                }
                Component::Rigidbody(rigidbody) => {
                    if let Some(slot) = self.rigidbodies.remove(rigidbody) {
                        if let Some(physics) = self.physics.as_mut() {
                            physics.remove_body(slot.value.handle);
                        }
                    }
                }
            }
        }

        if let Some(object) = self.objects.remove(id) {
            self.transforms.remove(object.transform);
            log::trace!("Destroyed object '{}' {:?}", object.name, id);
        }
        self.object_order.retain(|o| *o != id);
        true
    }
}

fn behaviour_ids(components: &[Component]) -> Vec<BehaviourId> {
    components
        .iter()
        .filter_map(|component| match component {
            Component::Behaviour(id) => Some(*id),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::SphereWorld;
    use std::any::Any;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

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
        fn on_awake(&mut self, _ctx: &mut BehaviourContext<'_>) {
            self.push("awake");
        }

        fn on_enable(&mut self, _ctx: &mut BehaviourContext<'_>) {
            self.push("enable");
        }

        fn on_disable(&mut self, _ctx: &mut BehaviourContext<'_>) {
            self.push("disable");
        }

        fn on_destroy(&mut self, _ctx: &mut BehaviourContext<'_>) {
            self.push("destroy");
        }

        fn on_collision(&mut self, ctx: &mut BehaviourContext<'_>, collision: &Collision) {
            let other = ctx.scene.object(collision.other).map(|o| o.name().to_string()).unwrap_or_default();
            self.push(&format!("hit {}", other));
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    /// Destroys its own object on the first update
    struct SelfDestruct;

    impl Behaviour for SelfDestruct {
        fn on_update(&mut self, ctx: &mut BehaviourContext<'_>) {
            ctx.scene.destroy(ctx.object);
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

    #[test]
    fn test_awake_then_enable_on_attach() {
        let log = Log::default();
        let mut scene = Scene::new();
        let object = scene.create_object("player");
        scene.add_behaviour(object, Recorder::new("player", &log));
        assert_eq!(entries(&log), vec!["player:awake", "player:enable"]);
    }

    #[test]
    fn test_deactivation_reaches_descendants() {
        let log = Log::default();
        let mut scene = Scene::new();
        let parent = scene.create_object("parent");
        let child = scene.create_child(parent, "child").expect("child");
        let grandchild = scene.create_child(child, "grandchild").expect("grandchild");
        scene.add_behaviour(parent, Recorder::new("parent", &log));
        scene.add_behaviour(child, Recorder::new("child", &log));
        scene.add_behaviour(grandchild, Recorder::new("grandchild", &log));
        log.borrow_mut().clear();

        scene.set_active(parent, false);
        assert_eq!(entries(&log), vec!["parent:disable", "child:disable", "grandchild:disable"]);
        assert!(!scene.is_active(grandchild));
        assert_eq!(scene.objects().len(), 3);

        log.borrow_mut().clear();
        scene.set_active(parent, true);
        assert_eq!(entries(&log), vec!["parent:enable", "child:enable", "grandchild:enable"]);
    }

    #[test]
    fn test_destroy_is_deferred_and_children_go_first() {
        let log = Log::default();
        let mut scene = Scene::new();
        let parent = scene.create_object("parent");
        let child = scene.create_child(parent, "child").expect("child");
        scene.add_behaviour(parent, Recorder::new("parent", &log));
        scene.add_behaviour(child, Recorder::new("child", &log));
        log.borrow_mut().clear();

        scene.destroy(parent);
        assert!(scene.object(parent).is_some_and(|o| o.is_pending_destroy()));
        assert!(log.borrow().is_empty());

        assert_eq!(scene.process_destroy_queue(), 2);
        assert_eq!(
            entries(&log),
            vec!["child:disable", "child:destroy", "parent:disable", "parent:destroy"]
        );
        assert!(scene.object(child).is_none());
        assert!(scene.transforms().is_empty());
        assert_eq!(scene.behaviour_count(), 0);
    }

    #[test]
    fn test_remove_behaviours_last_first() {
        let log = Log::default();
        let mut scene = Scene::new();
        let object = scene.create_object("object");
        scene.set_active(object, false);
        scene.add_behaviour(object, Recorder::new("a", &log));
        scene.add_behaviour(object, Recorder::new("b", &log));
        log.borrow_mut().clear();

        assert_eq!(scene.remove_behaviours(object), 2);
        assert_eq!(entries(&log), vec!["b:destroy", "a:destroy"]);
        assert!(scene.object(object).is_some_and(|o| o.components().is_empty()));
    }

    #[test]
    fn test_behaviour_can_destroy_itself_during_update() {
        let mut scene = Scene::new();
        let object = scene.create_object("doomed");
        scene.add_behaviour(object, SelfDestruct);

        scene.update();
        assert!(scene.object(object).is_some());
        scene.process_destroy_queue();
        assert!(scene.object(object).is_none());
        assert_eq!(scene.behaviour_count(), 0);
    }

    #[test]
    fn test_typed_behaviour_lookup() {
        let log = Log::default();
        let mut scene = Scene::new();
        let object = scene.create_object("object");
        scene.add_behaviour(object, SelfDestruct);
        let recorder = scene.add_behaviour(object, Recorder::new("r", &log)).expect("recorder");

        assert_eq!(scene.find_behaviour::<Recorder>(object), Some(recorder));
        assert_eq!(scene.behaviour::<Recorder>(recorder).map(|r| r.name), Some("r"));
        assert!(scene.behaviour::<SelfDestruct>(recorder).is_none());
    }

    #[test]
    fn test_main_camera_first_wins_and_clears_on_destroy() {
        let mut scene = Scene::new();
        let first = scene.create_object("first");
        let second = scene.create_object("second");
        let a = scene.add_camera(first, Camera::default()).expect("camera");
        scene.add_camera(second, Camera::default()).expect("camera");
        assert_eq!(scene.main_camera(), Some(a));

        scene.destroy(first);
        scene.process_destroy_queue();
        assert_eq!(scene.main_camera(), None);
        assert!(!scene.sync_main_camera(1.0));
    }

    #[test]
    fn test_main_light_is_first_directional() {
        let mut scene = Scene::new();
        let object = scene.create_object("lights");
        scene.add_light(object, Light::point(Vec3::new(1.0, 1.0, 1.0), 1.0, 10.0));
        let sun = scene.add_light(object, Light::default()).expect("sun");
        assert_eq!(scene.main_light(), Some(sun));
        assert_eq!(scene.lights_in_order().len(), 2);

        let direction = scene.main_light_direction().expect("direction");
        assert!((direction - Vec3::new(0.0, 0.0, -1.0)).norm() < 1e-6);
    }

    #[test]
    fn test_collisions_reach_both_objects() {
        let log = Log::default();
        let mut scene = Scene::new();
        scene.set_physics(Box::new(SphereWorld::new(Vec3::zeros())));

        let left = scene.create_object("left");
        let right = scene.create_object("right");
        let right_transform = scene.transform_of(right).expect("transform");
        scene.transforms_mut().set_position(right_transform, Vec3::new(0.5, 0.0, 0.0));
        scene.add_behaviour(left, Recorder::new("left", &log));
        scene.add_behaviour(right, Recorder::new("right", &log));
        scene.add_rigidbody(left, BodyDesc::sphere(0.5, 1.0)).expect("body");
        scene.add_rigidbody(right, BodyDesc::sphere(0.5, 1.0)).expect("body");
        log.borrow_mut().clear();

        scene.step_physics(1.0 / 60.0);
        let log = entries(&log);
        assert!(log.contains(&"left:hit right".to_string()));
        assert!(log.contains(&"right:hit left".to_string()));
    }

    #[test]
    fn test_dynamic_body_moves_transform() {
        let mut scene = Scene::new();
        scene.set_physics(Box::new(SphereWorld::default()));
        let ball = scene.create_object("ball");
        scene.add_rigidbody(ball, BodyDesc::sphere(0.5, 1.0)).expect("body");

        scene.step_physics(0.1);
        let transform = scene.transform_of(ball).expect("transform");
        assert!(scene.transforms().position(transform).y < 0.0);

        scene.destroy(ball);
        scene.process_destroy_queue();
        assert!(scene.physics().is_some());
    }
}
