//! Script components
//!
//! A [`Behaviour`] implements only the hooks it cares about; every hook has
//! a no-op default. Hooks receive a [`BehaviourContext`] with mutable access
//! to the whole scene, so a behaviour can move its transform, spawn objects
//! or queue destruction while it runs.

use std::any::Any;

use super::{BehaviourId, GameObjectId, Scene, TransformId};
use crate::physics::Collision;
use crate::render::device::GraphicsDevice;
use crate::render::graphics2d::Graphics2D;

/// Scene access handed to behaviour hooks
pub struct BehaviourContext<'a> {
    /// The scene the behaviour lives in
    pub scene: &'a mut Scene,
    /// Owning game object
    pub object: GameObjectId,
    /// The behaviour being invoked
    pub behaviour: BehaviourId,
}

impl BehaviourContext<'_> {
    /// Transform of the owning object
    pub fn transform(&self) -> Option<TransformId> {
        self.scene.object(self.object).map(|object| object.transform())
    }

    /// Frame delta in seconds
    pub fn delta_time(&self) -> f32 {
        self.scene.time().delta
    }
}

/// Lifecycle and per-frame hooks of a script component
#[allow(unused_variables)]
pub trait Behaviour: Any {
    /// Once, right after the behaviour is attached
    fn on_awake(&mut self, ctx: &mut BehaviourContext<'_>) {}

    /// When the owning object becomes active (and after `on_awake` if it already is)
    fn on_enable(&mut self, ctx: &mut BehaviourContext<'_>) {}

    /// When the owning object becomes inactive
    fn on_disable(&mut self, ctx: &mut BehaviourContext<'_>) {}

    /// Every frame
    fn on_update(&mut self, ctx: &mut BehaviourContext<'_>) {}

    /// Every frame after all `on_update` calls
    fn on_late_update(&mut self, ctx: &mut BehaviourContext<'_>) {}

    /// Every fixed timestep
    fn on_fixed_update(&mut self, ctx: &mut BehaviourContext<'_>) {}

    /// Every frame, to record 2D draws
    fn on_gui(&mut self, ctx: &mut BehaviourContext<'_>, gui: &mut Graphics2D) {}

    /// When a rigidbody of the owning object starts touching another
    fn on_collision(&mut self, ctx: &mut BehaviourContext<'_>, collision: &Collision) {}

    /// When the owning object (or the behaviour itself) is destroyed
    fn on_destroy(&mut self, ctx: &mut BehaviourContext<'_>) {}

    /// Once at shutdown, before objects are destroyed
    fn on_application_quit(&mut self, ctx: &mut BehaviourContext<'_>) {}

    /// Every frame after the 3D pass, with direct device access
    fn on_render(&mut self, ctx: &mut BehaviourContext<'_>, device: &mut dyn GraphicsDevice) {}

    /// When a named resource finished registering after startup
    fn on_resource_loaded(&mut self, ctx: &mut BehaviourContext<'_>, name: &str) {}

    /// Downcast support
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
