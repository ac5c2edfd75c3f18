//! Physics integration
//!
//! The rigid-body simulation itself is an external collaborator behind the
//! [`PhysicsWorld`] trait. The scene registers a body for every
//! [`Rigidbody`] component, steps the world on the fixed timestep, writes the
//! simulated poses back into the owning transforms and forwards collision
//! events to the behaviours of both objects involved.
//!
//! [`SphereWorld`] is a small built-in implementation: bodies are spheres
//! integrated under gravity, and overlaps are reported as collision events.
//! It does not resolve contacts.

mod sphere_world;

pub use sphere_world::SphereWorld;

use serde::{Deserialize, Serialize};

use crate::foundation::math::{Quat, Vec3};
use crate::scene::GameObjectId;

/// Opaque body identifier issued by a [`PhysicsWorld`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub u64);

/// Collision shape of a body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BodyShape {
    /// Sphere of the given radius
    Sphere {
        /// Radius
        radius: f32,
    },
    /// Box with the given half extents
    Box {
        /// Half size along each axis
        half_extents: Vec3,
    },
}

impl BodyShape {
    /// Radius of a sphere enclosing the shape
    pub fn bounding_radius(&self) -> f32 {
        match self {
            BodyShape::Sphere { radius } => *radius,
            BodyShape::Box { half_extents } => half_extents.norm(),
        }
    }
}

/// How the simulation treats a body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyKind {
    /// Moved by the simulation
    #[default]
    Dynamic,
    /// Moved by its transform, pushes dynamic bodies
    Kinematic,
    /// Never moves
    Static,
}

/// Parameters of a rigidbody
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyDesc {
    /// Collision shape
    pub shape: BodyShape,
    /// Simulation mode
    pub kind: BodyKind,
    /// Mass in kilograms
    pub mass: f32,
    /// Initial linear velocity
    pub velocity: Vec3,
}

impl BodyDesc {
    /// Dynamic sphere
    pub fn sphere(radius: f32, mass: f32) -> Self {
        Self {
            shape: BodyShape::Sphere { radius },
            kind: BodyKind::Dynamic,
            mass,
            velocity: Vec3::zeros(),
        }
    }

    /// Static box
    pub fn fixed_box(half_extents: Vec3) -> Self {
        Self {
            shape: BodyShape::Box { half_extents },
            kind: BodyKind::Static,
            mass: 0.0,
            velocity: Vec3::zeros(),
        }
    }

    /// Replace the simulation mode
    pub fn with_kind(mut self, kind: BodyKind) -> Self {
        self.kind = kind;
        self
    }

    /// Replace the initial velocity
    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }
}

/// Contact reported by the simulation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEvent {
    /// First body
    pub a: BodyHandle,
    /// Second body
    pub b: BodyHandle,
    /// World-space contact point
    pub point: Vec3,
    /// Contact normal pointing from `a` to `b`
    pub normal: Vec3,
    /// Penetration depth
    pub depth: f32,
}

/// Collision as seen by one of the objects involved
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collision {
    /// The other object
    pub other: GameObjectId,
    /// World-space contact point
    pub point: Vec3,
    /// Contact normal pointing away from this object
    pub normal: Vec3,
    /// Penetration depth
    pub depth: f32,
}

/// Rigidbody component state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rigidbody {
    /// Body parameters
    pub desc: BodyDesc,
    /// Handle in the physics world
    pub handle: BodyHandle,
}

/// Rigid-body simulation consumed by the scene
pub trait PhysicsWorld {
    /// Create a body at a pose
    fn add_body(&mut self, desc: &BodyDesc, position: Vec3, rotation: Quat) -> BodyHandle;

    /// Destroy a body
    fn remove_body(&mut self, handle: BodyHandle);

    /// Teleport a body
    fn set_body_pose(&mut self, handle: BodyHandle, position: Vec3, rotation: Quat);

    /// Current pose of a body
    fn body_pose(&self, handle: BodyHandle) -> Option<(Vec3, Quat)>;

    /// Advance the simulation by `delta_time` seconds
    fn step(&mut self, delta_time: f32);

    /// Collisions found by the last steps, oldest first
    fn drain_collisions(&mut self) -> Vec<CollisionEvent>;
}
