//! Scene graph and object model
//!
//! A [`Scene`] owns every game object together with its components. Objects
//! and components live in arenas and are addressed by stable slotmap keys,
//! so a destroyed object simply stops resolving instead of dangling.
//!
//! ```text
//! Scene
//!  ├─ Transforms (hierarchy arena)
//!  ├─ GameObjects ── components: [Behaviour | Renderer | Camera | Light | Rigidbody]
//!  ├─ main camera / main light
//!  └─ destroy queue (processed at end of frame)
//! ```

mod behaviour;
mod game_object;
mod transform;
mod world;

pub use behaviour::{Behaviour, BehaviourContext};
pub use game_object::{Component, GameObject, Layers};
pub use transform::{TransformNode, Transforms};
pub use world::{FrameTime, Scene};

slotmap::new_key_type! {
    /// Transform node key
    pub struct TransformId;
    /// Game object key
    pub struct GameObjectId;
    /// Behaviour component key
    pub struct BehaviourId;
    /// Renderer component key
    pub struct RendererId;
    /// Camera component key
    pub struct CameraId;
    /// Light component key
    pub struct LightId;
    /// Rigidbody component key
    pub struct RigidbodyId;
}
