//! Game objects and their component lists

use bitflags::bitflags;

use super::{BehaviourId, CameraId, LightId, RendererId, RigidbodyId, TransformId};

bitflags! {
    /// Layer membership mask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Layers: u32 {
        /// Default layer
        const DEFAULT = 1 << 0;
        /// Excluded from picking
        const IGNORE_RAYCAST = 1 << 2;
        /// User interface objects
        const UI = 1 << 5;
        /// Any other bit is a user layer
        const _ = !0;
    }
}

impl Default for Layers {
    fn default() -> Self {
        Layers::DEFAULT
    }
}

/// Tagged reference to a component stored in the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// Script hooks
    Behaviour(BehaviourId),
    /// Draw submission
    Renderer(RendererId),
    /// Camera
    Camera(CameraId),
    /// Light source
    Light(LightId),
    /// Physics body
    Rigidbody(RigidbodyId),
}

/// Composition root: one transform plus an ordered component list
#[derive(Debug, Clone)]
pub struct GameObject {
    pub(super) name: String,
    pub(super) transform: TransformId,
    pub(super) active: bool,
    pub(super) layers: Layers,
    pub(super) components: Vec<Component>,
    pub(super) pending_destroy: bool,
}

impl GameObject {
    pub(super) fn new(name: &str, transform: TransformId) -> Self {
        Self {
            name: name.to_string(),
            transform,
            active: true,
            layers: Layers::default(),
            components: Vec::new(),
            pending_destroy: false,
        }
    }

    /// Object name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owned transform
    pub fn transform(&self) -> TransformId {
        self.transform
    }

    /// Activation flag
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Layer mask
    pub fn layers(&self) -> Layers {
        self.layers
    }

    /// Components in attach order
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Whether the object is queued for destruction
    pub fn is_pending_destroy(&self) -> bool {
        self.pending_destroy
    }
}
