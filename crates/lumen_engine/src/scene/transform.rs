//! Transform hierarchy
//!
//! Transforms live in an arena and refer to each other by [`TransformId`].
//! A node stores its local position, rotation and scale plus the cached
//! world matrix. Every mutation recomputes the world matrix of the node and
//! all of its descendants immediately, so a query never sees stale data.
//!
//! Each recompute stamps the node with a fresh revision number. Dependents
//! such as cameras compare revisions to decide whether their own caches need
//! rebuilding.

use slotmap::SlotMap;

use super::{GameObjectId, TransformId};
use crate::foundation::math::{utils, Mat4, Point3, Quat, Vec3};

/// One node of the hierarchy
#[derive(Debug, Clone)]
pub struct TransformNode {
    local_position: Vec3,
    local_rotation: Quat,
    local_scale: Vec3,

    parent: Option<TransformId>,
    children: Vec<TransformId>,
    root: TransformId,
    owner: Option<GameObjectId>,

    local_matrix: Mat4,
    world_matrix: Mat4,
    revision: u64,
    velocity: Vec3,
}

impl TransformNode {
    fn new(root: TransformId, owner: Option<GameObjectId>) -> Self {
        Self {
            local_position: Vec3::zeros(),
            local_rotation: Quat::identity(),
            local_scale: Vec3::new(1.0, 1.0, 1.0),
            parent: None,
            children: Vec::new(),
            root,
            owner,
            local_matrix: Mat4::identity(),
            world_matrix: Mat4::identity(),
            revision: 0,
            velocity: Vec3::zeros(),
        }
    }

    /// Position relative to the parent
    pub fn local_position(&self) -> Vec3 {
        self.local_position
    }

    /// Rotation relative to the parent
    pub fn local_rotation(&self) -> Quat {
        self.local_rotation
    }

    /// Scale relative to the parent
    pub fn local_scale(&self) -> Vec3 {
        self.local_scale
    }

    /// Parent node
    pub fn parent(&self) -> Option<TransformId> {
        self.parent
    }

    /// Direct children in attach order
    pub fn children(&self) -> &[TransformId] {
        &self.children
    }

    /// Topmost ancestor (the node itself when it has no parent)
    pub fn root(&self) -> TransformId {
        self.root
    }

    /// Game object this transform belongs to
    pub fn owner(&self) -> Option<GameObjectId> {
        self.owner
    }

    /// `translation * rotation * scale`
    pub fn local_matrix(&self) -> &Mat4 {
        &self.local_matrix
    }

    /// Parent world matrix times the local matrix
    pub fn world_matrix(&self) -> &Mat4 {
        &self.world_matrix
    }

    /// Bumped every time the world matrix is recomputed
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// World-space velocity from the last position assignment
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }
}

/// Arena of transform nodes
#[derive(Debug, Default)]
pub struct Transforms {
    nodes: SlotMap<TransformId, TransformNode>,
    revision: u64,
    delta_time: f32,
}

impl Transforms {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a root node at the origin
    pub fn create(&mut self, owner: Option<GameObjectId>) -> TransformId {
        let id = self.nodes.insert_with_key(|id| TransformNode::new(id, owner));
        self.refresh(id);
        id
    }

    /// Remove a node; its children become roots
    pub fn remove(&mut self, id: TransformId) -> bool {
        let Some(parent) = self.nodes.get(id).map(|node| node.parent) else {
            return false;
        };
        if let Some(parent) = parent {
            self.detach_from(parent, id);
        }
        let Some(node) = self.nodes.remove(id) else {
            return false;
        };
        for child in node.children {
            if let Some(child_node) = self.nodes.get_mut(child) {
                child_node.parent = None;
            }
            self.update_root(child);
            self.refresh(child);
        }
        true
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether a node exists
    pub fn contains(&self, id: TransformId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Node lookup
    pub fn get(&self, id: TransformId) -> Option<&TransformNode> {
        self.nodes.get(id)
    }

    /// Frame delta used to derive velocities from position changes
    pub fn set_delta_time(&mut self, delta_time: f32) {
        self.delta_time = delta_time;
    }

    /// World matrix, identity for unknown nodes
    pub fn world_matrix(&self, id: TransformId) -> Mat4 {
        self.nodes.get(id).map_or_else(Mat4::identity, |node| node.world_matrix)
    }

    /// Revision of a node's world matrix
    pub fn revision(&self, id: TransformId) -> u64 {
        self.nodes.get(id).map_or(0, |node| node.revision)
    }

    /// Parent of a node
    pub fn parent(&self, id: TransformId) -> Option<TransformId> {
        self.nodes.get(id).and_then(|node| node.parent)
    }

    /// Children of a node
    pub fn children(&self, id: TransformId) -> &[TransformId] {
        self.nodes.get(id).map(|node| node.children.as_slice()).unwrap_or(&[])
    }

    /// Topmost ancestor of a node
    pub fn root(&self, id: TransformId) -> Option<TransformId> {
        self.nodes.get(id).map(|node| node.root)
    }

    /// All descendants, depth first, parents before children
    pub fn descendants(&self, id: TransformId) -> Vec<TransformId> {
        let mut result = Vec::new();
        let mut stack: Vec<TransformId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            result.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        result
    }

    /// Whether `ancestor` is `id` or one of its ancestors
    pub fn is_ancestor_of(&self, ancestor: TransformId, id: TransformId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    // === Hierarchy ===

    /// Attach to a new parent, or detach with `None`
    ///
    /// Local values are kept. Setting a node as its own parent does nothing;
    /// parenting a node under one of its own descendants is rejected.
    pub fn set_parent(&mut self, id: TransformId, parent: Option<TransformId>) -> bool {
        if !self.nodes.contains_key(id) {
            return false;
        }
        if parent == Some(id) {
            return false;
        }
        if let Some(new_parent) = parent {
            if !self.nodes.contains_key(new_parent) {
                log::warn!("set_parent: unknown parent {:?}", new_parent);
                return false;
            }
            if self.is_ancestor_of(id, new_parent) {
                log::warn!("set_parent: {:?} is a descendant of {:?}", new_parent, id);
                return false;
            }
        }

        if let Some(old_parent) = self.parent(id) {
            self.detach_from(old_parent, id);
        }
        if let Some(new_parent) = parent {
            if let Some(node) = self.nodes.get_mut(new_parent) {
                node.children.push(id);
            }
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = parent;
        }

        self.update_root(id);
        self.refresh(id);
        true
    }

    fn detach_from(&mut self, parent: TransformId, child: TransformId) {
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.retain(|c| *c != child);
        }
    }

    fn update_root(&mut self, id: TransformId) {
        let mut root = id;
        while let Some(parent) = self.parent(root) {
            root = parent;
        }
        for node_id in std::iter::once(id).chain(self.descendants(id)) {
            if let Some(node) = self.nodes.get_mut(node_id) {
                node.root = root;
            }
        }
    }

    /// Recompute the world matrices of a node and its subtree
    fn refresh(&mut self, id: TransformId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let parent_world = self.parent(current).map(|p| self.world_matrix(p));
            self.revision += 1;
            let revision = self.revision;
            let Some(node) = self.nodes.get_mut(current) else {
                continue;
            };
            node.local_matrix = Mat4::new_translation(&node.local_position)
                * node.local_rotation.to_homogeneous()
                * Mat4::new_nonuniform_scaling(&node.local_scale);
            node.world_matrix = match parent_world {
                Some(parent) => parent * node.local_matrix,
                None => node.local_matrix,
            };
            node.revision = revision;
            stack.extend(node.children.iter().copied());
        }
    }

    // === Local space ===

    /// Set position relative to the parent
    pub fn set_local_position(&mut self, id: TransformId, position: Vec3) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.local_position = position;
            self.refresh(id);
        }
    }

    /// Set rotation relative to the parent
    pub fn set_local_rotation(&mut self, id: TransformId, rotation: Quat) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.local_rotation = rotation;
            self.refresh(id);
        }
    }

    /// Set scale relative to the parent
    pub fn set_local_scale(&mut self, id: TransformId, scale: Vec3) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.local_scale = scale;
            self.refresh(id);
        }
    }

    // === World space ===

    /// World position
    pub fn position(&self, id: TransformId) -> Vec3 {
        utils::translation_of(&self.world_matrix(id))
    }

    /// Move to a world position, recording the velocity of the move
    pub fn set_position(&mut self, id: TransformId, position: Vec3) {
        if !self.nodes.contains_key(id) {
            return;
        }
        let previous = self.position(id);
        let local = match self.parent(id) {
            Some(parent) => self
                .world_matrix(parent)
                .try_inverse()
                .map_or(position, |inverse| inverse.transform_point(&Point3::from(position)).coords),
            None => position,
        };
        let delta_time = self.delta_time;
        if let Some(node) = self.nodes.get_mut(id) {
            node.local_position = local;
            node.velocity = if delta_time > 0.0 {
                (position - previous) / delta_time
            } else {
                Vec3::zeros()
            };
        }
        self.refresh(id);
    }

    /// Shift by a world-space offset
    pub fn translate(&mut self, id: TransformId, offset: Vec3) {
        let position = self.position(id);
        self.set_position(id, position + offset);
    }

    /// World rotation (composition of the chain's rotations)
    pub fn rotation(&self, id: TransformId) -> Quat {
        let mut rotation = Quat::identity();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let Some(node) = self.nodes.get(node_id) else {
                break;
            };
            rotation = node.local_rotation * rotation;
            current = node.parent;
        }
        rotation
    }

    /// Set the world rotation
    pub fn set_rotation(&mut self, id: TransformId, rotation: Quat) {
        let local = match self.parent(id) {
            Some(parent) => self.rotation(parent).inverse() * rotation,
            None => rotation,
        };
        self.set_local_rotation(id, local);
    }

    /// Rotate about a world axis by `degrees`
    pub fn rotate(&mut self, id: TransformId, axis: Vec3, degrees: f32) {
        let Some(axis) = nalgebra::Unit::try_new(axis, f32::EPSILON) else {
            return;
        };
        let delta = Quat::from_axis_angle(&axis, utils::deg_to_rad(degrees));
        let rotation = self.rotation(id);
        self.set_rotation(id, delta * rotation);
    }

    /// Turn so that forward points at `target`
    pub fn look_at(&mut self, id: TransformId, target: Vec3, up: Vec3) {
        let direction = target - self.position(id);
        if direction.norm_squared() <= f32::EPSILON {
            return;
        }
        let up = if direction.normalize().cross(&up).norm_squared() <= 1e-6 {
            Vec3::z()
        } else {
            up
        };
        self.set_rotation(id, Quat::face_towards(&-direction, &up));
    }

    /// Lossy world scale (component-wise product along the chain)
    pub fn scale(&self, id: TransformId) -> Vec3 {
        let mut scale = Vec3::new(1.0, 1.0, 1.0);
        let mut current = Some(id);
        while let Some(node_id) = current {
            let Some(node) = self.nodes.get(node_id) else {
                break;
            };
            scale.component_mul_assign(&node.local_scale);
            current = node.parent;
        }
        scale
    }

    /// Set the world scale
    pub fn set_scale(&mut self, id: TransformId, scale: Vec3) {
        let local = match self.parent(id) {
            Some(parent) => {
                let parent_scale = self.scale(parent);
                Vec3::new(
                    safe_div(scale.x, parent_scale.x),
                    safe_div(scale.y, parent_scale.y),
                    safe_div(scale.z, parent_scale.z),
                )
            }
            None => scale,
        };
        self.set_local_scale(id, local);
    }

    /// World -Z axis
    pub fn forward(&self, id: TransformId) -> Vec3 {
        self.rotation(id) * -Vec3::z()
    }

    /// World +X axis
    pub fn right(&self, id: TransformId) -> Vec3 {
        self.rotation(id) * Vec3::x()
    }

    /// World +Y axis
    pub fn up(&self, id: TransformId) -> Vec3 {
        self.rotation(id) * Vec3::y()
    }
}

fn safe_div(value: f32, by: f32) -> f32 {
    if by.abs() > f32::EPSILON {
        value / by
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn trs(position: Vec3, degrees_y: f32, scale: f32) -> Mat4 {
        Mat4::new_translation(&position)
            * Quat::from_axis_angle(&Vec3::y_axis(), utils::deg_to_rad(degrees_y)).to_homogeneous()
            * Mat4::new_scaling(scale)
    }

    #[test]
    fn test_world_matrix_is_product_of_chain() {
        let mut transforms = Transforms::new();
        let a = transforms.create(None);
        let b = transforms.create(None);
        let c = transforms.create(None);
        transforms.set_parent(b, Some(a));
        transforms.set_parent(c, Some(b));

        let setup = [
            (a, Vec3::new(1.0, 0.0, 0.0), 90.0, 2.0),
            (b, Vec3::new(0.0, 3.0, 0.0), 45.0, 1.0),
            (c, Vec3::new(0.0, 0.0, -2.0), 0.0, 0.5),
        ];
        let mut expected = Mat4::identity();
        for (id, position, degrees, scale) in setup {
            transforms.set_local_position(id, position);
            transforms.set_local_rotation(id, Quat::from_axis_angle(&Vec3::y_axis(), utils::deg_to_rad(degrees)));
            transforms.set_local_scale(id, Vec3::repeat(scale));
            expected *= trs(position, degrees, scale);
        }

        assert_relative_eq!(transforms.world_matrix(c), expected, epsilon = 1e-5);
    }

    #[test]
    fn test_parent_move_updates_children_eagerly() {
        let mut transforms = Transforms::new();
        let parent = transforms.create(None);
        let child = transforms.create(None);
        transforms.set_parent(child, Some(parent));
        transforms.set_local_position(child, Vec3::new(0.0, 1.0, 0.0));
        let before = transforms.revision(child);

        transforms.set_local_position(parent, Vec3::new(5.0, 0.0, 0.0));
        assert!(transforms.revision(child) > before);
        assert_relative_eq!(transforms.position(child), Vec3::new(5.0, 1.0, 0.0));
    }

    #[test]
    fn test_reparent_updates_root_and_child_lists() {
        let mut transforms = Transforms::new();
        let a = transforms.create(None);
        let b = transforms.create(None);
        let c = transforms.create(None);
        let d = transforms.create(None);
        transforms.set_parent(c, Some(a));
        transforms.set_parent(d, Some(c));
        assert_eq!(transforms.root(d), Some(a));

        assert!(transforms.set_parent(c, Some(b)));
        assert!(transforms.children(a).is_empty());
        assert_eq!(transforms.children(b), &[c]);
        assert_eq!(transforms.root(c), Some(b));
        assert_eq!(transforms.root(d), Some(b));
    }

    #[test]
    fn test_self_parent_and_cycles_are_rejected() {
        let mut transforms = Transforms::new();
        let a = transforms.create(None);
        let b = transforms.create(None);
        transforms.set_parent(b, Some(a));
        assert!(!transforms.set_parent(a, Some(a)));
        assert!(!transforms.set_parent(a, Some(b)));
        assert_eq!(transforms.parent(a), None);
        assert_eq!(transforms.root(a), Some(a));
    }

    #[test]
    fn test_world_position_under_parent() {
        let mut transforms = Transforms::new();
        let parent = transforms.create(None);
        let child = transforms.create(None);
        transforms.set_parent(child, Some(parent));
        transforms.set_local_position(parent, Vec3::new(10.0, 0.0, 0.0));
        transforms.set_local_scale(parent, Vec3::repeat(2.0));

        transforms.set_position(child, Vec3::new(12.0, 4.0, 0.0));
        let local = transforms.get(child).map(|n| n.local_position()).unwrap_or_default();
        assert_relative_eq!(local, Vec3::new(1.0, 2.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(transforms.position(child), Vec3::new(12.0, 4.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(transforms.scale(child), Vec3::repeat(2.0));
    }

    #[test]
    fn test_velocity_from_position_change() {
        let mut transforms = Transforms::new();
        let id = transforms.create(None);
        transforms.set_delta_time(0.5);
        transforms.set_position(id, Vec3::new(1.0, 0.0, 0.0));
        let velocity = transforms.get(id).map(|n| n.velocity()).unwrap_or_default();
        assert_relative_eq!(velocity, Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_world_rotation_round_trip() {
        let mut transforms = Transforms::new();
        let parent = transforms.create(None);
        let child = transforms.create(None);
        transforms.set_parent(child, Some(parent));
        transforms.set_local_rotation(parent, Quat::from_axis_angle(&Vec3::y_axis(), 0.7));

        let target = Quat::from_axis_angle(&Vec3::x_axis(), 0.3);
        transforms.set_rotation(child, target);
        assert_relative_eq!(transforms.rotation(child).angle_to(&target), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_look_at_points_forward_at_target() {
        let mut transforms = Transforms::new();
        let id = transforms.create(None);
        transforms.set_position(id, Vec3::new(0.0, 0.0, 10.0));
        transforms.look_at(id, Vec3::new(10.0, 0.0, 10.0), Vec3::y());
        assert_relative_eq!(transforms.forward(id), Vec3::x(), epsilon = 1e-5);
    }

    #[test]
    fn test_remove_orphans_children() {
        let mut transforms = Transforms::new();
        let parent = transforms.create(None);
        let child = transforms.create(None);
        transforms.set_parent(child, Some(parent));
        transforms.set_local_position(parent, Vec3::new(3.0, 0.0, 0.0));

        assert!(transforms.remove(parent));
        assert_eq!(transforms.parent(child), None);
        assert_eq!(transforms.root(child), Some(child));
        assert_relative_eq!(transforms.position(child), Vec3::zeros());
    }
}
